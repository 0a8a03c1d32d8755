//! Profile matching: evaluates the configured expression trees against a
//! log record and produces the identifying labels, the formatted message,
//! and the stream token request the batcher keys groups by.
//!
//! Profiles are tried in declared order. A profile claims a record when
//! `service_group`, `host`, `logbasename`, the optional `severity`, and
//! `message` all evaluate to non-empty text; the first empty required
//! field skips to the next profile.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use zelog_pdata::{AttributeMap, LogRecord, SeverityNumber, Value};

use crate::config::{
    Config, ConfigAttribute, ConfigExpression, FORMAT_CONTAINER, FORMAT_EVENT, OP_ALPHANUM,
    OP_AND, OP_LC, OP_OR, OP_REGEXP, OP_REPLACE, OP_RMPREFIX, OP_RMSUFFIX, OP_RMTAIL,
    OP_UNESCAPE, SOURCE_ATTR, SOURCE_BODY, SOURCE_LIT, SOURCE_RATTR,
};
use crate::error::MatchError;
use crate::logs::ascii::filter_ascii;

/// Stream identity metadata sent to the token endpoint.
///
/// The canonical JSON form of this struct doubles as the stream identity
/// key, so field names and order are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamTokenRequest {
    pub stream: String,
    pub logbasename: String,
    pub container_log: bool,
    pub log_type: String,
    pub forwarded_log: bool,
    pub tz: String,
    #[serde(rename = "Ze_log_collector_vers")]
    pub ze_log_collector_vers: String,
    pub ids: BTreeMap<String, String>,
    pub cfgs: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl StreamTokenRequest {
    #[must_use]
    pub fn new() -> Self {
        StreamTokenRequest {
            stream: "native".to_string(),
            logbasename: String::new(),
            container_log: false,
            log_type: "otel".to_string(),
            forwarded_log: false,
            tz: std::env::var("TZ").unwrap_or_else(|_| "Local".to_string()),
            ze_log_collector_vers: concat!(env!("CARGO_PKG_VERSION"), "-otelcollector")
                .to_string(),
            ids: BTreeMap::new(),
            cfgs: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }
}

impl Default for StreamTokenRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// A formatted container runtime log line.
#[derive(Debug, Default, Deserialize)]
struct ContainerLogEntry {
    #[serde(default)]
    log: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    #[allow(dead_code)]
    stream: String,
}

/// The outputs of a successful profile match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub service_group: String,
    pub host: String,
    pub logbasename: String,
    pub message: String,
    pub format: String,
}

/// Wire severity text, grouped the way the backend expects.
#[must_use]
pub fn severity_wire_name(sev: SeverityNumber) -> &'static str {
    use SeverityNumber as S;
    match sev {
        S::Unspecified => "UNKNOWN",
        S::Trace | S::Trace2 | S::Trace3 | S::Trace4 => "TRACE",
        S::Debug | S::Debug2 | S::Debug3 | S::Debug4 => "DEBUG",
        S::Info => "INFO",
        S::Info2 | S::Info3 | S::Info4 => "NOTICE",
        S::Warn | S::Warn2 | S::Warn3 | S::Warn4 => "WARN",
        S::Error => "ERROR",
        S::Error2 => "CRITICAL",
        S::Error3 | S::Error4 => "ALERT",
        S::Fatal | S::Fatal2 | S::Fatal3 | S::Fatal4 => "FATAL",
    }
}

/// Severity from an evaluated severity expression: accepts the common
/// names and the numeric syslog levels 0..7. Input must be uppercased.
fn severity_from_synonym(text: &str) -> Option<SeverityNumber> {
    use SeverityNumber as S;
    match text {
        "TRACE" => Some(S::Trace),
        "DEBUG" | "7" => Some(S::Debug),
        "INFORMATIONAL" | "INFO" | "NORMAL" | "6" => Some(S::Info),
        "NOTICE" | "5" => Some(S::Info2),
        "WARNING" | "WARN" | "4" => Some(S::Warn),
        "ERROR" | "ERR" | "3" => Some(S::Error),
        "CRITICAL" | "CRIT" | "2" => Some(S::Error2),
        "ALERT" | "1" => Some(S::Error3),
        "FATAL" | "EMERGENCY" | "EMERG" | "PANIC" | "0" => Some(S::Fatal),
        _ => None,
    }
}

/// Severity from a record's severity text, keyed by the canonical long
/// names; applied when the record's severity number is unspecified.
fn severity_from_name(text: &str) -> Option<SeverityNumber> {
    use SeverityNumber as S;
    match text {
        "Unspecified" => Some(S::Unspecified),
        "Trace" => Some(S::Trace),
        "Trace2" => Some(S::Trace2),
        "Trace3" => Some(S::Trace3),
        "Trace4" => Some(S::Trace4),
        "Debug" => Some(S::Debug),
        "Debug2" => Some(S::Debug2),
        "Debug3" => Some(S::Debug3),
        "Debug4" => Some(S::Debug4),
        "Info" | "Information" => Some(S::Info),
        "Info2" => Some(S::Info2),
        "Info3" => Some(S::Info3),
        "Info4" => Some(S::Info4),
        "Warn" => Some(S::Warn),
        "Warn2" => Some(S::Warn2),
        "Warn3" => Some(S::Warn3),
        "Warn4" => Some(S::Warn4),
        "Error" => Some(S::Error),
        "Error2" => Some(S::Error2),
        "Error3" => Some(S::Error3),
        "Error4" => Some(S::Error4),
        "Fatal" => Some(S::Fatal),
        "Fatal2" => Some(S::Fatal2),
        "Fatal3" => Some(S::Fatal3),
        "Fatal4" => Some(S::Fatal4),
        _ => None,
    }
}

// Strips non-printable runes and folds newlines to spaces; sequences
// space-join their stringified elements.
fn eval_value(val: &Value) -> String {
    let text = match val {
        Value::Slice(vals) => {
            let mut joined = String::new();
            for v in vals {
                if !joined.is_empty() {
                    joined.push(' ');
                }
                joined.push_str(&v.as_text());
            }
            joined
        }
        other => other.as_text(),
    };
    text.chars()
        .filter_map(|c| {
            if c == '\n' {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect()
}

// Resolves a dotted path against a map: key segments accumulate greedily
// until a lookup succeeds, maps recurse with the remainder, and anything
// else converts through eval_value.
fn eval_map(path: &str, map: &AttributeMap) -> String {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = map;
    let mut acc = String::new();
    let mut last_map: Option<&AttributeMap> = None;
    for segment in segments {
        if acc.is_empty() {
            acc = segment.to_string();
        } else {
            acc.push('.');
            acc.push_str(segment);
        }
        if let Some(val) = current.get(&acc) {
            if let Value::Map(inner) = val {
                current = inner;
                last_map = Some(inner);
                acc.clear();
                continue;
            }
            return eval_value(val);
        }
    }
    if acc.is_empty() {
        // The path landed exactly on a nested map; render it whole.
        if let Some(map) = last_map {
            return Value::Map(map.clone()).as_text();
        }
    }
    String::new()
}

/// Expression evaluation context for one log record.
pub(crate) struct Parser<'a> {
    pub rattr: &'a AttributeMap,
    pub attr: &'a AttributeMap,
    pub body: &'a Value,
}

impl Parser<'_> {
    /// Evaluates an expression node to an `(id, value)` pair. The id is
    /// the tail of the source path; operator nodes inherit the id of
    /// their first child.
    pub(crate) fn eval_exp(&self, exp: &ConfigExpression) -> (String, String) {
        if !exp.source.is_empty() {
            return self.eval_source(&exp.source);
        }
        self.eval_op(exp)
    }

    fn eval_source(&self, source: &str) -> (String, String) {
        let (kind, id) = match source.split_once(':') {
            Some((kind, id)) => (kind, id.to_string()),
            None => (source, String::new()),
        };
        let ret = match kind {
            SOURCE_LIT => id.clone(),
            SOURCE_RATTR => eval_map(&id, self.rattr),
            SOURCE_ATTR => eval_map(&id, self.attr),
            SOURCE_BODY => match self.body {
                Value::Map(map) => {
                    if id.is_empty() {
                        self.body.as_text()
                    } else {
                        eval_map(&id, map)
                    }
                }
                Value::Str(raw) if !id.is_empty() => {
                    // A string body may carry a serialized object; re-parse
                    // on demand and index into it.
                    match serde_json::from_str::<serde_json::Value>(raw) {
                        Ok(json @ serde_json::Value::Object(_)) => {
                            let parsed = Value::from_json(&json);
                            match parsed.as_map() {
                                Some(map) => eval_map(&id, map),
                                None => return (String::new(), String::new()),
                            }
                        }
                        // Can't index into a non-object.
                        _ => return (String::new(), String::new()),
                    }
                }
                other => eval_value(other),
            },
            _ => String::new(),
        };
        (id, filter_ascii(&ret))
    }

    fn eval_op(&self, exp: &ConfigExpression) -> (String, String) {
        let Some(first) = exp.exps.first() else {
            return (String::new(), String::new());
        };
        let (id, mut ret) = self.eval_exp(first);
        match exp.op.as_str() {
            OP_AND => {
                for child in &exp.exps[1..] {
                    let (_, val) = self.eval_exp(child);
                    ret.push(' ');
                    ret.push_str(&val);
                }
            }
            OP_OR => {
                for child in &exp.exps[1..] {
                    if !ret.is_empty() {
                        break;
                    }
                    let (_, val) = self.eval_exp(child);
                    ret = val;
                }
            }
            OP_RMPREFIX => {
                let (_, operand) = self.eval_exp(&exp.exps[1]);
                if let Some(stripped) = ret.strip_prefix(&operand) {
                    ret = stripped.to_string();
                }
            }
            OP_RMSUFFIX => {
                let (_, operand) = self.eval_exp(&exp.exps[1]);
                if let Some(stripped) = ret.strip_suffix(&operand) {
                    ret = stripped.to_string();
                }
            }
            OP_RMTAIL => {
                let (_, operand) = self.eval_exp(&exp.exps[1]);
                if let Some(idx) = ret.rfind(&operand) {
                    ret.truncate(idx);
                }
            }
            OP_ALPHANUM => {
                ret.retain(|c| c.is_ascii_alphanumeric());
            }
            OP_LC => {
                ret = ret.to_lowercase();
            }
            OP_UNESCAPE => {
                // The ESC character is stripped here so configurations
                // never need to embed it.
                ret = ret.replace('\u{1b}', "");
            }
            OP_REPLACE => {
                let (_, from) = self.eval_exp(&exp.exps[1]);
                let (_, to) = self.eval_exp(&exp.exps[2]);
                ret = ret.replace(&from, &to);
            }
            OP_REGEXP => {
                let (_, pattern) = self.eval_exp(&exp.exps[1]);
                match regex::Regex::new(&pattern) {
                    Ok(re) => {
                        let mut captured = String::new();
                        if let Some(caps) = re.captures(&ret) {
                            for i in 1..caps.len() {
                                if let Some(m) = caps.get(i) {
                                    captured.push_str(m.as_str());
                                }
                            }
                        }
                        ret = captured;
                    }
                    Err(_) => {
                        info!(id = %id, value = %pattern, "failed to compile regexp");
                        ret = String::new();
                    }
                }
            }
            _ => {}
        }
        (id, ret)
    }

    /// Evaluates a profile attribute: the expression plus the `rename`
    /// override and the `validate` pattern that clears mismatches.
    pub(crate) fn eval_elem(&self, attribute: Option<&ConfigAttribute>) -> (String, String) {
        let Some(attribute) = attribute else {
            return (String::new(), String::new());
        };
        let (mut id, mut ret) = match &attribute.exp {
            Some(exp) => self.eval_exp(exp),
            None => (String::new(), String::new()),
        };
        if !attribute.rename.is_empty() {
            id = attribute.rename.clone();
        }
        if !attribute.validate.is_empty() {
            match regex::Regex::new(&attribute.validate) {
                Ok(re) => {
                    if !re.is_match(&ret) {
                        info!(
                            id = %id,
                            regexp = %attribute.validate,
                            value = %ret,
                            "failed to validate regexp"
                        );
                        ret = String::new();
                    }
                }
                Err(_) => {
                    info!(
                        id = %id,
                        regexp = %attribute.validate,
                        "failed to compile validation regexp"
                    );
                }
            }
        }
        (id, ret)
    }
}

// RFC3339 in UTC with up-to-microsecond precision and trailing zeros
// trimmed, e.g. 2022-11-10T00:00:00Z or 2022-11-10T00:00:00.123Z.
fn format_rfc3339_micros(dt: DateTime<Utc>) -> String {
    let micros = dt.timestamp_subsec_micros();
    if micros == 0 {
        return dt.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    }
    let mut frac = format!("{micros:06}");
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}Z", dt.format("%Y-%m-%dT%H:%M:%S"), frac)
}

fn record_timestamp(lr: &LogRecord) -> DateTime<Utc> {
    let nanos = if lr.timestamp != 0 {
        lr.timestamp
    } else {
        lr.observed_timestamp
    };
    Utc.timestamp_nanos(nanos as i64)
}

impl Config {
    /// Matches a record against the configured profiles.
    ///
    /// On success the record's severity may have been rewritten (severity
    /// text inheritance, or the profile's severity expression) and the
    /// returned message is already reshaped for the profile's format. On
    /// failure the error lists the field that disqualified each profile.
    pub fn match_profile(
        &self,
        resource: &AttributeMap,
        lr: &mut LogRecord,
    ) -> Result<(MatchResult, StreamTokenRequest), MatchError> {
        let mut reasons: Vec<&'static str> = Vec::new();
        for profile in &self.profiles {
            let mut req = StreamTokenRequest::new();
            let mut gen = MatchResult::default();
            let parser = Parser {
                rattr: resource,
                attr: &lr.attributes,
                body: &lr.body,
            };

            let (id, service_group) = parser.eval_elem(profile.service_group.as_ref());
            if service_group.is_empty() {
                reasons.push("service_group");
                continue;
            }
            gen.service_group = service_group.clone();
            req.ids.insert(id, service_group);

            let (id, host) = parser.eval_elem(profile.host.as_ref());
            if host.is_empty() {
                reasons.push("host");
                continue;
            }
            gen.host = host.clone();
            req.ids.insert(id, host);

            let (logbasename_id, logbasename) = parser.eval_elem(profile.logbasename.as_ref());
            if logbasename.is_empty() {
                reasons.push("logbasename");
                continue;
            }
            gen.logbasename = logbasename.clone();

            if lr.severity_number.is_unspecified() {
                if let Some(sev) = severity_from_name(&lr.severity_text) {
                    lr.severity_number = sev;
                }
            }
            if profile.severity.is_some() {
                let (_, sev_text) = parser.eval_elem(profile.severity.as_ref());
                if sev_text.is_empty() {
                    reasons.push("severity");
                    continue;
                }
                let sev_text = sev_text.to_uppercase();
                let mut sev =
                    severity_from_synonym(&sev_text).unwrap_or(SeverityNumber::Unspecified);
                if sev.is_unspecified() && sev_text.len() == 3 {
                    // Interpret as an HTTP status.
                    sev = match sev_text.as_bytes()[0] {
                        b'1' | b'2' => SeverityNumber::Info,
                        b'3' => SeverityNumber::Debug,
                        b'4' | b'5' => SeverityNumber::Error,
                        _ => SeverityNumber::Unspecified,
                    };
                }
                lr.severity_number = sev;
            }
            req.ids.insert(logbasename_id, logbasename.clone());
            req.logbasename = logbasename;

            for label in &profile.labels {
                let (id, val) = parser.eval_elem(Some(label));
                req.cfgs.insert(id, val);
            }

            let (_, message) = parser.eval_elem(profile.message.as_ref());
            if message.is_empty() {
                reasons.push("message");
                continue;
            }
            gen.message = message;

            match profile.format.as_str() {
                FORMAT_EVENT => {
                    let timestamp = record_timestamp(lr);
                    let sev_text = severity_wire_name(lr.severity_number);
                    if gen.message.len() > 2 && gen.message.starts_with('{') {
                        // Inject the severity as the object's first field.
                        gen.message = format!(
                            "ze_tm={},msg={{\"severity\":\"{}\",{}",
                            timestamp.timestamp_millis(),
                            sev_text,
                            &gen.message[1..]
                        );
                    } else {
                        gen.message = format!(
                            "ze_tm={},msg={} {} {}",
                            timestamp.timestamp_millis(),
                            format_rfc3339_micros(timestamp),
                            sev_text,
                            gen.message
                        );
                    }
                }
                FORMAT_CONTAINER => {
                    req.container_log = true;
                    if gen.message.len() > 2 && gen.message.starts_with('{') {
                        if let Ok(entry) =
                            serde_json::from_str::<ContainerLogEntry>(&gen.message)
                        {
                            gen.message = format!("{} {}", entry.timestamp, entry.log);
                        }
                    }
                }
                _ => {}
            }
            gen.format = profile.format.clone();
            return Ok((gen, req));
        }
        if !reasons.is_empty() && reasons.iter().all(|r| *r == "message") {
            return Err(MatchError::EmptyLine);
        }
        Err(MatchError::NoMatch(reasons))
    }
}
