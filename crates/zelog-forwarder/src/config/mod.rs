//! Pipeline configuration: matching profiles, batching knobs, and the
//! ZAPI endpoint settings consumed by the flusher.
//!
//! A profile is an ordered matching rule built from a tiny expression
//! grammar. Each expression node carries either a `source`
//! (`rattr:<path>`, `attr:<path>`, `body[:<path>]`, `lit:<text>`) or an
//! `op` with child expressions. Validation is structural and fatal at
//! startup; evaluation failures at runtime only skip a profile.

pub mod verbosity;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

pub use verbosity::Verbosity;

pub const SOURCE_RATTR: &str = "rattr";
pub const SOURCE_ATTR: &str = "attr";
pub const SOURCE_BODY: &str = "body";
pub const SOURCE_LIT: &str = "lit";

pub const FORMAT_MESSAGE: &str = "message";
pub const FORMAT_CONTAINER: &str = "container";
pub const FORMAT_EVENT: &str = "event";

pub const OP_RMPREFIX: &str = "rmprefix";
pub const OP_RMSUFFIX: &str = "rmsuffix";
pub const OP_RMTAIL: &str = "rmtail";
pub const OP_ALPHANUM: &str = "alphanum";
pub const OP_LC: &str = "lc";
pub const OP_UNESCAPE: &str = "unescape";
pub const OP_REPLACE: &str = "replace";
pub const OP_REGEXP: &str = "regexp";
pub const OP_AND: &str = "and";
pub const OP_OR: &str = "or";

const SOURCES: &[&str] = &[SOURCE_RATTR, SOURCE_ATTR, SOURCE_BODY, SOURCE_LIT];
const FORMATS: &[&str] = &[FORMAT_MESSAGE, FORMAT_CONTAINER, FORMAT_EVENT];

/// Sentinel arity for the variadic operators.
pub const VARIADIC: usize = usize::MAX;

/// Number of operand expressions an operator takes after the primary one.
///
/// `rmprefix a b` evaluates `a` and removes the prefix `b`, so the operand
/// count here is the child count minus one for the fixed-arity operators.
#[must_use]
pub fn op_operands(op: &str) -> Option<usize> {
    match op {
        OP_RMPREFIX | OP_RMSUFFIX | OP_RMTAIL | OP_REGEXP => Some(1),
        OP_ALPHANUM | OP_LC | OP_UNESCAPE => Some(0),
        OP_REPLACE => Some(2),
        OP_AND | OP_OR => Some(VARIADIC),
        _ => None,
    }
}

/// One node of a profile expression tree.
///
/// Exactly one of `source` / `op` must be non-empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigExpression {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub exps: Vec<ConfigExpression>,
}

impl ConfigExpression {
    /// Shorthand for a `source` leaf, used heavily in tests.
    #[must_use]
    pub fn source(source: impl Into<String>) -> Self {
        ConfigExpression {
            source: source.into(),
            ..ConfigExpression::default()
        }
    }

    /// Shorthand for an `op` node.
    #[must_use]
    pub fn op(op: impl Into<String>, exps: Vec<ConfigExpression>) -> Self {
        ConfigExpression {
            op: op.into(),
            exps,
            ..ConfigExpression::default()
        }
    }
}

/// An expression plus the key it is recorded under and an optional
/// validation pattern that clears non-matching results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigAttribute {
    pub exp: Option<ConfigExpression>,
    #[serde(default)]
    pub rename: String,
    #[serde(default)]
    pub validate: String,
}

impl ConfigAttribute {
    #[must_use]
    pub fn new(exp: ConfigExpression) -> Self {
        ConfigAttribute {
            exp: Some(exp),
            ..ConfigAttribute::default()
        }
    }

    #[must_use]
    pub fn renamed(exp: ConfigExpression, rename: impl Into<String>) -> Self {
        ConfigAttribute {
            exp: Some(exp),
            rename: rename.into(),
            validate: String::new(),
        }
    }
}

/// An ordered matching rule. The first profile whose required fields all
/// evaluate to non-empty values claims the record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigProfile {
    #[serde(default)]
    pub service_group: Option<ConfigAttribute>,
    #[serde(default)]
    pub host: Option<ConfigAttribute>,
    #[serde(default)]
    pub logbasename: Option<ConfigAttribute>,
    /// Optional: absent means the record's own severity is kept.
    #[serde(default)]
    pub severity: Option<ConfigAttribute>,
    #[serde(default)]
    pub labels: Vec<ConfigAttribute>,
    #[serde(default)]
    pub message: Option<ConfigAttribute>,
    #[serde(default)]
    pub format: String,
}

/// Configuration for the formatting processor and the ZAPI flusher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ordered matching profiles.
    pub profiles: Vec<ConfigProfile>,

    /// Time after which a batch is sent regardless of size.
    #[serde(deserialize_with = "deserialize_duration_from_seconds")]
    pub timeout: Duration,

    /// Batch size that triggers an immediate send.
    pub send_batch_size: u32,

    /// Hard per-group ceiling; oversized groups are split. Zero means no
    /// maximum.
    pub send_batch_max_size: u32,

    /// ZAPI base URL, e.g. `https://zapi.example.com`.
    pub endpoint: String,

    /// ZAPI authentication token (40 hex characters).
    pub api_token: String,

    /// Flusher verbosity.
    pub verbosity: Verbosity,

    /// HTTP request timeout in seconds for the flusher client.
    pub flush_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            profiles: Vec::new(),
            timeout: Duration::from_millis(200),
            send_batch_size: 8192,
            send_batch_max_size: 0,
            endpoint: String::new(),
            api_token: String::new(),
            verbosity: Verbosity::default(),
            flush_timeout: 30,
        }
    }
}

impl Config {
    /// Checks the whole configuration; the first structural problem wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, profile) in self.profiles.iter().enumerate() {
            validate_profile_elem(idx, "service_group", profile.service_group.as_ref())?;
            validate_profile_elem(idx, "host", profile.host.as_ref())?;
            validate_profile_elem(idx, "logbasename", profile.logbasename.as_ref())?;
            validate_profile_elem(idx, "severity", profile.severity.as_ref())?;
            validate_profile_elem(idx, "message", profile.message.as_ref())?;
            validate_keyword(idx, "format", &profile.format, FORMATS)?;
            for label in &profile.labels {
                validate_profile_elem(idx, "labels", Some(label))?;
            }
        }
        if self.send_batch_max_size > 0 && self.send_batch_max_size < self.send_batch_size {
            return Err(ConfigError::BatchMaxSize);
        }
        if !self.endpoint.is_empty() || !self.api_token.is_empty() {
            self.validate_sender()?;
        }
        Ok(())
    }

    /// Endpoint and token checks, required whenever the flusher is in play.
    pub fn validate_sender(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() || reqwest::Url::parse(&self.endpoint).is_err() {
            return Err(ConfigError::BadEndpoint);
        }
        if self.api_token.len() != 40
            || !self.api_token.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(ConfigError::BadApiToken);
        }
        Ok(())
    }
}

fn validate_keyword(
    profile: usize,
    name: &'static str,
    value: &str,
    supported: &'static [&'static str],
) -> Result<(), ConfigError> {
    if value.is_empty() || supported.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::UnknownKeyword {
        profile,
        name,
        value: value.to_string(),
        supported: supported.to_vec(),
    })
}

fn validate_profile_elem(
    profile: usize,
    name: &'static str,
    attribute: Option<&ConfigAttribute>,
) -> Result<(), ConfigError> {
    let Some(attribute) = attribute else {
        return Ok(());
    };
    if let Some(exp) = &attribute.exp {
        validate_profile_exp(profile, name, exp)?;
    }
    if !attribute.validate.is_empty() && regex::Regex::new(&attribute.validate).is_err() {
        return Err(ConfigError::BadRegexp {
            profile,
            name,
            value: attribute.validate.clone(),
        });
    }
    Ok(())
}

fn validate_profile_exp(
    profile: usize,
    name: &'static str,
    exp: &ConfigExpression,
) -> Result<(), ConfigError> {
    if exp.source.is_empty() == exp.op.is_empty() {
        return Err(ConfigError::SourceOrOp { profile });
    }
    if !exp.source.is_empty() {
        let kind = exp.source.split(':').next().unwrap_or_default();
        validate_keyword(profile, "source", kind, SOURCES)?;
    }
    if !exp.op.is_empty() {
        let Some(operands) = op_operands(&exp.op) else {
            return Err(ConfigError::UnknownKeyword {
                profile,
                name: "op",
                value: exp.op.clone(),
                supported: vec![
                    OP_RMPREFIX,
                    OP_RMSUFFIX,
                    OP_RMTAIL,
                    OP_ALPHANUM,
                    OP_LC,
                    OP_UNESCAPE,
                    OP_REPLACE,
                    OP_REGEXP,
                    OP_AND,
                    OP_OR,
                ],
            });
        };
        if operands == VARIADIC {
            if exp.exps.len() < 2 {
                return Err(ConfigError::BadArity {
                    profile,
                    op: exp.op.clone(),
                    got: exp.exps.len(),
                    expected: "2 or more".to_string(),
                });
            }
        } else if exp.exps.len() != operands + 1 {
            return Err(ConfigError::BadArity {
                profile,
                op: exp.op.clone(),
                got: exp.exps.len(),
                expected: (operands + 1).to_string(),
            });
        }
        // A literal regexp pattern can be compile-checked up front.
        if exp.op == OP_REGEXP {
            if let Some(pattern) = exp.exps[1].source.strip_prefix("lit:") {
                if regex::Regex::new(pattern).is_err() {
                    return Err(ConfigError::BadRegexp {
                        profile,
                        name,
                        value: exp.exps[1].source.clone(),
                    });
                }
            }
        }
    }
    for child in &exp.exps {
        validate_profile_exp(profile, "exps", child)?;
    }
    Ok(())
}

/// Accepts durations as seconds, either integer or float, the way the
/// rest of the config surface expresses times.
fn deserialize_duration_from_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Duration, D::Error> {
    struct DurationVisitor;
    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a duration in seconds (integer or float)")
        }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Duration::from_secs(v))
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("negative durations are not allowed"))
        }
        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v < 0f64 {
                return Err(E::custom("negative durations are not allowed"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }
    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str) -> ConfigExpression {
        ConfigExpression::source(format!("lit:{text}"))
    }

    fn minimal_profile() -> ConfigProfile {
        ConfigProfile {
            service_group: Some(ConfigAttribute::new(lit("default"))),
            host: Some(ConfigAttribute::new(lit("host1"))),
            logbasename: Some(ConfigAttribute::new(lit("syslog"))),
            message: Some(ConfigAttribute::new(ConfigExpression::source("body"))),
            format: FORMAT_MESSAGE.to_string(),
            ..ConfigProfile::default()
        }
    }

    #[test]
    fn valid_profile_passes() {
        let cfg = Config {
            profiles: vec![minimal_profile()],
            ..Config::default()
        };
        cfg.validate().expect("config should validate");
    }

    #[test]
    fn source_and_op_are_exclusive() {
        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression {
            source: "body".to_string(),
            op: OP_LC.to_string(),
            exps: vec![],
        }));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::SourceOrOp { profile: 0 })
        ));
    }

    #[test]
    fn neither_source_nor_op_is_rejected() {
        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression::default()));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let mut profile = minimal_profile();
        profile.host = Some(ConfigAttribute::new(ConfigExpression::source("bogus:x")));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownKeyword { name: "source", .. })
        ));
    }

    #[test]
    fn unknown_op_is_rejected() {
        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression::op(
            "uppercase",
            vec![ConfigExpression::source("body")],
        )));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownKeyword { name: "op", .. })
        ));
    }

    #[test]
    fn arity_is_enforced() {
        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression::op(
            OP_REPLACE,
            vec![ConfigExpression::source("body"), lit("a")],
        )));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadArity { .. })));
    }

    #[test]
    fn variadic_ops_need_two_children() {
        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression::op(
            OP_OR,
            vec![ConfigExpression::source("body")],
        )));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadArity { .. })));

        let mut profile = minimal_profile();
        profile.message = Some(ConfigAttribute::new(ConfigExpression::op(
            OP_OR,
            vec![
                ConfigExpression::source("body:message"),
                ConfigExpression::source("body:event_data"),
                ConfigExpression::source("body:keywords"),
            ],
        )));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        cfg.validate().expect("three-way or should validate");
    }

    #[test]
    fn literal_regexp_pattern_is_compile_checked() {
        let mut profile = minimal_profile();
        profile.logbasename = Some(ConfigAttribute::new(ConfigExpression::op(
            OP_REGEXP,
            vec![ConfigExpression::source("body:file"), lit("([unclosed")],
        )));
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadRegexp { .. })));
    }

    #[test]
    fn validate_pattern_is_compile_checked() {
        let mut profile = minimal_profile();
        profile.host = Some(ConfigAttribute {
            exp: Some(ConfigExpression::source("attr:hostname")),
            rename: String::new(),
            validate: "([unclosed".to_string(),
        });
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BadRegexp { .. })));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let mut profile = minimal_profile();
        profile.format = "binary".to_string();
        let cfg = Config {
            profiles: vec![profile],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownKeyword { name: "format", .. })
        ));
    }

    #[test]
    fn batch_max_size_must_cover_batch_size() {
        let cfg = Config {
            send_batch_size: 100,
            send_batch_max_size: 50,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::BatchMaxSize)));

        let cfg = Config {
            send_batch_size: 100,
            send_batch_max_size: 0,
            ..Config::default()
        };
        cfg.validate().expect("zero max size means unbounded");
    }

    #[test]
    fn sender_validation() {
        let mut cfg = Config {
            endpoint: "https://zapi.example.com".to_string(),
            api_token: "0123456789abcdef0123456789abcdef01234567".to_string(),
            ..Config::default()
        };
        cfg.validate_sender().expect("sender config should validate");

        cfg.api_token = "not-hex".to_string();
        assert!(matches!(
            cfg.validate_sender(),
            Err(ConfigError::BadApiToken)
        ));

        cfg.api_token = "0123456789abcdef0123456789abcdef01234567".to_string();
        cfg.endpoint = "not a url".to_string();
        assert!(matches!(
            cfg.validate_sender(),
            Err(ConfigError::BadEndpoint)
        ));
    }

    #[test]
    fn deserializes_from_json_config() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "profiles": [{
                    "service_group": {"exp": {"source": "lit:default"}, "rename": "ze_deployment_name"},
                    "host": {"exp": {"source": "body:computer"}},
                    "logbasename": {"exp": {"op": "lc", "exps": [{"source": "body:provider.name"}]}},
                    "message": {"exp": {"source": "body:message"}},
                    "format": "event"
                }],
                "timeout": 0.2,
                "send_batch_size": 512,
                "send_batch_max_size": 1024,
                "endpoint": "https://zapi.example.com",
                "api_token": "0123456789abcdef0123456789abcdef01234567",
                "verbosity": "detailed"
            }"#,
        )
        .expect("config should deserialize");
        assert_eq!(cfg.timeout, Duration::from_millis(200));
        assert_eq!(cfg.send_batch_size, 512);
        assert_eq!(cfg.verbosity, Verbosity::Detailed);
        assert_eq!(cfg.profiles.len(), 1);
        cfg.validate().expect("deserialized config should validate");
    }
}
