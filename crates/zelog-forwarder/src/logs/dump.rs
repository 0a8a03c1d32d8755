//! Diagnostic dump of a log record that failed to match any profile.

use std::fmt::Write as _;

use zelog_pdata::{AttributeMap, InstrumentationScope, LogRecord, Value};

/// Line-oriented buffer for multi-line diagnostic output.
#[derive(Default)]
pub(crate) struct DataBuffer {
    buf: String,
}

impl DataBuffer {
    pub(crate) fn log_entry(&mut self, line: impl AsRef<str>) {
        self.buf.push_str(line.as_ref());
        self.buf.push('\n');
    }

    pub(crate) fn log_attributes(&mut self, header: &str, map: &AttributeMap) {
        if map.is_empty() {
            return;
        }
        self.log_entry(format!("{header}:"));
        for (key, value) in map.iter() {
            let _ = writeln!(self.buf, "     -> {key}: {}", value_to_string(value));
        }
    }

    pub(crate) fn log_instrumentation_scope(&mut self, scope: &InstrumentationScope) {
        self.log_entry(format!(
            "InstrumentationScope {} {}",
            scope.name, scope.version
        ));
        self.log_attributes("InstrumentationScope attributes", &scope.attributes);
    }

    pub(crate) fn into_string(self) -> String {
        self.buf
    }
}

fn value_to_string(value: &Value) -> String {
    let kind = match value {
        Value::Str(_) => "Str",
        Value::Int(_) => "Int",
        Value::Double(_) => "Double",
        Value::Bool(_) => "Bool",
        Value::Map(_) => "Map",
        Value::Slice(_) => "Slice",
    };
    format!("{kind}({})", value.as_text())
}

/// Renders the full context of a dropped record for the info-level dump.
pub(crate) fn dump_log_record(
    resource: &AttributeMap,
    scope: &InstrumentationScope,
    lr: &LogRecord,
) -> String {
    let mut buf = DataBuffer::default();
    buf.log_attributes("Resource attributes", resource);
    buf.log_instrumentation_scope(scope);
    buf.log_entry(format!("ObservedTimestamp: {}", lr.observed_timestamp));
    buf.log_entry(format!("Timestamp: {}", lr.timestamp));
    buf.log_entry(format!("SeverityText: {}", lr.severity_text));
    buf.log_entry(format!(
        "SeverityNumber: {}({})",
        lr.severity_number, lr.severity_number as i32
    ));
    buf.log_entry(format!("Body: {}", value_to_string(&lr.body)));
    buf.log_attributes("Attributes", &lr.attributes);
    buf.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zelog_pdata::SeverityNumber;

    #[test]
    fn dump_includes_all_sections() {
        let mut resource = AttributeMap::new();
        resource.insert_str("service.name", "checkout");
        let scope = InstrumentationScope {
            name: "otel".to_string(),
            version: "1.0".to_string(),
            attributes: AttributeMap::new(),
        };
        let mut lr = LogRecord {
            timestamp: 12,
            observed_timestamp: 34,
            severity_number: SeverityNumber::Warn,
            severity_text: "WARN".to_string(),
            body: Value::Str("oops".to_string()),
            ..LogRecord::default()
        };
        lr.attributes.insert_str("k", "v");

        let dump = dump_log_record(&resource, &scope, &lr);
        assert!(dump.contains("Resource attributes:"));
        assert!(dump.contains("service.name: Str(checkout)"));
        assert!(dump.contains("InstrumentationScope otel 1.0"));
        assert!(dump.contains("Timestamp: 12"));
        assert!(dump.contains("SeverityNumber: Warn(13)"));
        assert!(dump.contains("Body: Str(oops)"));
        assert!(dump.contains("k: Str(v)"));
    }

    #[test]
    fn empty_attribute_maps_are_skipped() {
        let dump = dump_log_record(
            &AttributeMap::new(),
            &InstrumentationScope::default(),
            &LogRecord::default(),
        );
        assert!(!dump.contains("Resource attributes:"));
        assert!(!dump.contains("Attributes:"));
    }
}
