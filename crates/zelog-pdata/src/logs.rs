//! Resource-grouped log batches.

use crate::severity::SeverityNumber;
use crate::value::{AttributeMap, Value};

/// A batch of resource-grouped logs, the unit handed to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logs {
    pub resource_logs: Vec<ResourceLogs>,
}

impl Logs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total record count across all resources and scopes.
    #[must_use]
    pub fn log_record_count(&self) -> usize {
        self.resource_logs
            .iter()
            .map(ResourceLogs::log_record_count)
            .sum()
    }
}

/// Logs sharing one set of resource attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLogs {
    pub resource: AttributeMap,
    pub scope_logs: Vec<ScopeLogs>,
}

impl ResourceLogs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn log_record_count(&self) -> usize {
        self.scope_logs.iter().map(|s| s.log_records.len()).sum()
    }
}

/// The instrumentation scope a group of records was emitted under.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
    pub attributes: AttributeMap,
}

/// Records from a single instrumentation scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeLogs {
    pub scope: InstrumentationScope,
    pub log_records: Vec<LogRecord>,
}

/// One log record.
///
/// Timestamps are nanoseconds since the Unix epoch; `observed_timestamp`
/// is the fallback when `timestamp` is zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    pub timestamp: u64,
    pub observed_timestamp: u64,
    pub severity_number: SeverityNumber,
    pub severity_text: String,
    pub body: Value,
    pub attributes: AttributeMap,
}
