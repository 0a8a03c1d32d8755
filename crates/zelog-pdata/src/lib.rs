//! Shared log data model for the zelog pipeline.
//!
//! This crate owns the resource→scope→record shape that the formatting
//! processor and the ZAPI flusher pass between each other:
//!
//! ```text
//!   Logs
//!    └─ ResourceLogs (resource attributes)
//!        └─ ScopeLogs (instrumentation scope)
//!            └─ LogRecord (timestamp, severity, body, attributes)
//! ```
//!
//! Values are a tagged union (`Value`) and attribute maps preserve
//! insertion order. Everything is plain owned data: the batcher moves
//! records between groups by value instead of going through handles.

pub mod logs;
pub mod severity;
pub mod value;

pub use logs::{InstrumentationScope, LogRecord, Logs, ResourceLogs, ScopeLogs};
pub use severity::SeverityNumber;
pub use value::{AttributeMap, Value};
