//! The log formatting and forwarding pipeline.
//!
//! ```text
//!   upstream producer
//!        │  consume_logs()
//!        v
//!   ┌──────────────┐
//!   │   Channel    │ (mpsc, bounded)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │  Processor   │ (worker: matcher + batcher, size/timer driven)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │ ZapiFlusher  │ (token cache, authenticated POST)
//!   └──────────────┘
//! ```

pub mod ascii;
pub mod batcher;
mod dump;
pub mod flusher;
pub mod matcher;
pub mod processor;
pub mod split;

use async_trait::async_trait;

use zelog_pdata::Logs;

use crate::error::ExportError;

/// Downstream seam between the batching processor and whatever consumes
/// its flushed batches. The flusher is the production implementation.
#[async_trait]
pub trait LogsConsumer: Send + Sync {
    async fn consume_logs(&self, logs: Logs) -> Result<(), ExportError>;
}

pub use batcher::BatchLogs;
pub use flusher::ZapiFlusher;
pub use matcher::{MatchResult, StreamTokenRequest};
pub use processor::LogFormatProcessor;
pub use split::split_logs;
