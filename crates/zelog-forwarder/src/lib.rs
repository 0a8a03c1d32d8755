//! Log-stream formatting and forwarding for the zelog collector.
//!
//! The pipeline ingests resource-grouped log batches, classifies each
//! record against an ordered list of user-defined profiles, regroups
//! records by their derived stream identity, batches them by size or
//! deadline, and forwards each group to the ZAPI backend with per-stream
//! authentication tokens.
//!
//! The three moving parts, in dependency order:
//!
//! 1. [`logs::matcher`] — the profile matcher and its expression language
//! 2. [`logs::processor`] / [`logs::batcher`] — the regrouping batcher
//! 3. [`logs::flusher`] — the authenticated sender
//!
//! Wiring them up:
//!
//! ```rust,ignore
//! let cfg = Arc::new(config);
//! cfg.validate()?;
//! let flusher = Arc::new(ZapiFlusher::new(Arc::clone(&cfg)));
//! let processor = LogFormatProcessor::start(cfg, flusher);
//! processor.consume_logs(batch).await?;
//! // ...
//! processor.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logs;

pub use config::{Config, ConfigAttribute, ConfigExpression, ConfigProfile, Verbosity};
pub use error::{ConfigError, ExportError, MatchError};
pub use logs::{LogFormatProcessor, LogsConsumer, MatchResult, StreamTokenRequest, ZapiFlusher};
