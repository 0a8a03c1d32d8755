//! Error taxonomy for the formatting and forwarding pipeline.
//!
//! Match failures are recovered locally (the batcher logs and drops the
//! record); config errors are fatal at startup; export errors surface to
//! the caller so an outer queue/retry layer can retry at batch granularity.

/// Structural configuration errors, raised by [`crate::config::Config::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("profile {profile} invalid, must specify exactly one of source or operator")]
    SourceOrOp { profile: usize },

    #[error("profile {profile} invalid value {value} for {name}, supported values {supported:?}")]
    UnknownKeyword {
        profile: usize,
        name: &'static str,
        value: String,
        supported: Vec<&'static str>,
    },

    #[error(
        "profile {profile} invalid number of expressions {got} for op {op} expecting {expected}"
    )]
    BadArity {
        profile: usize,
        op: String,
        got: usize,
        expected: String,
    },

    #[error("profile {profile} invalid value {value} for {name}, regular expression invalid")]
    BadRegexp {
        profile: usize,
        name: &'static str,
        value: String,
    },

    #[error("send_batch_max_size must be greater or equal to send_batch_size")]
    BatchMaxSize,

    #[error("\"endpoint\" must be a valid URL")]
    BadEndpoint,

    #[error("api_token invalid: must be 40 hex characters")]
    BadApiToken,
}

/// A record failed to match the configured profiles.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// No profile matched; carries the field that disqualified each
    /// profile, in declaration order.
    #[error("no matching profile for log record, failed to find {0:?}")]
    NoMatch(Vec<&'static str>),

    /// Every profile rejected the record solely because the message
    /// evaluated to an empty line after filtering.
    #[error("log record message evaluated to an empty line")]
    EmptyLine,
}

/// Errors surfaced by the authenticated sender.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("missing sl_metadata resource attribute, configure log format processor")]
    MissingMetadata,

    #[error("missing sl_msg log record attribute, configure log format processor")]
    MissingMessage,

    #[error("resource {index} invalid value {value} for sl_format, supported values {supported:?}")]
    InvalidFormat {
        index: usize,
        value: String,
        supported: Vec<&'static str>,
    },

    #[error("got empty stream token")]
    EmptyStreamToken,

    #[error("bad authorization")]
    BadAuthorization,

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
