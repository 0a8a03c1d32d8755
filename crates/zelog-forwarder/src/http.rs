//! HTTP client construction for the ZAPI flusher.

use std::time::Duration;

use tracing::error;

use crate::config::Config;

/// Builds the flusher's reqwest client.
///
/// The ZAPI backend speaks HTTP/1.1 with per-request connection close, so
/// the client pins HTTP/1. Falls back to a default client rather than
/// failing if the builder rejects the configuration.
#[must_use]
pub fn build_client(config: &Config) -> reqwest::Client {
    match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.flush_timeout))
        .http1_only()
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            error!(
                "failed to build HTTP client: {}, using reqwest defaults",
                err
            );
            reqwest::Client::new()
        }
    }
}
