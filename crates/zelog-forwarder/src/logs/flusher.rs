//! Authenticated delivery to the ZAPI backend.
//!
//! Every stream authenticates with its own token, obtained by POSTing the
//! stream's metadata (`sl_metadata`) to the token endpoint. Tokens are
//! cached per metadata string; a 401 on delivery clears the cached token
//! and retries exactly once with a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use zelog_pdata::{Logs, ResourceLogs, Value};

use crate::config::{
    Config, Verbosity, FORMAT_CONTAINER, FORMAT_EVENT, FORMAT_MESSAGE,
};
use crate::error::ExportError;
use crate::http::build_client;
use crate::logs::LogsConsumer;

const FORMATS: &[&str] = &[FORMAT_MESSAGE, FORMAT_CONTAINER, FORMAT_EVENT];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
}

/// Sender for formatted log groups.
pub struct ZapiFlusher {
    cfg: Arc<Config>,
    client: reqwest::Client,
    /// Stream token cache, keyed by the group's `sl_metadata` string.
    stream_tokens: Mutex<HashMap<String, String>>,
}

impl ZapiFlusher {
    #[must_use]
    pub fn new(cfg: Arc<Config>) -> Self {
        let client = build_client(&cfg);
        ZapiFlusher {
            cfg,
            client,
            stream_tokens: Mutex::new(HashMap::new()),
        }
    }

    fn stream_token_request(rl: &ResourceLogs) -> Result<String, ExportError> {
        match rl.resource.get("sl_metadata") {
            Some(val) => {
                let request = val.as_text();
                if request.is_empty() {
                    return Err(ExportError::MissingMetadata);
                }
                Ok(request)
            }
            None => Err(ExportError::MissingMetadata),
        }
    }

    // Newline-terminated concatenation of every record's sl_msg.
    fn marshal_logs(rl: &ResourceLogs) -> Result<String, ExportError> {
        let mut out = String::new();
        for scope in &rl.scope_logs {
            for lr in &scope.log_records {
                let msg = lr
                    .attributes
                    .get("sl_msg")
                    .map(Value::as_text)
                    .unwrap_or_default();
                if msg.is_empty() {
                    return Err(ExportError::MissingMessage);
                }
                out.push_str(&msg);
                out.push('\n');
            }
        }
        Ok(out)
    }

    async fn get_stream_token(&self, request: &str) -> Result<String, ExportError> {
        let url = format!("{}/api/v2/token", self.cfg.endpoint);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.cfg.api_token))
            .header("Content-Type", "application/json")
            .header("Connection", "close")
            .body(request.to_string())
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "HTTP error getting stream token");
                ExportError::from(err)
            })?;
        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, "token endpoint returned an error");
            return Err(ExportError::Status(status));
        }
        let body = resp.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|err| {
            error!(error = %err, body = %body, "unable to parse token response");
            ExportError::EmptyStreamToken
        })?;
        if parsed.token.is_empty() {
            error!(body = %body, "got empty stream token");
            return Err(ExportError::EmptyStreamToken);
        }
        Ok(parsed.token)
    }

    async fn send_group(
        &self,
        request: &str,
        format: &str,
        buffer: &str,
    ) -> Result<(), ExportError> {
        let mut already_retried = false;
        let mut token = self
            .stream_tokens
            .lock()
            .await
            .get(request)
            .cloned()
            .unwrap_or_default();
        loop {
            if token.is_empty() {
                token = self.get_stream_token(request).await?;
                self.stream_tokens
                    .lock()
                    .await
                    .insert(request.to_string(), token.clone());
            }
            let url = match format {
                FORMAT_EVENT => format!("{}/api/v2/tmpost", self.cfg.endpoint),
                _ => format!("{}/api/v2/post", self.cfg.endpoint),
            };
            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Token {token}"))
                .header("Content-Type", "application/json")
                .header("Transfer-Encoding", "chunked")
                .header("Connection", "close")
                .body(buffer.to_string())
                .send()
                .await
                .map_err(|err| {
                    info!(error = %err, "HTTP error sending data");
                    ExportError::from(err)
                })?;
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED {
                error!(status = %status, "authorization error posting to ZAPI");
                self.stream_tokens.lock().await.remove(request);
                if !already_retried {
                    info!("refresh token ...");
                    token.clear();
                    already_retried = true;
                    continue;
                }
                return Err(ExportError::BadAuthorization);
            }
            if status.as_u16() >= 300 {
                return Err(ExportError::Status(status));
            }
            // Drain the response body so the connection can close cleanly.
            let _ = resp.bytes().await?;
            return Ok(());
        }
    }
}

#[async_trait]
impl LogsConsumer for ZapiFlusher {
    async fn consume_logs(&self, ld: Logs) -> Result<(), ExportError> {
        info!(logs = ld.log_record_count(), "ZAPI | pushing logs");

        for (index, rl) in ld.resource_logs.iter().enumerate() {
            let request = Self::stream_token_request(rl).map_err(|err| {
                error!(error = %err, "failed to get metadata");
                err
            })?;
            let buffer = Self::marshal_logs(rl).map_err(|err| {
                error!(error = %err, "failed to marshal log messages");
                err
            })?;

            if self.cfg.verbosity == Verbosity::Detailed {
                info!("{request}");
                info!("{buffer}");
            }

            let format = rl
                .resource
                .get("sl_format")
                .map(Value::as_text)
                .unwrap_or_default();
            if !FORMATS.contains(&format.as_str()) {
                return Err(ExportError::InvalidFormat {
                    index,
                    value: format,
                    supported: FORMATS.to_vec(),
                });
            }

            self.send_group(&request, &format, &buffer)
                .await
                .map_err(|err| {
                    error!(error = %err, "failed to send logs");
                    err
                })?;
        }
        Ok(())
    }
}
