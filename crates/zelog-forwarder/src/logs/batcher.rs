//! Regrouping batch state.
//!
//! Incoming batches dissolve into individual records. Each record is
//! matched against the configured profiles and re-homed into a group
//! keyed by its derived stream identity; groups are flushed downstream
//! as synthesized `ResourceLogs`.

use std::collections::HashMap;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{error, info};

use zelog_pdata::{Logs, ResourceLogs, ScopeLogs};

use crate::config::Config;
use crate::logs::dump::dump_log_record;
use crate::logs::split::split_logs;

pub struct BatchLogs {
    cfg: Arc<Config>,
    groups: HashMap<String, ResourceLogs>,
    /// Largest record count seen in a single group; drives the size
    /// trigger upstream.
    log_count: usize,
}

impl BatchLogs {
    #[must_use]
    pub fn new(cfg: Arc<Config>) -> Self {
        BatchLogs {
            cfg,
            groups: HashMap::new(),
            log_count: 0,
        }
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.log_count
    }

    /// Dissolves `ld` into the grouped state.
    ///
    /// Records that fail to match any profile are logged, dumped at info
    /// level, and dropped.
    pub fn add(&mut self, ld: Logs) {
        if ld.log_record_count() == 0 {
            return;
        }
        for rl in ld.resource_logs {
            let resource = rl.resource;
            let resource_json = resource.to_json().to_string();
            for scope in rl.scope_logs {
                let scope_ident = scope.scope;
                for mut lr in scope.log_records {
                    let (gen, req) = match self.cfg.match_profile(&resource, &mut lr) {
                        Ok(matched) => matched,
                        Err(err) => {
                            error!(error = %err, "failed to match profile");
                            info!("{}", dump_log_record(&resource, &scope_ident, &lr));
                            continue;
                        }
                    };
                    let req_json = match serde_json::to_string(&req) {
                        Ok(json) => json,
                        Err(err) => {
                            error!(error = %err, "failed to marshal metadata");
                            continue;
                        }
                    };
                    let mut hasher = Sha1::new();
                    hasher.update(req_json.as_bytes());
                    hasher.update(resource_json.as_bytes());
                    let key = hex::encode(hasher.finalize());

                    let dest = self.groups.entry(key).or_insert_with(|| {
                        let mut dest = ResourceLogs::new();
                        dest.resource = resource.clone();
                        dest.resource
                            .insert_str("sl_service_group", &gen.service_group);
                        dest.resource.insert_str("sl_host", &gen.host);
                        dest.resource
                            .insert_str("sl_logbasename", &req.logbasename);
                        dest.resource.insert_str("sl_format", &gen.format);
                        dest.resource.insert_str("sl_metadata", &req_json);
                        dest
                    });
                    lr.attributes.insert_str("sl_msg", gen.message);
                    if dest.scope_logs.is_empty() {
                        dest.scope_logs.push(ScopeLogs::default());
                    }
                    let records = &mut dest.scope_logs[0].log_records;
                    records.push(lr);
                    if records.len() > self.log_count {
                        self.log_count = records.len();
                    }
                }
            }
        }
    }

    /// Moves accumulated groups into an outgoing batch.
    ///
    /// Groups larger than `send_batch_max_size` give up exactly that many
    /// records and stay behind for the next pass; everything else moves
    /// out whole. Empty groups are discarded.
    #[must_use]
    pub fn export(&mut self) -> Logs {
        let mut req = Logs::new();
        self.log_count = 0;
        let max = self.cfg.send_batch_max_size as usize;

        let mut moved_out = Vec::new();
        for (key, rl) in &mut self.groups {
            let count = rl.log_record_count();
            if count > 0 {
                if max > 0 && count > max {
                    req.resource_logs.push(split_logs(max, rl));
                    let remaining = count - max;
                    if remaining > self.log_count {
                        self.log_count = remaining;
                    }
                    continue;
                }
                req.resource_logs.push(std::mem::take(rl));
            }
            moved_out.push(key.clone());
        }
        for key in moved_out {
            self.groups.remove(&key);
        }
        req
    }
}
