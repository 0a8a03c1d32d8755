//! The batching worker.
//!
//! One worker task owns the grouped state and its flush timer. Producers
//! hand batches over a bounded channel and never touch the state; the
//! worker multiplexes channel receive, the timer deadline, and the
//! shutdown signal on a single `select!`.
//!
//! Batches are flushed when the largest group reaches `send_batch_size`
//! or when the timer fires with pending records. Shutdown drains the
//! channel without blocking, performs a final flush, and exits.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use zelog_pdata::Logs;

use crate::config::Config;
use crate::logs::batcher::BatchLogs;
use crate::logs::LogsConsumer;

/// Handle to the running pipeline worker.
pub struct LogFormatProcessor {
    tx: mpsc::Sender<Logs>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl LogFormatProcessor {
    /// Spawns the worker task and returns the handle producers use.
    ///
    /// The inbound channel is bounded by the available parallelism, so
    /// `consume_logs` only ever blocks on a full channel.
    #[must_use]
    pub fn start(cfg: Arc<Config>, next: Arc<dyn LogsConsumer>) -> Self {
        let capacity = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_worker(cfg, rx, next, cancel.clone()));
        LogFormatProcessor { tx, cancel, worker }
    }

    /// Enqueues a batch for the worker.
    pub async fn consume_logs(&self, ld: Logs) -> Result<(), mpsc::error::SendError<Logs>> {
        self.tx.send(ld).await
    }

    /// Signals shutdown and waits for the worker to drain and exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.worker.await {
            warn!(error = %err, "pipeline worker exited abnormally");
        }
    }
}

async fn run_worker(
    cfg: Arc<Config>,
    mut rx: mpsc::Receiver<Logs>,
    next: Arc<dyn LogsConsumer>,
    cancel: CancellationToken,
) {
    debug!("log format processor started");
    let mut batch = BatchLogs::new(Arc::clone(&cfg));
    let timeout = cfg.timeout;
    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                // Drain whatever is already queued, then flush the rest.
                while let Ok(item) = rx.try_recv() {
                    process_item(&mut batch, &cfg, next.as_ref(), item).await;
                }
                if batch.item_count() > 0 {
                    send_items(&mut batch, next.as_ref()).await;
                }
                debug!("log format processor shut down");
                return;
            }
            Some(item) = rx.recv() => {
                let sent = process_item(&mut batch, &cfg, next.as_ref(), item).await;
                if sent {
                    timer.as_mut().reset(Instant::now() + timeout);
                }
            }
            () = &mut timer => {
                if batch.item_count() > 0 {
                    send_items(&mut batch, next.as_ref()).await;
                }
                timer.as_mut().reset(Instant::now() + timeout);
            }
        }
    }
}

// Adds the item and flushes while the size trigger holds. Returns whether
// anything was sent so the caller can reset the timer.
async fn process_item(
    batch: &mut BatchLogs,
    cfg: &Config,
    next: &dyn LogsConsumer,
    item: Logs,
) -> bool {
    batch.add(item);
    let mut sent = false;
    while batch.item_count() >= cfg.send_batch_size as usize {
        sent = true;
        send_items(batch, next).await;
    }
    sent
}

async fn send_items(batch: &mut BatchLogs, next: &dyn LogsConsumer) {
    let ld = batch.export();
    if let Err(err) = next.consume_logs(ld).await {
        warn!(error = %err, "sender failed");
    }
}
