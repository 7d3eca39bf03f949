use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::sync::{PassReport, ReconciliationEngine};

/// Anything that can run a full reconciliation pass.
#[async_trait]
pub trait PassRunner: Send + Sync + 'static {
    async fn run_pass(&self) -> Result<PassReport>;
}

#[async_trait]
impl PassRunner for ReconciliationEngine {
    async fn run_pass(&self) -> Result<PassReport> {
        ReconciliationEngine::run_pass(self).await
    }
}

#[derive(Debug, Clone)]
pub struct PassTrigger {
    pub origin: &'static str,
    pub received_at: DateTime<Utc>,
}

impl PassTrigger {
    pub fn new(origin: &'static str) -> Self {
        Self {
            origin,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// The queue was full; an already queued pass will cover this trigger.
    Coalesced,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("pass worker is no longer running")]
    Closed,
}

/// Producer side of the pass queue. Cheap to clone.
#[derive(Clone)]
pub struct PassQueue {
    tx: mpsc::Sender<PassTrigger>,
}

impl PassQueue {
    pub fn enqueue(&self, trigger: PassTrigger) -> std::result::Result<Enqueued, QueueError> {
        match self.tx.try_send(trigger) {
            Ok(()) => Ok(Enqueued::Queued),
            Err(mpsc::error::TrySendError::Full(trigger)) => {
                debug!(origin = trigger.origin, "pass queue full, coalescing trigger");
                Ok(Enqueued::Coalesced)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }
}

/// Start the single consumer. Passes run one after another, in trigger order.
pub fn spawn_worker<R: PassRunner>(runner: Arc<R>, capacity: usize) -> (PassQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_worker(runner, rx));
    (PassQueue { tx }, handle)
}

async fn run_worker<R: PassRunner>(runner: Arc<R>, mut rx: mpsc::Receiver<PassTrigger>) {
    while let Some(trigger) = rx.recv().await {
        let waited = Utc::now() - trigger.received_at;
        info!(
            origin = trigger.origin,
            waited_ms = waited.num_milliseconds(),
            "pass triggered"
        );

        // A separate task turns a panic inside the pass into a JoinError
        // instead of unwinding through this loop.
        let pass = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run_pass().await }
        });

        match pass.await {
            Ok(Ok(report)) => debug!(?report, "pass succeeded"),
            Ok(Err(err)) => error!(error = %err, "reconciliation pass failed"),
            Err(join) if join.is_panic() => error!(error = %join, "reconciliation pass panicked"),
            Err(join) => warn!(error = %join, "reconciliation pass was cancelled"),
        }
    }
    info!("pass queue closed, worker exiting");
}
