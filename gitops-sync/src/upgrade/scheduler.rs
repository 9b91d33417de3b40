//! Upgrade task queue and worker
//!
//! Requests are acknowledged as soon as they are queued. A single worker
//! runs them one after another, so two upgrades never touch the same
//! working tree at once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::checklog::store::CheckLogStore;
use crate::checklog::{CheckLogBatch, CheckLogRecorder};
use crate::errors::EngineError;
use crate::upgrade::routines::{run_version, UpgradeContext};

/// One queued upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTask {
    pub version: String,
    pub env_id: Option<i64>,
}

/// Clonable submission side of the upgrade queue
#[derive(Debug, Clone)]
pub struct UpgradeScheduler {
    sender: mpsc::UnboundedSender<UpgradeTask>,
}

/// Create a queue and the receiver its worker drains
pub fn channel() -> (UpgradeScheduler, mpsc::UnboundedReceiver<UpgradeTask>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UpgradeScheduler { sender }, receiver)
}

impl UpgradeScheduler {
    /// Queue an upgrade over every environment
    pub fn check_log(&self, version: &str) -> Result<(), EngineError> {
        self.submit(UpgradeTask {
            version: version.to_string(),
            env_id: None,
        })
    }

    /// Queue an upgrade whose manifest sync is limited to one environment
    pub fn check_log_by_env(&self, version: &str, env_id: i64) -> Result<(), EngineError> {
        self.submit(UpgradeTask {
            version: version.to_string(),
            env_id: Some(env_id),
        })
    }

    fn submit(&self, task: UpgradeTask) -> Result<(), EngineError> {
        info!("Queueing upgrade {} (env: {:?})", task.version, task.env_id);
        self.sender
            .send(task)
            .map_err(|_| EngineError::Internal("upgrade worker is not running".to_string()))
    }
}

/// Run one task to completion and persist its batch
pub async fn execute(
    ctx: &UpgradeContext,
    store: &dyn CheckLogStore,
    task: &UpgradeTask,
) -> Result<CheckLogBatch, EngineError> {
    let begin = Utc::now();
    let recorder = CheckLogRecorder::new();

    run_version(ctx, &task.version, task.env_id, &recorder).await;

    let batch = recorder.into_batch(begin, Utc::now())?;
    store.create(&batch).await?;
    info!(
        "Upgrade {} finished with {} check log entries",
        task.version,
        recorder.len()
    );
    Ok(batch)
}

/// Run the upgrade worker until shutdown or until every queue handle is dropped
pub async fn run(
    ctx: Arc<UpgradeContext>,
    store: Arc<dyn CheckLogStore>,
    mut tasks: mpsc::UnboundedReceiver<UpgradeTask>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Upgrade worker starting...");

    loop {
        let task = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Upgrade worker shutting down, draining queued upgrades...");
                tasks.close();
                while let Some(task) = tasks.recv().await {
                    run_task(ctx.as_ref(), store.as_ref(), &task).await;
                }
                return;
            }
            task = tasks.recv() => task,
        };

        let Some(task) = task else {
            info!("Upgrade queue closed, worker exiting");
            return;
        };

        run_task(ctx.as_ref(), store.as_ref(), &task).await;
    }
}

async fn run_task(ctx: &UpgradeContext, store: &dyn CheckLogStore, task: &UpgradeTask) {
    if let Err(e) = execute(ctx, store, task).await {
        error!("Upgrade {} failed to persist its check log: {}", task.version, e);
    }
}
