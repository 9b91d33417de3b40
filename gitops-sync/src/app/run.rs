//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::checklog::CheckLogBatch;
use crate::errors::EngineError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::upgrade::scheduler::{self, UpgradeScheduler};
use crate::upgrade::UpgradeTask;

/// Run the engine until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    info!("Initializing gitops-sync...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start gitops-sync: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Run one upgrade in the foreground and return its persisted batch
pub async fn run_once(options: AppOptions, task: UpgradeTask) -> Result<CheckLogBatch, EngineError> {
    let app_state = AppState::init(&options).await?;
    info!("Running upgrade {} once (env: {:?})", task.version, task.env_id);
    scheduler::execute(app_state.upgrade.as_ref(), app_state.check_logs.as_ref(), &task).await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), EngineError> {
    let app_state = AppState::init(options).await?;

    let upgrade_scheduler = init_upgrade_worker(&app_state, shutdown_manager, shutdown_tx.subscribe())?;

    if options.enable_http_server {
        init_http_server(options, upgrade_scheduler, shutdown_manager, shutdown_tx.subscribe()).await?;
    } else {
        warn!("HTTP server disabled, upgrades can only be run with --upgrade");
    }

    Ok(())
}

fn init_upgrade_worker(
    app_state: &AppState,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<UpgradeScheduler, EngineError> {
    info!("Initializing upgrade worker...");

    let (upgrade_scheduler, tasks) = scheduler::channel();
    let ctx = app_state.upgrade.clone();
    let store = app_state.check_logs.clone();

    let worker_handle = tokio::spawn(async move {
        scheduler::run(
            ctx,
            store,
            tasks,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_upgrade_worker_handle(worker_handle)?;
    Ok(upgrade_scheduler)
}

async fn init_http_server(
    options: &AppOptions,
    upgrade_scheduler: UpgradeScheduler,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), EngineError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(upgrade_scheduler);
    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_http_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    http_server_handle: Option<JoinHandle<Result<(), EngineError>>>,
    upgrade_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            http_server_handle: None,
            upgrade_worker_handle: None,
        }
    }

    pub fn with_upgrade_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), EngineError> {
        if self.upgrade_worker_handle.is_some() {
            return Err(EngineError::ShutdownError("upgrade_worker_handle already set".to_string()));
        }
        self.upgrade_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_http_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), EngineError>>,
    ) -> Result<(), EngineError> {
        if self.http_server_handle.is_some() {
            return Err(EngineError::ShutdownError("server_handle already set".to_string()));
        }
        self.http_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), EngineError> {
        info!("Shutting down gitops-sync...");

        // 1. HTTP server, so no new upgrades are queued
        if let Some(handle) = self.http_server_handle.take() {
            handle.await.map_err(|e| EngineError::ShutdownError(e.to_string()))??;
        }

        // 2. Upgrade worker, after its in-flight run
        if let Some(handle) = self.upgrade_worker_handle.take() {
            handle.await.map_err(|e| EngineError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
