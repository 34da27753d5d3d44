//! Engine wiring and lifecycle.
//!
//! The engine owns the shared transport, the quota ledger, the task
//! store, and the generation controller, and runs the background daemons
//! (scheduler, task reaper, quota cleanup). Construction order is
//! ledger → store → controller → daemons; shutdown cancels the daemons in
//! the reverse order via child tokens of one root token.

use crate::config::GatewayConfig;
use crate::generation::GenerationController;
use crate::quota::{QuotaError, QuotaLedger, ServiceLimits};
use crate::task::{TaskScheduler, TaskStore};
use crate::upstream::{ReqwestTransport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How often stale quota rows are swept.
const QUOTA_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Startup failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Quota ledger could not be opened.
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// HTTP client construction failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The assembled gateway core.
pub struct Engine {
    config: GatewayConfig,
    ledger: Arc<QuotaLedger>,
    store: Arc<TaskStore>,
    controller: Arc<GenerationController<ReqwestTransport>>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Builds the engine from configuration. No daemons run yet.
    pub fn new(config: GatewayConfig) -> Result<Self, EngineError> {
        let transport = if config.proxy.enabled {
            info!(proxy = %config.proxy.url(), "Routing upstream traffic through proxy");
            ReqwestTransport::with_proxy(config.generation.http_timeout_secs, &config.proxy)?
        } else {
            ReqwestTransport::new(config.generation.http_timeout_secs)?
        };

        let ledger = Arc::new(QuotaLedger::open(
            &config.quota.data_dir,
            ServiceLimits::from(&config.quota),
        )?);
        let store = Arc::new(TaskStore::new());
        let controller = Arc::new(GenerationController::new(
            transport,
            config.mirrors.clone(),
            Arc::clone(&ledger),
            config.generation.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            store,
            controller,
            shutdown: CancellationToken::new(),
        })
    }

    /// Starts the scheduler, the task reaper, and the quota cleanup
    /// daemon.
    pub fn start(&self) {
        let scheduler = TaskScheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.controller),
            self.config.task.clone(),
        );
        tokio::spawn(scheduler.run(self.shutdown.child_token()));

        tokio::spawn(Arc::clone(&self.store).run_reaper(
            Duration::from_secs(self.config.task.retention_secs),
            self.shutdown.child_token(),
        ));

        let ledger = Arc::clone(&self.ledger);
        let retention_days = self.config.quota.retention_days;
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(QUOTA_CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = ledger.cleanup(retention_days) {
                            tracing::warn!(error = %e, "Quota cleanup failed");
                        }
                    }
                }
            }
        });

        info!("Engine daemons started");
    }

    /// Signals every daemon to stop.
    pub fn shutdown(&self) {
        info!("Engine shutting down");
        self.shutdown.cancel();
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn controller(&self) -> &Arc<GenerationController<ReqwestTransport>> {
        &self.controller
    }
}
