//! Command/query surface over the engine.

use crate::client::{ClientError, ClientFactory};
use crate::executor::{CheckExecutor, CheckListener, CheckOutcome, PersistHook};
use crate::registry::{Registry, RegistryError};
use crate::scheduler::{Scheduler, SweepListener};
use crate::types::{MonitorConfig, NewTarget, Target, TargetId};
use std::sync::Arc;
use tracing::debug;

/// Builder for [`Monitor`]
pub struct MonitorBuilder {
    config: MonitorConfig,
    persist: Option<PersistHook>,
    on_sweep: Option<SweepListener>,
    on_check: Option<CheckListener>,
}

impl MonitorBuilder {
    /// Register the durable-state callback
    pub fn persist_with(mut self, hook: PersistHook) -> Self {
        self.persist = Some(hook);
        self
    }

    /// Register a callback for scheduled sweep reports
    pub fn on_sweep(mut self, listener: SweepListener) -> Self {
        self.on_sweep = Some(listener);
        self
    }

    /// Register a callback for every completed check, including the first
    /// check after creation
    pub fn on_check(mut self, listener: CheckListener) -> Self {
        self.on_check = Some(listener);
        self
    }

    pub fn build(self) -> Result<Monitor, ClientError> {
        let registry = Arc::new(Registry::new());
        let clients = ClientFactory::new(self.config.request_timeout)?;
        let mut executor = CheckExecutor::new(registry.clone(), clients, self.persist.clone());
        if let Some(listener) = self.on_check {
            executor = executor.with_listener(listener);
        }
        let executor = Arc::new(executor);

        let mut scheduler = Scheduler::new(executor.clone(), self.config.interval);
        if let Some(listener) = self.on_sweep {
            scheduler = scheduler.with_listener(listener);
        }

        Ok(Monitor {
            registry,
            executor,
            scheduler: Arc::new(scheduler),
            persist: self.persist,
        })
    }
}

/// Website change monitor.
///
/// Owns the registry, the check executor and the sweep scheduler. All
/// methods hand out copies of targets.
pub struct Monitor {
    registry: Arc<Registry>,
    executor: Arc<CheckExecutor>,
    scheduler: Arc<Scheduler>,
    persist: Option<PersistHook>,
}

impl Monitor {
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder {
            config,
            persist: None,
            on_sweep: None,
            on_check: None,
        }
    }

    /// Register a target, persist it, and kick off its first check.
    ///
    /// The first check runs on a detached task; this returns the target as
    /// stored, before that check completes.
    pub async fn create_target(&self, new: NewTarget) -> Result<Target, RegistryError> {
        let target = self
            .registry
            .create_with(new, |target| {
                if let Some(persist) = &self.persist {
                    persist(target);
                }
            })
            .await?;

        let executor = self.executor.clone();
        let id = target.id;
        tokio::spawn(async move {
            if executor.check(id).await.is_none() {
                debug!(id, "Initial check skipped, target already removed");
            }
        });

        Ok(target)
    }

    /// Remove a target from memory. Durable state is the caller's concern.
    pub async fn delete_target(&self, id: TargetId) -> bool {
        self.registry.delete(id).await
    }

    pub async fn targets(&self) -> Vec<Target> {
        self.registry.list().await
    }

    pub async fn target(&self, id: TargetId) -> Option<Target> {
        self.registry.get(id).await
    }

    /// Check one target now, independent of the sweep cadence
    pub async fn check_now(&self, id: TargetId) -> Option<(Target, CheckOutcome)> {
        self.executor.check(id).await
    }

    /// Replay a stored target at startup (no id assigned, no check run)
    pub async fn restore(&self, target: Target) {
        self.registry.restore(target).await;
    }

    pub async fn advance_counter_past(&self, id: TargetId) {
        self.registry.advance_counter_past(id).await;
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}
