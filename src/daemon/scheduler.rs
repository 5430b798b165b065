use super::clock::Clock;
use super::control_plane::ControlPlane;
use super::discovery::DiscoveryPublisher;
use super::reconciler::{Reconciler, RetryPolicy, RetryState};
use super::role::RoleResolver;
use super::services::ServiceManager;
use super::state::{PersistedState, StateStore};
use crate::config::MonitorConfig;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No control-plane endpoint answered the probe
    Unreachable,
    /// Role could not be determined; nothing was touched
    RoleUnknown,
    Reconciled { role_active: bool, role_changed: bool },
}

/// The reconciliation loop: probe, resolve, reconcile, publish, persist, sleep.
pub struct Scheduler {
    control_plane: Arc<dyn ControlPlane>,
    resolver: RoleResolver,
    reconciler: Reconciler,
    publisher: DiscoveryPublisher,
    store: StateStore,
    clock: Arc<dyn Clock>,
    services: Vec<String>,
    check_interval: Duration,
    retry: BTreeMap<String, RetryState>,
    previous_role: Option<bool>,
}

impl Scheduler {
    /// Build a scheduler and restore retry state from the state file.
    pub fn new(
        config: &MonitorConfig,
        hostname: &str,
        control_plane: Arc<dyn ControlPlane>,
        services: Arc<dyn ServiceManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
        };
        let store = StateStore::new(&config.state_dir, hostname);
        let persisted = store.load();

        let retry = config
            .services
            .iter()
            .map(|name| {
                let state = persisted.retry_state.get(name).copied().unwrap_or_default();
                (name.clone(), state)
            })
            .collect();

        Self {
            control_plane,
            resolver: RoleResolver::new(hostname, config.role.clone()),
            reconciler: Reconciler::new(services, policy),
            publisher: DiscoveryPublisher::new(
                config.prometheus_targets_dir.clone(),
                hostname,
                config.cluster_name.clone(),
                config.exporters(),
            ),
            store,
            clock,
            services: config.services.clone(),
            check_interval: config.check_interval(),
            retry,
            previous_role: persisted.role_active,
        }
    }

    /// Set the wait between a start and its verification
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.reconciler = self.reconciler.with_settle_delay(delay);
        self
    }

    /// Current retry state of `service`
    pub fn retry_state(&self, service: &str) -> RetryState {
        self.retry.get(service).copied().unwrap_or_default()
    }

    /// Run one reconciliation cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if let Err(e) = self.control_plane.probe().await {
            error!("Cannot connect to BCM REST API, retrying next cycle: {}", e);
            return CycleOutcome::Unreachable;
        }

        let checked_at = self.clock.now();
        let Some(assignment) = self
            .resolver
            .resolve(self.control_plane.as_ref(), checked_at)
            .await
        else {
            error!("Could not determine role status, not making any changes");
            return CycleOutcome::RoleUnknown;
        };

        let role_active = assignment.active;
        let role_changed = self.previous_role != Some(role_active);
        if role_changed {
            info!(
                role = %self.resolver.role(),
                "Role change detected: {} role = {} (was {:?})",
                self.resolver.role(),
                role_active,
                self.previous_role
            );
        }

        for name in &self.services {
            let current = self.retry.get(name).copied().unwrap_or_default();
            let next = self
                .reconciler
                .reconcile(name, role_active, &current, self.clock.now())
                .await;
            self.retry.insert(name.clone(), next);
        }

        match self.publisher.publish(role_active) {
            Ok(outcome) => debug!("Discovery publish outcome: {:?}", outcome),
            Err(e) => error!(
                "Error updating Prometheus targets in {}: {}",
                self.publisher.dir().display(),
                e
            ),
        }

        let state = PersistedState {
            role_active: Some(role_active),
            last_check: Some(assignment.checked_at),
            retry_state: self.retry.clone(),
        };
        if let Err(e) = self.store.save(&state) {
            error!("Error saving state to {}: {}", self.store.path().display(), e);
        }

        self.previous_role = Some(role_active);
        CycleOutcome::Reconciled {
            role_active,
            role_changed,
        }
    }

    /// Run cycles until `shutdown` resolves. A shutdown interrupts an in-flight
    /// cycle or sleep.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting BCM role monitor for node {} (interval: {:?})",
            self.resolver.hostname(),
            self.check_interval
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                outcome = self.run_cycle() => debug!("Cycle finished: {:?}", outcome),
                _ = &mut shutdown => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Received shutdown signal, role monitor stopped");
    }
}

/// Resolves on SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}
