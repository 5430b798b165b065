//! Per-service retry/backoff state machine.
//!
//! The decision logic is split into two pure functions, [`decide`] and
//! [`after_start`], so every transition can be exercised without timers or a
//! real service manager. [`Reconciler`] wires them to a [`ServiceManager`].

use super::services::ServiceManager;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay between a start command and the check that the unit came up
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Start-retry bookkeeping for one managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RetryRecord", into = "RetryRecord")]
pub enum RetryState {
    /// No outstanding failures
    #[default]
    Healthy,
    /// Start failed; next attempt allowed at `next_attempt_at`
    AwaitingRetry {
        attempts: u32,
        last_attempt_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    },
    /// Retry budget exhausted; waits for the unit to be seen running
    PermanentlyFailed {
        attempts: u32,
        last_attempt_at: DateTime<Utc>,
    },
}

impl RetryState {
    /// Start attempts made since the service was last healthy
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Healthy => 0,
            Self::AwaitingRetry { attempts, .. } | Self::PermanentlyFailed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_permanently_failed(&self) -> bool {
        matches!(self, Self::PermanentlyFailed { .. })
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::AwaitingRetry {
                next_attempt_at, ..
            } => Some(*next_attempt_at),
            _ => None,
        }
    }
}

/// On-disk form of [`RetryState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryRecord {
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub permanently_failed: bool,
}

impl From<RetryState> for RetryRecord {
    fn from(state: RetryState) -> Self {
        match state {
            RetryState::Healthy => Self::default(),
            RetryState::AwaitingRetry {
                attempts,
                last_attempt_at,
                next_attempt_at,
            } => Self {
                attempts,
                last_attempt_at: Some(last_attempt_at),
                next_attempt_at: Some(next_attempt_at),
                permanently_failed: false,
            },
            RetryState::PermanentlyFailed {
                attempts,
                last_attempt_at,
            } => Self {
                attempts,
                last_attempt_at: Some(last_attempt_at),
                next_attempt_at: None,
                permanently_failed: true,
            },
        }
    }
}

impl From<RetryRecord> for RetryState {
    fn from(record: RetryRecord) -> Self {
        let last_attempt_at = record.last_attempt_at.unwrap_or_default();
        if record.permanently_failed {
            Self::PermanentlyFailed {
                attempts: record.attempts,
                last_attempt_at,
            }
        } else if record.attempts == 0 {
            Self::Healthy
        } else {
            // A missing deadline means "retry now"
            Self::AwaitingRetry {
                attempts: record.attempts,
                last_attempt_at,
                next_attempt_at: record.next_attempt_at.unwrap_or(last_attempt_at),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval: TimeDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    Start,
    Stop,
}

/// Decide what to do with a service this cycle.
///
/// Returns the action and the retry state to carry forward if the action is
/// `Idle` or `Stop`. For `Start` the returned state is the input unchanged and
/// [`after_start`] computes the successor.
pub fn decide(
    desired_running: bool,
    actual_running: bool,
    state: &RetryState,
    now: DateTime<Utc>,
) -> (Action, RetryState) {
    match (desired_running, actual_running) {
        (true, true) => (Action::Idle, RetryState::Healthy),
        (true, false) => match state {
            RetryState::Healthy => (Action::Start, *state),
            RetryState::AwaitingRetry {
                next_attempt_at, ..
            } if now >= *next_attempt_at => (Action::Start, *state),
            RetryState::AwaitingRetry { .. } | RetryState::PermanentlyFailed { .. } => {
                (Action::Idle, *state)
            }
        },
        (false, true) => (Action::Stop, RetryState::Healthy),
        (false, false) => (Action::Idle, RetryState::Healthy),
    }
}

/// Successor state after a start attempt made at `now`.
pub fn after_start(
    state: &RetryState,
    verified: bool,
    now: DateTime<Utc>,
    policy: &RetryPolicy,
) -> RetryState {
    if verified {
        return RetryState::Healthy;
    }

    let attempts = state.attempts().saturating_add(1);
    if attempts >= policy.max_retries {
        RetryState::PermanentlyFailed {
            attempts,
            last_attempt_at: now,
        }
    } else {
        RetryState::AwaitingRetry {
            attempts,
            last_attempt_at: now,
            next_attempt_at: now
                .checked_add_signed(policy.retry_interval)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Applies [`decide`] / [`after_start`] against a live service manager.
pub struct Reconciler {
    manager: Arc<dyn ServiceManager>,
    policy: RetryPolicy,
    settle_delay: Duration,
}

impl Reconciler {
    /// Create a reconciler driving `manager` under `policy`
    pub fn new(manager: Arc<dyn ServiceManager>, policy: RetryPolicy) -> Self {
        Self {
            manager,
            policy,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Set the wait between a start and its verification
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Reconcile one service and return its next retry state.
    pub async fn reconcile(
        &self,
        name: &str,
        desired_running: bool,
        state: &RetryState,
        now: DateTime<Utc>,
    ) -> RetryState {
        let actual_running = self.manager.is_active(name).await;

        if desired_running && actual_running && state.is_permanently_failed() {
            info!(service = %name, "Service is running again, resetting retry state");
        }

        let (action, next) = decide(desired_running, actual_running, state, now);
        match action {
            Action::Idle => {
                if desired_running && !actual_running {
                    match next {
                        RetryState::AwaitingRetry {
                            attempts,
                            next_attempt_at,
                            ..
                        } => info!(
                            service = %name,
                            "Service is down, waiting for retry {}/{} at {}",
                            attempts + 1,
                            self.policy.max_retries,
                            next_attempt_at
                        ),
                        RetryState::PermanentlyFailed { attempts, .. } => warn!(
                            service = %name,
                            "Service is down and gave up after {} attempts, not retrying",
                            attempts
                        ),
                        RetryState::Healthy => {}
                    }
                }
                next
            }
            Action::Start => {
                info!(
                    service = %name,
                    "Service should be running but is not, attempting to start"
                );
                let verified = self.start_verified(name).await;
                let next = after_start(&next, verified, now, &self.policy);
                match next {
                    RetryState::Healthy => {}
                    RetryState::AwaitingRetry {
                        attempts,
                        next_attempt_at,
                        ..
                    } => warn!(
                        service = %name,
                        "Service start failed, attempt {}/{}, next attempt at {}",
                        attempts,
                        self.policy.max_retries,
                        next_attempt_at
                    ),
                    RetryState::PermanentlyFailed { attempts, .. } => error!(
                        service = %name,
                        "Service failed to start after {} attempts, giving up",
                        attempts
                    ),
                }
                next
            }
            Action::Stop => {
                info!(service = %name, "Service should not be running, stopping");
                match self.manager.stop(name).await {
                    Ok(()) => info!(service = %name, "Successfully stopped service"),
                    Err(e) => error!(service = %name, "Failed to stop service: {}", e),
                }
                next
            }
        }
    }

    /// Issue a start and confirm the unit is active after the settle delay.
    async fn start_verified(&self, name: &str) -> bool {
        if let Err(e) = self.manager.start(name).await {
            error!(service = %name, "Failed to start service: {}", e);
            return false;
        }

        tokio::time::sleep(self.settle_delay).await;

        if self.manager.is_active(name).await {
            info!(service = %name, "Successfully started service");
            true
        } else {
            error!(service = %name, "Service not active after start command");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::services::testing::FakeServiceManager;
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            retry_interval: TimeDelta::seconds(600),
        }
    }

    fn reconciler(manager: &Arc<FakeServiceManager>) -> Reconciler {
        Reconciler::new(manager.clone(), policy()).with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn running_and_wanted_is_healthy() {
        let failed = RetryState::PermanentlyFailed {
            attempts: 3,
            last_attempt_at: t0(),
        };
        assert_eq!(
            decide(true, true, &failed, t0()),
            (Action::Idle, RetryState::Healthy)
        );
    }

    #[test]
    fn down_and_wanted_starts_when_due() {
        let waiting = RetryState::AwaitingRetry {
            attempts: 1,
            last_attempt_at: t0(),
            next_attempt_at: t0() + TimeDelta::seconds(600),
        };
        assert_eq!(decide(true, false, &RetryState::Healthy, t0()).0, Action::Start);
        assert_eq!(
            decide(true, false, &waiting, t0() + TimeDelta::seconds(599)),
            (Action::Idle, waiting)
        );
        assert_eq!(
            decide(true, false, &waiting, t0() + TimeDelta::seconds(600)).0,
            Action::Start
        );
    }

    #[test]
    fn permanently_failed_is_left_alone() {
        let failed = RetryState::PermanentlyFailed {
            attempts: 3,
            last_attempt_at: t0(),
        };
        let later = t0() + TimeDelta::days(30);
        assert_eq!(decide(true, false, &failed, later), (Action::Idle, failed));
    }

    #[test]
    fn unwanted_services_reset_retry_state() {
        let waiting = RetryState::AwaitingRetry {
            attempts: 2,
            last_attempt_at: t0(),
            next_attempt_at: t0(),
        };
        assert_eq!(
            decide(false, true, &waiting, t0()),
            (Action::Stop, RetryState::Healthy)
        );
        assert_eq!(
            decide(false, false, &waiting, t0()),
            (Action::Idle, RetryState::Healthy)
        );
    }

    #[test]
    fn failed_starts_escalate_to_permanent_failure() {
        let p = policy();
        let first = after_start(&RetryState::Healthy, false, t0(), &p);
        assert_eq!(
            first,
            RetryState::AwaitingRetry {
                attempts: 1,
                last_attempt_at: t0(),
                next_attempt_at: t0() + TimeDelta::seconds(600),
            }
        );

        let second = after_start(&first, false, t0() + TimeDelta::seconds(600), &p);
        assert_eq!(second.attempts(), 2);
        assert!(!second.is_permanently_failed());

        let third = after_start(&second, false, t0() + TimeDelta::seconds(1200), &p);
        assert_eq!(third.attempts(), 3);
        assert!(third.is_permanently_failed());
        assert_eq!(third.next_attempt_at(), None);
    }

    #[test]
    fn verified_start_resets() {
        let waiting = RetryState::AwaitingRetry {
            attempts: 2,
            last_attempt_at: t0(),
            next_attempt_at: t0(),
        };
        assert_eq!(after_start(&waiting, true, t0(), &policy()), RetryState::Healthy);
    }

    #[test]
    fn record_round_trip_keeps_invariants() {
        let healthy: RetryRecord = RetryState::Healthy.into();
        assert_eq!(healthy.attempts, 0);
        assert_eq!(healthy.next_attempt_at, None);

        let failed = RetryState::PermanentlyFailed {
            attempts: 3,
            last_attempt_at: t0(),
        };
        let json = serde_json::to_value(failed).unwrap();
        assert_eq!(json["permanently_failed"], true);
        assert_eq!(json["attempts"], 3);
        assert_eq!(serde_json::from_value::<RetryState>(json).unwrap(), failed);
    }

    #[test]
    fn record_without_deadline_retries_immediately() {
        let record = RetryRecord {
            attempts: 1,
            last_attempt_at: Some(t0()),
            next_attempt_at: None,
            permanently_failed: false,
        };
        let state = RetryState::from(record);
        assert_eq!(decide(true, false, &state, t0()).0, Action::Start);
    }

    #[tokio::test]
    async fn start_is_verified() {
        let manager = Arc::new(FakeServiceManager::new());
        manager.set_start_does_not_stick(true);
        let reconciler = reconciler(&manager);

        let next = reconciler
            .reconcile("node_exporter", true, &RetryState::Healthy, t0())
            .await;

        assert_eq!(manager.start_calls("node_exporter"), 1);
        assert_eq!(next.attempts(), 1);
    }

    #[tokio::test]
    async fn successful_start_is_healthy() {
        let manager = Arc::new(FakeServiceManager::new());
        let reconciler = reconciler(&manager);

        let next = reconciler
            .reconcile("node_exporter", true, &RetryState::Healthy, t0())
            .await;

        assert_eq!(next, RetryState::Healthy);
        assert!(manager.running("node_exporter"));
    }

    #[tokio::test]
    async fn always_failing_start_is_attempted_max_retries_times() {
        let manager = Arc::new(FakeServiceManager::new());
        manager.set_start_fails(true);
        let reconciler = reconciler(&manager);

        let mut state = RetryState::Healthy;
        let mut now = t0();
        let mut previous_attempts = 0;
        for _ in 0..10 {
            state = reconciler.reconcile("cgroup_exporter", true, &state, now).await;
            if !state.is_permanently_failed() {
                assert!(state.attempts() > previous_attempts);
            }
            previous_attempts = state.attempts();
            now += TimeDelta::seconds(600);
        }

        assert_eq!(manager.start_calls("cgroup_exporter"), 3);
        assert!(state.is_permanently_failed());
        assert_eq!(state.attempts(), 3);
    }

    #[tokio::test]
    async fn external_recovery_resets_permanent_failure() {
        let manager = Arc::new(FakeServiceManager::new());
        manager.set_running("node_exporter", true);
        let reconciler = reconciler(&manager);
        let failed = RetryState::PermanentlyFailed {
            attempts: 3,
            last_attempt_at: t0(),
        };

        let next = reconciler.reconcile("node_exporter", true, &failed, t0()).await;

        assert_eq!(next, RetryState::Healthy);
        assert_eq!(manager.start_calls("node_exporter"), 0);
    }

    #[tokio::test]
    async fn failed_stop_is_retried_every_cycle_without_backoff() {
        let manager = Arc::new(FakeServiceManager::new());
        manager.set_running("node_exporter", true);
        manager.set_stop_fails(true);
        let reconciler = reconciler(&manager);

        let mut state = RetryState::Healthy;
        for cycle in 1..=3 {
            state = reconciler.reconcile("node_exporter", false, &state, t0()).await;
            assert_eq!(manager.stop_calls("node_exporter"), cycle);
            assert_eq!(state, RetryState::Healthy);
        }
    }
}
