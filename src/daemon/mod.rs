//! Role monitor daemon - keeps node exporters in line with BCM role assignment
//!
//! Each cycle:
//! - Probes the BCM REST API and resolves whether this node holds the role
//! - Starts or stops the managed exporter units to match (with bounded retry)
//! - Publishes or withdraws the node's Prometheus `file_sd` descriptor
//! - Persists retry state so a restart resumes backoff
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                   Scheduler                    │
//! ├────────────────────────────────────────────────┤
//! │ ControlPlane │ Reconciler │ Discovery │ State  │
//! │ (BCM, mTLS)  │ (retry SM) │ (file_sd) │ (json) │
//! ├────────────────────────────────────────────────┤
//! │   systemctl: cgroup │ node │ nvidia_gpu ...    │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! The loop is single-threaded and strictly sequential; every external call
//! is bounded by a timeout.

pub mod clock;
pub mod control_plane;
pub mod discovery;
pub mod reconciler;
pub mod role;
pub mod scheduler;
pub mod services;
pub mod state;

pub use clock::{Clock, SystemClock};
pub use control_plane::{BcmClient, ControlPlane, DeviceRecord};
pub use discovery::{DiscoveryPublisher, PublishOutcome};
pub use reconciler::{Reconciler, RetryPolicy, RetryState};
pub use role::{RoleAssignment, RoleResolver};
pub use scheduler::{CycleOutcome, Scheduler};
pub use services::{ServiceManager, Systemctl};
pub use state::{PersistedState, StateStore};
