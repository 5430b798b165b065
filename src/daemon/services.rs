use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Upper bound for a single service-manager invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// The OS service manager, as seen by the reconciler.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Whether the unit is currently active. Query failures read as inactive.
    async fn is_active(&self, name: &str) -> bool;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;
}

/// systemd via `systemctl`
pub struct Systemctl {
    program: String,
    timeout: Duration,
}

impl Systemctl {
    /// Create a manager driving `systemctl`
    pub fn new() -> Self {
        Self {
            program: "systemctl".to_string(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    async fn run(&self, verb: &str, name: &str) -> Result<Output> {
        debug!("Running: {} {} {}", self.program, verb, name);

        let mut cmd = Command::new(&self.program);
        cmd.args([verb, name]).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                MonitorError::service(
                    name,
                    format!("{} {} timed out after {:?}", self.program, verb, self.timeout),
                )
            })??;

        debug!(
            "{} {} {} finished with exit code: {:?}",
            self.program,
            verb,
            name,
            output.status.code()
        );
        Ok(output)
    }

    async fn run_checked(&self, verb: &str, name: &str) -> Result<()> {
        let output = self.run(verb, name).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MonitorError::service(
                name,
                format!(
                    "{} {} failed ({}): {}",
                    self.program,
                    verb,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn is_active(&self, name: &str) -> bool {
        match self.run("is-active", name).await {
            Ok(output) => {
                let active = output.status.success()
                    && String::from_utf8_lossy(&output.stdout).trim() == "active";
                debug!(
                    "Service {} status: {}",
                    name,
                    if active { "active" } else { "inactive" }
                );
                active
            }
            Err(e) => {
                error!("Error checking service {}: {}", name, e);
                false
            }
        }
    }

    async fn start(&self, name: &str) -> Result<()> {
        info!("Starting service {}", name);
        self.run_checked("start", name).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        info!("Stopping service {}", name);
        self.run_checked("stop", name).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Inner {
        running: HashMap<String, bool>,
        start_calls: HashMap<String, u32>,
        stop_calls: HashMap<String, u32>,
    }

    /// In-memory service manager with call counters.
    ///
    /// By default `start` succeeds and the unit comes up. `start_fails` makes
    /// the command fail; `start_does_not_stick` makes it report success while
    /// the unit stays down.
    #[derive(Default)]
    pub struct FakeServiceManager {
        inner: Mutex<Inner>,
        start_fails: Mutex<bool>,
        start_does_not_stick: Mutex<bool>,
        stop_fails: Mutex<bool>,
    }

    impl FakeServiceManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_running(&self, name: &str, running: bool) {
            self.inner
                .lock()
                .unwrap()
                .running
                .insert(name.to_string(), running);
        }

        pub fn set_start_fails(&self, fails: bool) {
            *self.start_fails.lock().unwrap() = fails;
        }

        pub fn set_start_does_not_stick(&self, value: bool) {
            *self.start_does_not_stick.lock().unwrap() = value;
        }

        pub fn set_stop_fails(&self, fails: bool) {
            *self.stop_fails.lock().unwrap() = fails;
        }

        pub fn running(&self, name: &str) -> bool {
            self.inner
                .lock()
                .unwrap()
                .running
                .get(name)
                .copied()
                .unwrap_or(false)
        }

        pub fn start_calls(&self, name: &str) -> u32 {
            self.inner
                .lock()
                .unwrap()
                .start_calls
                .get(name)
                .copied()
                .unwrap_or(0)
        }

        pub fn stop_calls(&self, name: &str) -> u32 {
            self.inner
                .lock()
                .unwrap()
                .stop_calls
                .get(name)
                .copied()
                .unwrap_or(0)
        }

        pub fn total_calls(&self) -> u32 {
            let inner = self.inner.lock().unwrap();
            inner.start_calls.values().sum::<u32>() + inner.stop_calls.values().sum::<u32>()
        }
    }

    #[async_trait]
    impl ServiceManager for FakeServiceManager {
        async fn is_active(&self, name: &str) -> bool {
            self.running(name)
        }

        async fn start(&self, name: &str) -> Result<()> {
            *self
                .inner
                .lock()
                .unwrap()
                .start_calls
                .entry(name.to_string())
                .or_default() += 1;

            if *self.start_fails.lock().unwrap() {
                return Err(MonitorError::service(name, "start failed"));
            }
            if !*self.start_does_not_stick.lock().unwrap() {
                self.set_running(name, true);
            }
            Ok(())
        }

        async fn stop(&self, name: &str) -> Result<()> {
            *self
                .inner
                .lock()
                .unwrap()
                .stop_calls
                .entry(name.to_string())
                .or_default() += 1;

            if *self.stop_fails.lock().unwrap() {
                return Err(MonitorError::service(name, "stop failed"));
            }
            self.set_running(name, false);
            Ok(())
        }
    }
}
