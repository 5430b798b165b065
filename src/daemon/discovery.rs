use crate::config::Exporter;
use crate::error::Result;
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prometheus `file_sd` target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: TargetLabels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLabels {
    pub job: String,
    pub cluster: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Removed,
    AlreadyAbsent,
    /// Publish directory not present (e.g. shared storage not mounted)
    DirectoryMissing,
}

/// Maintains `<dir>/<hostname>.json` so that it exists exactly while the role
/// is active.
pub struct DiscoveryPublisher {
    dir: PathBuf,
    hostname: String,
    cluster: String,
    exporters: Vec<Exporter>,
}

impl DiscoveryPublisher {
    /// Create a publisher for this node's descriptor in `dir`
    pub fn new(
        dir: impl Into<PathBuf>,
        hostname: impl Into<String>,
        cluster: impl Into<String>,
        exporters: Vec<Exporter>,
    ) -> Self {
        Self {
            dir: dir.into(),
            hostname: hostname.into(),
            cluster: cluster.into(),
            exporters,
        }
    }

    /// Prometheus file_sd directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of this node's descriptor
    pub fn descriptor_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.hostname))
    }

    /// One target group per configured exporter.
    pub fn target_groups(&self) -> Vec<TargetGroup> {
        self.exporters
            .iter()
            .map(|exporter| TargetGroup {
                targets: vec![format!("{}:{}", self.hostname, exporter.port)],
                labels: TargetLabels {
                    job: exporter.job.to_string(),
                    cluster: self.cluster.clone(),
                    hostname: self.hostname.clone(),
                },
            })
            .collect()
    }

    /// Write the descriptor when the role is active, withdraw it otherwise
    pub fn publish(&self, role_active: bool) -> Result<PublishOutcome> {
        if !self.dir.is_dir() {
            warn!(
                "Prometheus targets directory does not exist: {}",
                self.dir.display()
            );
            return Ok(PublishOutcome::DirectoryMissing);
        }

        let path = self.descriptor_path();
        if role_active {
            let contents = serde_json::to_vec_pretty(&self.target_groups())?;
            fsutil::write_atomic(&path, &contents)?;
            info!("Wrote Prometheus target file: {}", path.display());
            Ok(PublishOutcome::Written)
        } else if fsutil::remove_if_exists(&path)? {
            info!("Removed Prometheus target file: {}", path.display());
            Ok(PublishOutcome::Removed)
        } else {
            debug!("Prometheus target file already absent: {}", path.display());
            Ok(PublishOutcome::AlreadyAbsent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn publisher(dir: &Path) -> DiscoveryPublisher {
        DiscoveryPublisher::new(dir, "dgx-01", "slurm", MonitorConfig::default().exporters())
    }

    #[test]
    fn active_role_writes_one_group_per_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path());

        assert_eq!(publisher.publish(true).unwrap(), PublishOutcome::Written);

        let groups: Vec<TargetGroup> =
            serde_json::from_slice(&fs::read(dir.path().join("dgx-01.json")).unwrap()).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].targets, vec!["dgx-01:9100"]);
        assert_eq!(groups[0].labels.job, "node_exporter");
        assert_eq!(groups[1].targets, vec!["dgx-01:9306"]);
        assert_eq!(groups[2].labels.job, "gpu_exporter");
        assert!(groups
            .iter()
            .all(|g| g.labels.cluster == "slurm" && g.labels.hostname == "dgx-01"));
    }

    #[test]
    fn republishing_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path());

        publisher.publish(true).unwrap();
        let first = fs::read(publisher.descriptor_path()).unwrap();
        publisher.publish(true).unwrap();
        let second = fs::read(publisher.descriptor_path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn inactive_role_removes_file_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path());

        publisher.publish(true).unwrap();
        assert_eq!(publisher.publish(false).unwrap(), PublishOutcome::Removed);
        assert!(!publisher.descriptor_path().exists());
        assert_eq!(publisher.publish(false).unwrap(), PublishOutcome::AlreadyAbsent);
    }

    #[test]
    fn missing_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(&dir.path().join("not-mounted"));

        assert_eq!(publisher.publish(true).unwrap(), PublishOutcome::DirectoryMissing);
        assert_eq!(publisher.publish(false).unwrap(), PublishOutcome::DirectoryMissing);
        assert!(!dir.path().join("not-mounted").exists());
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_reader_never_sees_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(dir.path());
        publisher.publish(true).unwrap();
        let expected = fs::read(publisher.descriptor_path()).unwrap();

        let path = publisher.descriptor_path();
        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let done = Arc::clone(&done);
            let expected = expected.clone();
            std::thread::spawn(move || {
                let mut reads = 0u32;
                loop {
                    let contents = fs::read(&path).expect("descriptor vanished during rewrite");
                    assert_eq!(contents, expected, "reader observed a partial descriptor");
                    reads += 1;
                    if done.load(Ordering::Relaxed) {
                        break reads;
                    }
                }
            })
        };

        for _ in 0..200 {
            publisher.publish(true).unwrap();
        }
        done.store(true, Ordering::Relaxed);

        let reads = reader.join().expect("reader thread panicked");
        assert!(reads > 0);
    }
}
