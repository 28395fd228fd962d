/// Quota reporting
///
/// Reports how much space the store occupies and how much the host could
/// give it. Purely informational: the store never enforces a quota.
use crate::{
    error::{VaultError, VaultResult},
    resource_store::StorageQuota,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;

/// Raw usage estimate from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Source of host storage estimates. `Ok(None)` means "unsupported".
#[async_trait]
pub trait StorageEstimator: Send + Sync {
    async fn estimate(&self) -> VaultResult<Option<StorageEstimate>>;
}

/// Estimator for environments with no meaningful backing volume
pub struct UnsupportedEstimator;

#[async_trait]
impl StorageEstimator for UnsupportedEstimator {
    async fn estimate(&self) -> VaultResult<Option<StorageEstimate>> {
        Ok(None)
    }
}

/// Estimates usage from the SQLite files and capacity from the volume holding them
///
/// `used` is the size of the database plus its WAL and shared-memory files;
/// `total` is `used` plus the free space left on the volume.
pub struct DiskEstimator {
    database_path: PathBuf,
}

impl DiskEstimator {
    pub fn new(database_path: PathBuf) -> Self {
        Self { database_path }
    }
}

#[async_trait]
impl StorageEstimator for DiskEstimator {
    async fn estimate(&self) -> VaultResult<Option<StorageEstimate>> {
        let used_bytes = database_footprint(&self.database_path).await?;

        let directory = match self.database_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let directory = match tokio::fs::canonicalize(&directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let available = tokio::task::spawn_blocking(move || available_space_for(&directory))
            .await
            .map_err(|e| VaultError::Internal(format!("Quota probe panicked: {}", e)))?;

        Ok(available.map(|available| StorageEstimate {
            used_bytes,
            total_bytes: used_bytes.saturating_add(available),
        }))
    }
}

/// Wraps an estimator and degrades every failure to `{0, 0}`
#[derive(Clone)]
pub struct QuotaReporter {
    estimator: Arc<dyn StorageEstimator>,
}

impl QuotaReporter {
    pub fn new(estimator: Arc<dyn StorageEstimator>) -> Self {
        Self { estimator }
    }

    pub fn unsupported() -> Self {
        Self::new(Arc::new(UnsupportedEstimator))
    }

    pub async fn get_quota(&self) -> StorageQuota {
        match self.estimator.estimate().await {
            Ok(Some(estimate)) => StorageQuota {
                used: estimate.used_bytes,
                quota: estimate.total_bytes,
            },
            Ok(None) => StorageQuota::default(),
            Err(e) => {
                tracing::warn!("Failed to estimate storage quota: {}", e);
                StorageQuota::default()
            }
        }
    }
}

/// Combined size of a SQLite database and its `-wal`/`-shm` companions
pub async fn database_footprint(database_path: &Path) -> VaultResult<u64> {
    let mut total = 0u64;

    for suffix in ["", "-wal", "-shm"] {
        let mut path = database_path.as_os_str().to_owned();
        path.push(suffix);

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => total += metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(total)
}

/// Free space on the most specific mounted volume containing `path`
fn available_space_for(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count())
        .map(|disk| disk.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FailingEstimator;

    #[async_trait]
    impl StorageEstimator for FailingEstimator {
        async fn estimate(&self) -> VaultResult<Option<StorageEstimate>> {
            Err(VaultError::Internal("probe failed".to_string()))
        }
    }

    struct FixedEstimator(StorageEstimate);

    #[async_trait]
    impl StorageEstimator for FixedEstimator {
        async fn estimate(&self) -> VaultResult<Option<StorageEstimate>> {
            Ok(Some(self.0))
        }
    }

    #[tokio::test]
    async fn test_unsupported_reports_zero() {
        let quota = QuotaReporter::unsupported().get_quota().await;
        assert_eq!(quota, StorageQuota { used: 0, quota: 0 });
    }

    #[tokio::test]
    async fn test_failure_reports_zero() {
        let quota = QuotaReporter::new(Arc::new(FailingEstimator)).get_quota().await;
        assert_eq!(quota, StorageQuota::default());
    }

    #[tokio::test]
    async fn test_estimate_is_passed_through() {
        let reporter = QuotaReporter::new(Arc::new(FixedEstimator(StorageEstimate {
            used_bytes: 10,
            total_bytes: 100,
        })));
        assert_eq!(reporter.get_quota().await, StorageQuota { used: 10, quota: 100 });
    }

    #[tokio::test]
    async fn test_database_footprint_counts_companion_files() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("resources.sqlite");
        std::fs::write(&db_path, vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("resources.sqlite-wal"), vec![0u8; 20]).unwrap();

        assert_eq!(database_footprint(&db_path).await.unwrap(), 120);
        assert_eq!(
            database_footprint(&dir.path().join("missing.sqlite")).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_disk_estimator_quota_covers_usage() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("resources.sqlite");
        std::fs::write(&db_path, vec![0u8; 4096]).unwrap();

        let quota = QuotaReporter::new(Arc::new(DiskEstimator::new(db_path)))
            .get_quota()
            .await;

        // Some sandboxes expose no mounted volumes; that degrades to {0, 0}
        if quota.quota > 0 {
            assert_eq!(quota.used, 4096);
            assert!(quota.quota >= quota.used);
        } else {
            assert_eq!(quota.used, 0);
        }
    }
}
