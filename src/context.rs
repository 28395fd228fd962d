/// Application context and dependency injection
use crate::{
    config::VaultConfig,
    db,
    error::{VaultError, VaultResult},
    resource_store::{DiskEstimator, ResourceChangeHook, ResourceStore, ResourceStoreConfig},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared services for a running vault
#[derive(Clone)]
pub struct VaultContext {
    pub config: Arc<VaultConfig>,
    pub db: SqlitePool,
    pub resources: Arc<ResourceStore>,
}

impl VaultContext {
    /// Create a new context from configuration
    pub async fn new(config: VaultConfig) -> VaultResult<Self> {
        Self::with_hook(config, None).await
    }

    /// Create a new context, installing a derived-state hook on the store
    pub async fn with_hook(
        config: VaultConfig,
        hook: Option<Arc<dyn ResourceChangeHook>>,
    ) -> VaultResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        Self::ensure_directories(&config).await?;

        // Initialize resource database
        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                enable_wal: config.storage.enable_wal,
            },
        )
        .await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        // Initialize resource store
        let store_config = ResourceStoreConfig {
            pipeline: config.pipeline.clone(),
            event_buffer: config.events.buffer_size,
        };
        let mut store = ResourceStore::new(store_config, db.clone())?
            .with_estimator(Arc::new(DiskEstimator::new(config.storage.database_path.clone())));
        if let Some(hook) = hook {
            store = store.with_hook(hook);
        }

        tracing::info!(
            "Resource vault ready at {:?}",
            config.storage.database_path
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            resources: Arc::new(store),
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &VaultConfig) -> VaultResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                VaultError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }
}
