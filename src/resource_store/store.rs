/// Resource Store Manager
///
/// Coordinates the blob and metadata collections as one logical store,
/// runs images through the transformation pipeline before commit, and
/// notifies the derived-state hook after every committed mutation.
use crate::{
    config::PipelineConfig,
    error::{VaultError, VaultResult},
    metrics,
    resource_store::{
        blobs,
        classify::classify,
        hook::{ChangeKind, ChangeNotifier, NoopHook, ResourceChangeHook, ResourceEvent},
        metadata,
        pipeline::ImagePipeline,
        quota::{QuotaReporter, StorageEstimator},
        ConsistencyReport, ImageDimensions, MetadataUpdate, NewResource, Resource, ResourceBlob,
        ResourceCategory, ResourceMetadata, StorageQuota,
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};

/// Resource store configuration
#[derive(Debug, Clone)]
pub struct ResourceStoreConfig {
    pub pipeline: PipelineConfig,
    /// Capacity of the change event bus
    pub event_buffer: usize,
}

impl Default for ResourceStoreConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            event_buffer: 256,
        }
    }
}

/// Main resource store
///
/// Cheap to clone; clones share the pool, the hook and the event bus.
#[derive(Clone)]
pub struct ResourceStore {
    db: SqlitePool,
    pipeline: ImagePipeline,
    notifier: ChangeNotifier,
    quota: QuotaReporter,
    /// Serializes write transactions; SQLite allows a single writer
    writer: Arc<Mutex<()>>,
}

/// Payload after the pipeline, ready to be written
struct PreparedPayload {
    payload: Vec<u8>,
    thumbnail_url: Option<String>,
    dimensions: Option<ImageDimensions>,
}

impl ResourceStore {
    /// Create a new resource store over a migrated pool
    pub fn new(config: ResourceStoreConfig, db: SqlitePool) -> VaultResult<Self> {
        config.pipeline.validate()?;

        Ok(Self {
            db,
            pipeline: ImagePipeline::new(config.pipeline),
            notifier: ChangeNotifier::new(Arc::new(NoopHook), config.event_buffer),
            quota: QuotaReporter::unsupported(),
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Install the derived-state hook
    pub fn with_hook(mut self, hook: Arc<dyn ResourceChangeHook>) -> Self {
        self.notifier.set_hook(hook);
        self
    }

    /// Install the host storage estimator used by `get_quota`
    pub fn with_estimator(mut self, estimator: Arc<dyn StorageEstimator>) -> Self {
        self.quota = QuotaReporter::new(estimator);
        self
    }

    /// Subscribe to committed change events
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.notifier.subscribe()
    }

    /// Save a resource, overwriting any existing resource with the same id
    ///
    /// Images are transformed before anything is written; a transform failure
    /// aborts the save with no rows in either collection.
    pub async fn save(&self, resource: NewResource) -> VaultResult<ResourceMetadata> {
        let result = self.save_resource(resource).await;
        metrics::record_operation("save", &result);
        result
    }

    async fn save_resource(&self, resource: NewResource) -> VaultResult<ResourceMetadata> {
        Self::validate_new(&resource)?;

        let category = classify(&resource.mime_type, &resource.name);
        let NewResource {
            id,
            project_id,
            name,
            mime_type,
            payload,
            folder,
            tags,
            description,
            version,
            uploaded_by,
            uploaded_at,
        } = resource;

        let prepared = self.prepare_payload(&id, category, &mime_type, payload).await?;

        let uploaded_at = uploaded_at.unwrap_or_else(Utc::now);
        let size_bytes = prepared.payload.len() as u64;

        let record = ResourceMetadata {
            id: id.clone(),
            project_id: project_id.clone(),
            name: name.clone(),
            mime_type: mime_type.clone(),
            size_bytes,
            category,
            folder,
            tags,
            description,
            version,
            thumbnail_url: prepared.thumbnail_url,
            width: prepared.dimensions.map(|d| d.width),
            height: prepared.dimensions.map(|d| d.height),
            uploaded_at,
            updated_at: uploaded_at,
            uploaded_by,
        };

        let blob = ResourceBlob {
            id: id.clone(),
            project_id: project_id.clone(),
            name,
            mime_type,
            category,
            size_bytes,
            checksum: blobs::checksum(&prepared.payload),
            payload: prepared.payload,
            uploaded_at,
        };

        tracing::debug!("Writing resource {} ({} bytes)", id, size_bytes);

        let previous_project = match self.write_both(&blob, &record).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!("Failed to save resource {}: {}", id, e);
                return Err(e);
            }
        };

        tracing::info!(
            "Committed resource {} to project {} ({} bytes, {})",
            id,
            project_id,
            size_bytes,
            category
        );
        metrics::RESOURCE_BYTES_WRITTEN_TOTAL.inc_by(size_bytes);
        metrics::RESOURCE_LAST_PAYLOAD_BYTES.set(size_bytes as i64);

        // An overwrite that moved the id to another project changes both sets
        if let Some(previous) = previous_project.filter(|p| *p != project_id) {
            self.notifier.notify(ResourceEvent {
                project_id: previous,
                resource_id: Some(id.clone()),
                kind: ChangeKind::Deleted,
            });
        }
        self.notifier.notify(ResourceEvent {
            project_id,
            resource_id: Some(id),
            kind: ChangeKind::Saved,
        });

        Ok(record)
    }

    fn validate_new(resource: &NewResource) -> VaultResult<()> {
        if resource.id.trim().is_empty() {
            return Err(VaultError::Validation("Resource id is required".to_string()));
        }
        if resource.project_id.trim().is_empty() {
            return Err(VaultError::Validation("Project id is required".to_string()));
        }
        if resource.payload.is_empty() {
            return Err(VaultError::Validation(format!(
                "Resource {} has no payload",
                resource.id
            )));
        }
        Ok(())
    }

    /// Run images through the pipeline off the async workers.
    /// Every image except SVG is decoded; one that fails to decode aborts the save.
    async fn prepare_payload(
        &self,
        id: &str,
        category: ResourceCategory,
        mime_type: &str,
        payload: Vec<u8>,
    ) -> VaultResult<PreparedPayload> {
        if category != ResourceCategory::Image || ImagePipeline::is_vector(mime_type) {
            return Ok(PreparedPayload {
                payload,
                thumbnail_url: None,
                dimensions: None,
            });
        }

        let pipeline = self.pipeline.clone();
        let mime = mime_type.to_string();
        let started = Instant::now();

        let processed = tokio::task::spawn_blocking(move || pipeline.process(&mime, payload))
            .await
            .map_err(|e| VaultError::Internal(format!("Image pipeline panicked: {}", e)))?
            .map_err(|e| {
                tracing::warn!("Image transform failed for resource {}: {}", id, e);
                e
            })?;

        metrics::TRANSFORM_DURATION_SECONDS
            .with_label_values(&[if processed.recompressed { "true" } else { "false" }])
            .observe(started.elapsed().as_secs_f64());

        Ok(PreparedPayload {
            payload: processed.payload,
            thumbnail_url: Some(processed.thumbnail_url),
            dimensions: Some(processed.dimensions),
        })
    }

    /// Write both collections in one transaction.
    /// Returns the project that owned the id before this write, if any.
    async fn write_both(
        &self,
        blob: &ResourceBlob,
        record: &ResourceMetadata,
    ) -> VaultResult<Option<String>> {
        let _writer = self.writer.lock().await;
        let mut tx = self.db.begin().await?;

        let previous = match metadata::get(&mut *tx, &record.id).await? {
            Some(existing) => Some(existing.project_id),
            None => blobs::project_of(&mut *tx, &blob.id).await?,
        };
        blobs::put(&mut *tx, blob).await?;
        metadata::put(&mut *tx, record).await?;

        tx.commit().await?;

        Ok(previous)
    }

    /// Get a resource with its payload
    pub async fn get(&self, id: &str) -> VaultResult<Option<Resource>> {
        let mut tx = self.db.begin().await?;

        let Some(record) = metadata::get(&mut *tx, id).await? else {
            return Ok(None);
        };
        let Some(blob) = blobs::get(&mut *tx, id).await? else {
            tracing::warn!("Resource {} has metadata but no blob", id);
            return Ok(None);
        };

        tx.commit().await?;

        Ok(Some(Resource {
            metadata: record,
            checksum: blob.checksum,
            payload: blob.payload,
        }))
    }

    /// Get resource metadata without touching the payload
    pub async fn get_metadata(&self, id: &str) -> VaultResult<Option<ResourceMetadata>> {
        metadata::get(&self.db, id).await
    }

    /// List every resource of a project
    pub async fn list_by_project(&self, project_id: &str) -> VaultResult<Vec<ResourceMetadata>> {
        metadata::list_for_project(&self.db, project_id).await
    }

    /// List every resource across all projects
    pub async fn list_all(&self) -> VaultResult<Vec<ResourceMetadata>> {
        metadata::get_all(&self.db).await
    }

    /// List a project's resources of one category
    pub async fn list_by_category(
        &self,
        project_id: &str,
        category: ResourceCategory,
    ) -> VaultResult<Vec<ResourceMetadata>> {
        metadata::list_by_category(&self.db, project_id, category).await
    }

    /// List a project's resources carrying a folder label
    pub async fn list_by_folder(
        &self,
        project_id: &str,
        folder: &str,
    ) -> VaultResult<Vec<ResourceMetadata>> {
        metadata::list_by_folder(&self.db, project_id, folder).await
    }

    /// Case-insensitive substring search over name, description and tags
    pub async fn search(&self, project_id: &str, term: &str) -> VaultResult<Vec<ResourceMetadata>> {
        let resources = metadata::list_for_project(&self.db, project_id).await?;
        if term.trim().is_empty() {
            return Ok(resources);
        }

        let needle = term.to_lowercase();

        Ok(resources
            .into_iter()
            .filter(|r| r.matches(&needle))
            .collect())
    }

    /// Merge descriptive fields into an existing resource
    ///
    /// Only the metadata collection is written; the payload is untouched.
    pub async fn update_metadata(
        &self,
        id: &str,
        update: MetadataUpdate,
    ) -> VaultResult<ResourceMetadata> {
        let result = self.apply_update(id, update).await;
        metrics::record_operation("update_metadata", &result);
        result
    }

    async fn apply_update(&self, id: &str, update: MetadataUpdate) -> VaultResult<ResourceMetadata> {
        if update.name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(VaultError::Validation("Resource name cannot be empty".to_string()));
        }

        // Nothing to merge: no write, no notification
        if update.is_empty() {
            return self
                .get_metadata(id)
                .await?
                .ok_or_else(|| VaultError::NotFound(format!("Resource not found: {}", id)));
        }

        let _writer = self.writer.lock().await;
        let mut tx = self.db.begin().await?;

        let mut record = metadata::get(&mut *tx, id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("Resource not found: {}", id)))?;

        update.apply(&mut record, Utc::now());
        metadata::put(&mut *tx, &record).await?;

        tx.commit().await?;

        tracing::debug!("Updated metadata for resource {}", id);

        self.notifier.notify(ResourceEvent {
            project_id: record.project_id.clone(),
            resource_id: Some(record.id.clone()),
            kind: ChangeKind::Updated,
        });

        Ok(record)
    }

    /// Delete a resource from both collections
    pub async fn delete(&self, id: &str) -> VaultResult<()> {
        let result = self.delete_resource(id).await;
        metrics::record_operation("delete", &result);
        result
    }

    async fn delete_resource(&self, id: &str) -> VaultResult<()> {
        let _writer = self.writer.lock().await;
        let mut tx = self.db.begin().await?;

        // The project id is needed for the hook; a stray blob still has one
        let project_id = match metadata::get(&mut *tx, id).await? {
            Some(record) => record.project_id,
            None => blobs::project_of(&mut *tx, id)
                .await?
                .ok_or_else(|| VaultError::NotFound(format!("Resource not found: {}", id)))?,
        };

        metadata::delete(&mut *tx, id).await?;
        blobs::delete(&mut *tx, id).await?;

        tx.commit().await?;

        tracing::info!("Deleted resource {} from project {}", id, project_id);

        self.notifier.notify(ResourceEvent {
            project_id,
            resource_id: Some(id.to_string()),
            kind: ChangeKind::Deleted,
        });

        Ok(())
    }

    /// Delete every resource of a project, one at a time
    ///
    /// Best effort: each resource is its own transaction, so a failure part
    /// way through leaves the earlier deletions in place. Returns the number
    /// of resources deleted.
    pub async fn clear_project(&self, project_id: &str) -> VaultResult<usize> {
        let resources = metadata::list_for_project(&self.db, project_id).await?;
        let mut deleted = 0;

        for resource in resources {
            match self.delete(&resource.id).await {
                Ok(()) => deleted += 1,
                // Removed concurrently; nothing left to do
                Err(VaultError::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(
                        "Clearing project {} stopped after {} deletions: {}",
                        project_id,
                        deleted,
                        e
                    );
                    return Err(e);
                }
            }
        }

        let orphans = {
            let _writer = self.writer.lock().await;
            blobs::delete_orphans_for_project(&self.db, project_id).await?
        };
        if orphans > 0 {
            tracing::warn!(
                "Removed {} orphaned blobs while clearing project {}",
                orphans,
                project_id
            );
            self.notifier.notify(ResourceEvent {
                project_id: project_id.to_string(),
                resource_id: None,
                kind: ChangeKind::Cleared,
            });
        }

        tracing::info!("Cleared {} resources from project {}", deleted, project_id);

        Ok(deleted)
    }

    /// Delete every resource of every project in one transaction
    pub async fn clear_all(&self) -> VaultResult<u64> {
        let _writer = self.writer.lock().await;
        let mut tx = self.db.begin().await?;

        let projects = metadata::project_ids(&mut *tx).await?;
        let deleted = metadata::delete_all(&mut *tx).await?;
        blobs::delete_all(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!(
            "Cleared {} resources across {} projects",
            deleted,
            projects.len()
        );

        for project_id in projects {
            self.notifier.notify(ResourceEvent {
                project_id,
                resource_id: None,
                kind: ChangeKind::Cleared,
            });
        }

        Ok(deleted)
    }

    /// Sum of stored sizes, optionally for one project
    pub async fn get_total_size(&self, project_id: Option<&str>) -> VaultResult<u64> {
        metadata::total_size(&self.db, project_id).await
    }

    /// Host storage usage estimate; `{0, 0}` when unsupported
    pub async fn get_quota(&self) -> StorageQuota {
        self.quota.get_quota().await
    }

    /// Cross-check the two collections without loading any payload
    pub async fn check_consistency(&self) -> VaultResult<ConsistencyReport> {
        let mut tx = self.db.begin().await?;

        let blobs_without_metadata: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT b.id FROM resource_blobs b
            LEFT JOIN resource_metadata m ON m.id = b.id
            WHERE m.id IS NULL
            ORDER BY b.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let metadata_without_blobs: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT m.id FROM resource_metadata m
            LEFT JOIN resource_blobs b ON b.id = m.id
            WHERE b.id IS NULL
            ORDER BY m.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let mismatched: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT m.id FROM resource_metadata m
            JOIN resource_blobs b ON b.id = m.id
            WHERE m.size_bytes != b.size_bytes OR m.mime_type != b.mime_type
            ORDER BY m.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ConsistencyReport {
            blobs_without_metadata,
            metadata_without_blobs,
            mismatched,
        })
    }
}
