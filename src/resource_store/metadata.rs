/// Metadata collection
///
/// `resource_metadata` holds every descriptive field of a resource and never
/// the payload. It is the only source for listing, filtering, searching and
/// size totals, so none of these queries ever touch blob bytes.
use crate::{
    error::{VaultError, VaultResult},
    resource_store::{ResourceCategory, ResourceMetadata},
};
use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite};

const SELECT_COLUMNS: &str = r#"
    SELECT id, project_id, name, mime_type, size_bytes, category, folder, tags, description,
           version, thumbnail_url, width, height, uploaded_at, updated_at, uploaded_by
    FROM resource_metadata
"#;

/// Insert or overwrite a metadata record
pub async fn put<'e, E>(executor: E, metadata: &ResourceMetadata) -> VaultResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let tags = serde_json::to_string(&metadata.tags)?;

    sqlx::query(
        r#"
        INSERT INTO resource_metadata (
            id, project_id, name, mime_type, size_bytes, category, folder, tags, description,
            version, thumbnail_url, width, height, uploaded_at, updated_at, uploaded_by
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            project_id = excluded.project_id,
            name = excluded.name,
            mime_type = excluded.mime_type,
            size_bytes = excluded.size_bytes,
            category = excluded.category,
            folder = excluded.folder,
            tags = excluded.tags,
            description = excluded.description,
            version = excluded.version,
            thumbnail_url = excluded.thumbnail_url,
            width = excluded.width,
            height = excluded.height,
            uploaded_at = excluded.uploaded_at,
            updated_at = excluded.updated_at,
            uploaded_by = excluded.uploaded_by
        "#,
    )
    .bind(&metadata.id)
    .bind(&metadata.project_id)
    .bind(&metadata.name)
    .bind(&metadata.mime_type)
    .bind(metadata.size_bytes as i64)
    .bind(metadata.category.as_str())
    .bind(&metadata.folder)
    .bind(tags)
    .bind(&metadata.description)
    .bind(metadata.version)
    .bind(&metadata.thumbnail_url)
    .bind(metadata.width.map(i64::from))
    .bind(metadata.height.map(i64::from))
    .bind(metadata.uploaded_at)
    .bind(metadata.updated_at)
    .bind(&metadata.uploaded_by)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a metadata record
pub async fn get<'e, E>(executor: E, id: &str) -> VaultResult<Option<ResourceMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(row_to_metadata).transpose()
}

/// Remove a metadata record. Returns whether a row existed.
pub async fn delete<'e, E>(executor: E, id: &str) -> VaultResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM resource_metadata WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove every metadata record
pub async fn delete_all<'e, E>(executor: E) -> VaultResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM resource_metadata")
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// All records for a project, newest first
pub async fn list_for_project<'e, E>(executor: E, project_id: &str) -> VaultResult<Vec<ResourceMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "{} WHERE project_id = ?1 ORDER BY uploaded_at DESC, id ASC",
        SELECT_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_metadata).collect()
}

/// Records of one category within a project
pub async fn list_by_category<'e, E>(
    executor: E,
    project_id: &str,
    category: ResourceCategory,
) -> VaultResult<Vec<ResourceMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "{} WHERE project_id = ?1 AND category = ?2 ORDER BY uploaded_at DESC, id ASC",
        SELECT_COLUMNS
    ))
    .bind(project_id)
    .bind(category.as_str())
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_metadata).collect()
}

/// Records carrying a folder label within a project
pub async fn list_by_folder<'e, E>(
    executor: E,
    project_id: &str,
    folder: &str,
) -> VaultResult<Vec<ResourceMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "{} WHERE project_id = ?1 AND folder = ?2 ORDER BY uploaded_at DESC, id ASC",
        SELECT_COLUMNS
    ))
    .bind(project_id)
    .bind(folder)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_metadata).collect()
}

/// Every record in the collection
pub async fn get_all<'e, E>(executor: E) -> VaultResult<Vec<ResourceMetadata>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!("{} ORDER BY project_id ASC, uploaded_at DESC", SELECT_COLUMNS))
        .fetch_all(executor)
        .await?;

    rows.into_iter().map(row_to_metadata).collect()
}

/// Sum of `size_bytes`, optionally restricted to one project
pub async fn total_size<'e, E>(executor: E, project_id: Option<&str>) -> VaultResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let total: Option<i64> = match project_id {
        Some(project_id) => {
            sqlx::query_scalar("SELECT SUM(size_bytes) FROM resource_metadata WHERE project_id = ?1")
                .bind(project_id)
                .fetch_one(executor)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT SUM(size_bytes) FROM resource_metadata")
                .fetch_one(executor)
                .await?
        }
    };

    Ok(total.unwrap_or(0) as u64)
}

/// Distinct projects that own at least one resource
pub async fn project_ids<'e, E>(executor: E) -> VaultResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids = sqlx::query_scalar("SELECT DISTINCT project_id FROM resource_metadata ORDER BY project_id")
        .fetch_all(executor)
        .await?;

    Ok(ids)
}

fn row_to_metadata(row: SqliteRow) -> VaultResult<ResourceMetadata> {
    let category: String = row.try_get("category")?;
    let tags: String = row.try_get("tags")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;
    let width: Option<i64> = row.try_get("width")?;
    let height: Option<i64> = row.try_get("height")?;

    Ok(ResourceMetadata {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: size_bytes as u64,
        category: category.parse().map_err(VaultError::Internal)?,
        folder: row.try_get("folder")?,
        tags: serde_json::from_str(&tags)?,
        description: row.try_get("description")?,
        version: row.try_get("version")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        width: width.map(|w| w as u32),
        height: height.map(|h| h as u32),
        uploaded_at: row.try_get("uploaded_at")?,
        updated_at: row.try_get("updated_at")?,
        uploaded_by: row.try_get("uploaded_by")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;
    use sqlx::SqlitePool;

    async fn create_test_pool() -> SqlitePool {
        let pool = db::memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn record(id: &str, project_id: &str, category: ResourceCategory, size: u64) -> ResourceMetadata {
        let now = Utc::now();
        ResourceMetadata {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: format!("{}.dat", id),
            mime_type: "application/octet-stream".to_string(),
            size_bytes: size,
            category,
            folder: None,
            tags: vec!["alpha".to_string(), "beta".to_string()],
            description: None,
            version: 1,
            thumbnail_url: None,
            width: None,
            height: None,
            uploaded_at: now,
            updated_at: now,
            uploaded_by: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_preserves_fields() {
        let pool = create_test_pool().await;
        let mut original = record("r1", "p1", ResourceCategory::Image, 42);
        original.folder = Some("screens".to_string());
        original.thumbnail_url = Some("data:image/jpeg;base64,AAAA".to_string());
        original.width = Some(640);
        original.height = Some(480);

        put(&pool, &original).await.unwrap();

        let stored = get(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(stored.tags, vec!["alpha", "beta"]);
        assert_eq!(stored.folder.as_deref(), Some("screens"));
        assert_eq!(stored.category, ResourceCategory::Image);
        assert_eq!(stored.width, Some(640));
        assert_eq!(stored.size_bytes, 42);
    }

    #[tokio::test]
    async fn test_index_scoped_listings() {
        let pool = create_test_pool().await;

        let mut doc = record("a", "p1", ResourceCategory::Document, 10);
        doc.folder = Some("plans".to_string());
        put(&pool, &doc).await.unwrap();
        put(&pool, &record("b", "p1", ResourceCategory::Image, 20)).await.unwrap();
        let mut other_project = record("c", "p2", ResourceCategory::Document, 30);
        other_project.folder = Some("plans".to_string());
        put(&pool, &other_project).await.unwrap();

        assert_eq!(list_for_project(&pool, "p1").await.unwrap().len(), 2);

        let docs = list_by_category(&pool, "p1", ResourceCategory::Document).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");

        let plans = list_by_folder(&pool, "p1", "plans").await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, "a");

        assert_eq!(get_all(&pool).await.unwrap().len(), 3);
        assert_eq!(project_ids(&pool).await.unwrap(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_total_size() {
        let pool = create_test_pool().await;

        assert_eq!(total_size(&pool, None).await.unwrap(), 0);

        put(&pool, &record("a", "p1", ResourceCategory::Other, 100)).await.unwrap();
        put(&pool, &record("b", "p1", ResourceCategory::Other, 50)).await.unwrap();
        put(&pool, &record("c", "p2", ResourceCategory::Other, 7)).await.unwrap();

        assert_eq!(total_size(&pool, Some("p1")).await.unwrap(), 150);
        assert_eq!(total_size(&pool, Some("p3")).await.unwrap(), 0);
        assert_eq!(total_size(&pool, None).await.unwrap(), 157);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let pool = create_test_pool().await;
        put(&pool, &record("a", "p1", ResourceCategory::Other, 1)).await.unwrap();

        assert!(delete(&pool, "a").await.unwrap());
        assert!(!delete(&pool, "a").await.unwrap());
        assert!(get(&pool, "a").await.unwrap().is_none());
    }
}
