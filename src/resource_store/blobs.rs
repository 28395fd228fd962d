/// Blob collection
///
/// Holds the full payload of every resource in `resource_blobs`, keyed by
/// resource id. Every function takes a generic executor so writes can share
/// the caller's transaction with the metadata collection.
use crate::{
    error::{VaultError, VaultResult},
    resource_store::ResourceBlob,
};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite};

/// Hex SHA-256 of a payload
pub fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Insert or overwrite a blob record
pub async fn put<'e, E>(executor: E, blob: &ResourceBlob) -> VaultResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO resource_blobs (id, project_id, name, mime_type, category, size_bytes, checksum, payload, uploaded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            project_id = excluded.project_id,
            name = excluded.name,
            mime_type = excluded.mime_type,
            category = excluded.category,
            size_bytes = excluded.size_bytes,
            checksum = excluded.checksum,
            payload = excluded.payload,
            uploaded_at = excluded.uploaded_at
        "#,
    )
    .bind(&blob.id)
    .bind(&blob.project_id)
    .bind(&blob.name)
    .bind(&blob.mime_type)
    .bind(blob.category.as_str())
    .bind(blob.size_bytes as i64)
    .bind(&blob.checksum)
    .bind(&blob.payload)
    .bind(blob.uploaded_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetch a whole blob record, payload included
pub async fn get<'e, E>(executor: E, id: &str) -> VaultResult<Option<ResourceBlob>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT id, project_id, name, mime_type, category, size_bytes, checksum, payload, uploaded_at
        FROM resource_blobs
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.map(row_to_blob).transpose()
}

/// Owning project of a blob, without loading the payload
pub async fn project_of<'e, E>(executor: E, id: &str) -> VaultResult<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let project_id = sqlx::query_scalar("SELECT project_id FROM resource_blobs WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(project_id)
}

/// Remove a blob record. Returns whether a row existed.
pub async fn delete<'e, E>(executor: E, id: &str) -> VaultResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM resource_blobs WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a project's blobs that have no metadata record, via the project index
pub async fn delete_orphans_for_project<'e, E>(executor: E, project_id: &str) -> VaultResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM resource_blobs
        WHERE project_id = ?1
          AND id NOT IN (SELECT id FROM resource_metadata)
        "#,
    )
    .bind(project_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Remove every blob
pub async fn delete_all<'e, E>(executor: E) -> VaultResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM resource_blobs").execute(executor).await?;

    Ok(result.rows_affected())
}

fn row_to_blob(row: SqliteRow) -> VaultResult<ResourceBlob> {
    let category: String = row.try_get("category")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;

    Ok(ResourceBlob {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        mime_type: row.try_get("mime_type")?,
        category: category.parse().map_err(VaultError::Internal)?,
        size_bytes: size_bytes as u64,
        checksum: row.try_get("checksum")?,
        payload: row.try_get("payload")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, resource_store::ResourceCategory};
    use chrono::Utc;
    use sqlx::SqlitePool;

    async fn create_test_pool() -> SqlitePool {
        let pool = db::memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn blob(id: &str, project_id: &str, payload: &[u8]) -> ResourceBlob {
        ResourceBlob {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: format!("{}.bin", id),
            mime_type: "application/octet-stream".to_string(),
            category: ResourceCategory::Other,
            size_bytes: payload.len() as u64,
            checksum: checksum(payload),
            payload: payload.to_vec(),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_blob() {
        let pool = create_test_pool().await;

        put(&pool, &blob("r1", "p1", b"test blob data")).await.unwrap();

        let stored = get(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(stored.payload, b"test blob data".to_vec());
        assert_eq!(stored.size_bytes, 14);
        assert_eq!(stored.checksum, checksum(b"test blob data"));
        assert_eq!(stored.category, ResourceCategory::Other);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let pool = create_test_pool().await;

        put(&pool, &blob("r1", "p1", b"first")).await.unwrap();
        put(&pool, &blob("r1", "p2", b"second version")).await.unwrap();

        let stored = get(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(stored.payload, b"second version".to_vec());
        assert_eq!(project_of(&pool, "r1").await.unwrap().as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_get_nonexistent_blob() {
        let pool = create_test_pool().await;

        assert!(get(&pool, "missing").await.unwrap().is_none());
        assert!(project_of(&pool, "missing").await.unwrap().is_none());
        assert!(!delete(&pool, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_orphans_for_project() {
        let pool = create_test_pool().await;

        put(&pool, &blob("a", "p1", b"1")).await.unwrap();
        put(&pool, &blob("b", "p1", b"2")).await.unwrap();
        put(&pool, &blob("c", "p2", b"3")).await.unwrap();

        // "b" keeps its metadata and must survive the sweep
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO resource_metadata (id, project_id, name, mime_type, size_bytes, category, uploaded_at, updated_at, uploaded_by)
             VALUES ('b', 'p1', 'b.bin', 'application/octet-stream', 1, 'other', ?1, ?1, '')",
        )
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(delete_orphans_for_project(&pool, "p1").await.unwrap(), 1);
        assert!(get(&pool, "a").await.unwrap().is_none());
        assert!(get(&pool, "b").await.unwrap().is_some());
        assert!(get(&pool, "c").await.unwrap().is_some());
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
