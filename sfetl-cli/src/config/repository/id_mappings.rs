//! ID mapping repository (local record ID -> remote record ID)

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Load every mapping as (object_name, old_id, new_id)
pub async fn get_all_mappings(pool: &SqlitePool) -> Result<Vec<(String, String, String)>> {
    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT object_name, old_id, new_id FROM id_mappings ORDER BY object_name")
            .fetch_all(pool)
            .await
            .context("Failed to load ID mappings")?;

    Ok(rows)
}

/// Get the remote ID for one local ID
pub async fn get_mapping(pool: &SqlitePool, object_name: &str, old_id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT new_id FROM id_mappings WHERE object_name = ? AND old_id = ?")
            .bind(object_name)
            .bind(old_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get ID mapping")?;

    Ok(row.map(|(new_id,)| new_id))
}

/// Insert or replace a batch of mappings for one object in a single transaction
pub async fn set_mappings(
    pool: &SqlitePool,
    object_name: &str,
    mappings: &[(String, String)],
) -> Result<()> {
    if mappings.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for (old_id, new_id) in mappings {
        sqlx::query(
            "INSERT INTO id_mappings (object_name, old_id, new_id)
             VALUES (?, ?, ?)
             ON CONFLICT(object_name, old_id)
             DO UPDATE SET new_id = excluded.new_id, created_at = CURRENT_TIMESTAMP",
        )
        .bind(object_name)
        .bind(old_id)
        .bind(new_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to save ID mapping for {} {}", object_name, old_id))?;
    }

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(())
}

/// Mapping counts grouped by object
pub async fn count_by_object(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT object_name, COUNT(*) FROM id_mappings
         GROUP BY object_name
         ORDER BY object_name",
    )
    .fetch_all(pool)
    .await
    .context("Failed to count ID mappings")?;

    Ok(rows)
}

/// Delete all mappings of one object, returning the number removed
pub async fn delete_object_mappings(pool: &SqlitePool, object_name: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM id_mappings WHERE object_name = ?")
        .bind(object_name)
        .execute(pool)
        .await
        .context("Failed to delete ID mappings")?;

    Ok(result.rows_affected())
}

/// Delete every mapping, returning the number removed
pub async fn delete_all_mappings(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM id_mappings")
        .execute(pool)
        .await
        .context("Failed to delete ID mappings")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::open_memory_pool;

    #[tokio::test]
    async fn test_set_mappings_replaces_existing() {
        let pool = open_memory_pool().await.unwrap();

        set_mappings(&pool, "Account", &[("a1".into(), "001A".into())])
            .await
            .unwrap();
        set_mappings(&pool, "Account", &[("a1".into(), "001B".into())])
            .await
            .unwrap();

        assert_eq!(
            get_mapping(&pool, "Account", "a1").await.unwrap(),
            Some("001B".to_string())
        );
        assert_eq!(get_all_mappings(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counts_and_deletes() {
        let pool = open_memory_pool().await.unwrap();

        set_mappings(
            &pool,
            "Contact",
            &[("c1".into(), "003A".into()), ("c2".into(), "003B".into())],
        )
        .await
        .unwrap();
        set_mappings(&pool, "Lead", &[("l1".into(), "00QA".into())])
            .await
            .unwrap();

        let counts = count_by_object(&pool).await.unwrap();
        assert_eq!(counts, vec![("Contact".to_string(), 2), ("Lead".to_string(), 1)]);

        assert_eq!(delete_object_mappings(&pool, "Contact").await.unwrap(), 2);
        assert_eq!(get_mapping(&pool, "Contact", "c1").await.unwrap(), None);
        assert_eq!(delete_all_mappings(&pool).await.unwrap(), 1);
    }
}
