//! Read-only access to the local relational snapshot
//!
//! One table per object, named like the object. Rows are decoded
//! dynamically into JSON maps keyed by column name.

use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::path::Path;

/// One snapshot row, column name -> value
pub type SourceRow = Map<String, Value>;

/// Lead converted in the source, with the source IDs it was converted into
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedLead {
    pub lead_id: String,
    pub account_id: String,
    pub contact_id: String,
    pub opportunity_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceDb {
    pool: SqlitePool,
}

impl SourceDb {
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Source database not found: {}", path.display());
        }

        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open source database {}", path.display()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list source tables")?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to check source table")?;

        Ok(row.is_some())
    }

    pub async fn count(&self, table: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count rows of {}", table))?;

        Ok(count.max(0) as u64)
    }

    /// Read rows of a table in rowid order, optionally limited
    pub async fn rows(&self, table: &str, limit: Option<usize>) -> Result<Vec<SourceRow>> {
        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read table {}", table))?;

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to decode rows of {}", table))
    }

    /// Leads marked converted, with their converted Account and Contact
    pub async fn converted_leads(&self) -> Result<Vec<ConvertedLead>> {
        if !self.has_table("Lead").await? {
            return Ok(Vec::new());
        }

        let columns = self.columns("Lead").await?;
        let required = ["IsConverted", "ConvertedAccountId", "ConvertedContactId"];
        if !required.iter().all(|c| columns.iter().any(|col| col == c)) {
            return Ok(Vec::new());
        }

        let opportunity = if columns.iter().any(|c| c == "ConvertedOpportunityId") {
            "ConvertedOpportunityId"
        } else {
            "NULL"
        };

        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(&format!(
            "SELECT Id, ConvertedAccountId, ConvertedContactId, {} FROM Lead
             WHERE IsConverted IN (1, '1', 'true', 'True')
               AND ConvertedAccountId IS NOT NULL AND ConvertedAccountId != ''
               AND ConvertedContactId IS NOT NULL AND ConvertedContactId != ''",
            opportunity
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to read converted leads")?;

        Ok(rows
            .into_iter()
            .map(|(lead_id, account_id, contact_id, opportunity_id)| ConvertedLead {
                lead_id,
                account_id,
                contact_id,
                opportunity_id: opportunity_id.filter(|id| !id.is_empty()),
            })
            .collect())
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read columns of {}", table))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn decode_row(row: &SqliteRow) -> Result<SourceRow> {
    let mut out = SourceRow::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let (is_null, type_name) = {
            let raw = row.try_get_raw(idx)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };

        let value = if is_null {
            Value::Null
        } else {
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" | "NUMERIC" => Number::from_f64(row.try_get::<f64, _>(idx)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                // binary columns carry nothing uploadable
                "BLOB" => Value::Null,
                // snapshots may hold text that is not valid UTF-8
                _ => {
                    let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
            }
        };

        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Empty in-memory snapshot
    pub async fn memory_source() -> SourceDb {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SourceDb::from_pool(pool)
    }

    impl SourceDb {
        /// Run raw SQL against the snapshot (test setup only)
        pub async fn exec(&self, sql: &str) {
            sqlx::raw_sql(sql).execute(&self.pool).await.unwrap();
        }
    }
}
