use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{Checkpoint, CheckpointListEntry, InvestigationPhase, InvestigationSummary, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed checkpoint storage.
///
/// Saves run inside a transaction so the "latest" pointer is never observed
/// ahead of its checkpoint; concurrent saves for different investigations do
/// not interfere, and writes within one investigation serialize on the
/// database.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    max_checkpoints_per_investigation: u32,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(
        config: &DatabaseConfig,
        max_checkpoints_per_investigation: u32,
    ) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self {
            pool,
            max_checkpoints_per_investigation: max_checkpoints_per_investigation.max(1),
        };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance (tests and dry runs).
    ///
    /// Uses a single connection; every pooled connection would otherwise get
    /// its own private in-memory database.
    pub async fn new_in_memory(max_checkpoints_per_investigation: u32) -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self {
            pool,
            max_checkpoints_per_investigation: max_checkpoints_per_investigation.max(1),
        };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<String> {
        let snapshot =
            serde_json::to_string(checkpoint).map_err(|e| StorageError::Serialization {
                message: format!("Failed to serialize checkpoint: {}", e),
            })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints
                (id, investigation_id, session_id, created_at, phase, query,
                 confidence, hypothesis_count, snapshot)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.investigation_id)
        .bind(&checkpoint.session_id)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(checkpoint.phase.to_string())
        .bind(&checkpoint.query)
        .bind(checkpoint.confidence as i64)
        .bind(checkpoint.hypothesis_count() as i64)
        .bind(&snapshot)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO investigations (investigation_id, latest_checkpoint_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(investigation_id) DO UPDATE SET
                latest_checkpoint_id = excluded.latest_checkpoint_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&checkpoint.investigation_id)
        .bind(&checkpoint.id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Oldest-first eviction beyond the retention limit
        let evicted = sqlx::query(
            r#"
            DELETE FROM checkpoints
            WHERE investigation_id = ?1
              AND id NOT IN (
                  SELECT id FROM checkpoints
                  WHERE investigation_id = ?1
                  ORDER BY created_at DESC, id DESC
                  LIMIT ?2
              )
            "#,
        )
        .bind(&checkpoint.investigation_id)
        .bind(self.max_checkpoints_per_investigation as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        debug!(
            checkpoint_id = %checkpoint.id,
            investigation_id = %checkpoint.investigation_id,
            evicted,
            "Checkpoint saved"
        );

        Ok(checkpoint.id.clone())
    }

    async fn get_checkpoint(
        &self,
        investigation_id: &str,
        checkpoint_id: &str,
    ) -> StorageResult<Option<Checkpoint>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT snapshot FROM checkpoints
            WHERE investigation_id = ? AND id = ?
            "#,
        )
        .bind(investigation_id)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_checkpoint()).transpose()
    }

    async fn latest_checkpoint(
        &self,
        investigation_id: &str,
    ) -> StorageResult<Option<Checkpoint>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT c.snapshot AS snapshot
            FROM investigations i
            JOIN checkpoints c ON c.id = i.latest_checkpoint_id
            WHERE i.investigation_id = ?
            "#,
        )
        .bind(investigation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_checkpoint()).transpose()
    }

    async fn list_checkpoints(
        &self,
        investigation_id: &str,
    ) -> StorageResult<Vec<CheckpointListEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, phase, confidence, hypothesis_count
            FROM checkpoints
            WHERE investigation_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(investigation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }

    async fn list_investigations(&self) -> StorageResult<Vec<InvestigationSummary>> {
        let rows: Vec<InvestigationRow> = sqlx::query_as(
            r#"
            SELECT
                i.investigation_id AS investigation_id,
                (SELECT COUNT(*) FROM checkpoints c2
                 WHERE c2.investigation_id = i.investigation_id) AS checkpoint_count,
                c.id AS id,
                c.created_at AS created_at,
                c.phase AS phase,
                c.confidence AS confidence,
                c.hypothesis_count AS hypothesis_count
            FROM investigations i
            JOIN checkpoints c ON c.id = i.latest_checkpoint_id
            ORDER BY c.created_at DESC, c.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(InvestigationSummary {
                    investigation_id: r.investigation_id.clone(),
                    checkpoint_count: r.checkpoint_count as usize,
                    latest: EntryRow {
                        id: r.id,
                        created_at: r.created_at,
                        phase: r.phase,
                        confidence: r.confidence,
                        hypothesis_count: r.hypothesis_count,
                    }
                    .into_entry()?,
                })
            })
            .collect()
    }

    async fn delete_checkpoint(
        &self,
        investigation_id: &str,
        checkpoint_id: &str,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM checkpoints
            WHERE investigation_id = ? AND id = ?
            "#,
        )
        .bind(investigation_id)
        .bind(checkpoint_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Repoint "latest" when it referenced the deleted checkpoint
        let latest: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT latest_checkpoint_id FROM investigations
            WHERE investigation_id = ?
            "#,
        )
        .bind(investigation_id)
        .fetch_optional(&mut *tx)
        .await?;

        if latest.map(|(id,)| id) == Some(checkpoint_id.to_string()) {
            let next: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT id FROM checkpoints
                WHERE investigation_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(investigation_id)
            .fetch_optional(&mut *tx)
            .await?;

            match next {
                Some((next_id,)) => {
                    sqlx::query(
                        r#"
                        UPDATE investigations
                        SET latest_checkpoint_id = ?, updated_at = ?
                        WHERE investigation_id = ?
                        "#,
                    )
                    .bind(&next_id)
                    .bind(Utc::now().to_rfc3339())
                    .bind(investigation_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        r#"
                        DELETE FROM investigations WHERE investigation_id = ?
                        "#,
                    )
                    .bind(investigation_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_investigation(&self, investigation_id: &str) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM checkpoints WHERE investigation_id = ?
            "#,
        )
        .bind(investigation_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            DELETE FROM investigations WHERE investigation_id = ?
            "#,
        )
        .bind(investigation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(investigation_id, deleted, "Investigation checkpoints deleted");
        Ok(deleted)
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    snapshot: String,
}

impl SnapshotRow {
    fn into_checkpoint(self) -> StorageResult<Checkpoint> {
        serde_json::from_str(&self.snapshot).map_err(|e| StorageError::Serialization {
            message: format!("Failed to deserialize checkpoint snapshot: {}", e),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    created_at: String,
    phase: String,
    confidence: i64,
    hypothesis_count: i64,
}

impl EntryRow {
    fn into_entry(self) -> StorageResult<CheckpointListEntry> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StorageError::Query {
                message: format!("Invalid created_at '{}': {}", self.created_at, e),
            })?
            .with_timezone(&Utc);
        let phase = self
            .phase
            .parse::<InvestigationPhase>()
            .map_err(|e| StorageError::Query { message: e })?;

        Ok(CheckpointListEntry {
            id: self.id,
            created_at,
            phase,
            confidence: self.confidence.clamp(0, 100) as u8,
            hypothesis_count: self.hypothesis_count.max(0) as usize,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvestigationRow {
    investigation_id: String,
    checkpoint_count: i64,
    id: String,
    created_at: String,
    phase: String,
    confidence: i64,
    hypothesis_count: i64,
}
