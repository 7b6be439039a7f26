//! SurrealDB-backed PullStatusStore implementation
//!
//! One row per pull request in the `pull_status` table, keyed by the
//! `PullKey` display form. The status itself is stored as a JSON string so
//! timestamps survive the round trip without SurrealDB datetime coercion.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::schema::{ProjectStatus, PullKey, PullStatus};
use crate::storage_traits::{PullStatusStore, StorageResult};

const NAMESPACE: &str = "terrabot";
const DATABASE: &str = "main";

/// Row shape of the `pull_status` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PullStatusRow {
    pull_key: String,
    status_json: String,
}

/// SurrealDB-backed implementation of [`PullStatusStore`].
pub struct SurrealPullStatusStore {
    db: Surreal<Any>,
    // Serializes read-modify-write cycles issued from this process.
    write_lock: Mutex<()>,
}

impl SurrealPullStatusStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to `url` (`mem://`, `surrealkv://<path>`, `ws://host:port`, ...),
    /// select `terrabot/main` and ensure the schema exists.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        init_schema(&db).await?;

        info!(url = %url, "SurrealPullStatusStore connected");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    async fn fetch(&self, key: &str) -> StorageResult<Option<PullStatus>> {
        let key_owned = key.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM pull_status WHERE pull_key = $key")
            .bind(("key", key_owned))
            .await?;

        let rows: Vec<PullStatusRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(|row| serde_json::from_str(&row.status_json).map_err(StorageError::from))
            .transpose()
    }
}

/// Create the `pull_status` table and its unique key index. Idempotent.
async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing pull_status table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS pull_status SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_pull_key ON TABLE pull_status COLUMNS pull_key UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

    Ok(())
}

#[async_trait]
impl PullStatusStore for SurrealPullStatusStore {
    async fn get(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>> {
        self.fetch(&pull.to_string()).await
    }

    async fn update(
        &self,
        pull: &PullKey,
        head_commit: &str,
        updates: Vec<ProjectStatus>,
    ) -> StorageResult<PullStatus> {
        let _guard = self.write_lock.lock().await;
        let key = pull.to_string();

        let prior = self.fetch(&key).await?;
        let merged = PullStatus::merge(prior, pull, head_commit, updates, Utc::now());

        let row = PullStatusRow {
            pull_key: key.clone(),
            status_json: serde_json::to_string(&merged)?,
        };

        debug!(pull = %key, projects = merged.projects.len(), "writing pull status");

        self.db
            .query("DELETE pull_status WHERE pull_key = $key; CREATE pull_status CONTENT $row;")
            .bind(("key", key))
            .bind(("row", row))
            .await?
            .check()?;

        Ok(merged)
    }

    async fn delete(&self, pull: &PullKey) -> StorageResult<Option<PullStatus>> {
        let _guard = self.write_lock.lock().await;
        let key = pull.to_string();

        let prior = self.fetch(&key).await?;
        self.db
            .query("DELETE pull_status WHERE pull_key = $key")
            .bind(("key", key))
            .await?
            .check()?;

        Ok(prior)
    }
}
