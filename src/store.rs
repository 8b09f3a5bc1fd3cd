//! Key/value persistence for the queue snapshot and the subscriber list.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, warn};

use crate::error::AppResult;

pub const QUEUE_KEY: &str = "queue";
pub const SUBSCRIBERS_KEY: &str = "subscribers";

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn load(&self, key: &str) -> AppResult<Option<Bytes>>;
    async fn save(&self, key: &str, value: Bytes) -> AppResult<()>;
}

/* ------------ one JSON file per key ------------ */
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait::async_trait]
impl Store for FileStore {
    async fn load(&self, key: &str) -> AppResult<Option<Bytes>> {
        match fs::read(self.path(key)).await {
            Ok(raw) => Ok(Some(Bytes::from(raw))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: Bytes) -> AppResult<()> {
        // write-then-rename: readers never see a partial snapshot
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, &value).await?;
        fs::rename(&tmp, self.path(key)).await?;
        Ok(())
    }
}

/* ------------ SQLite kv table ------------ */
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(url: &str) -> AppResult<Self> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value BLOB NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn load(&self, key: &str) -> AppResult<Option<Bytes>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| Bytes::from(v)))
    }

    async fn save(&self, key: &str, value: Bytes) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/* ------------ typed helpers: failures are logged, never raised ------------ */

/// Missing or unreadable state yields `None`.
pub async fn load_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Option<T> {
    let raw = match store.load(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            info!("no saved {key} found");
            return None;
        }
        Err(e) => {
            error!("failed to read {key}: {e}");
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            error!("failed to parse saved {key}: {e}");
            None
        }
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) {
    let raw = match serde_json::to_vec_pretty(value) {
        Ok(raw) => raw,
        Err(e) => {
            error!("failed to encode {key}: {e}");
            return;
        }
    };
    if let Err(e) = store.save(key, raw.into()).await {
        warn!("failed to save {key}: {e}");
    }
}
