// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! SQL entry store.
//!
//! Durable client-side persistence over sqlx's `Any` driver (SQLite file in
//! practice, MySQL works too). Schema:
//!
//! ```sql
//! CREATE TABLE entries (
//!   id INTEGER PRIMARY KEY AUTOINCREMENT,
//!   text TEXT NOT NULL,
//!   created_at INTEGER NOT NULL,  -- epoch millis
//!   synced INTEGER NOT NULL DEFAULT 0
//! );
//! CREATE INDEX idx_entries_synced ON entries (synced);
//! ```
//!
//! `get_pending()` is served by `idx_entries_synced`, never by a full scan.
//! Batch status flips run inside one transaction so partial application is
//! not observable.

use async_trait::async_trait;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use std::sync::Once;
use std::time::Duration;

use super::traits::{EntryStore, StoreError};
use crate::entry::{epoch_millis, Entry, EntryDraft};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlEntryStore {
    pool: AnyPool,
}

impl SqlEntryStore {
    /// Connect with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("entry_store_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(connection_string)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema(is_sqlite).await?;
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// WAL mode: concurrent reads during writes, single fsync per commit.
    async fn enable_wal_mode(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to set synchronous mode: {}", e)))?;
        Ok(())
    }

    async fn init_schema(&self, is_sqlite: bool) -> Result<(), StoreError> {
        let table = if is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                text TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                synced TINYINT NOT NULL DEFAULT 0,
                INDEX idx_entries_synced (synced)
            )
            "#
        };

        retry("entry_store_schema", &RetryConfig::startup(), || async {
            sqlx::query(table)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;

        // SQLite creates indexes separately
        if is_sqlite {
            sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_synced ON entries (synced)")
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        Ok(())
    }

    fn row_to_entry(row: &sqlx::any::AnyRow) -> Result<Entry, StoreError> {
        Ok(Entry {
            id: row
                .try_get::<i64, _>("id")
                .map_err(|e| StoreError::Backend(e.to_string()))? as u64,
            text: row
                .try_get::<String, _>("text")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row
                .try_get::<i64, _>("created_at")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            synced: row
                .try_get::<i64, _>("synced")
                .map_err(|e| StoreError::Backend(e.to_string()))?
                != 0,
        })
    }

    /// Bulk status flip in one transaction. `target` is the new synced value.
    async fn flip_status(&self, ids: &[u64], target: bool) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE entries SET synced = ? WHERE synced = ? AND id IN ({})",
            placeholders
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut query = sqlx::query(&sql)
            .bind(i64::from(target))
            .bind(i64::from(!target));
        for id in ids {
            query = query.bind(*id as i64);
        }

        let result = query
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl EntryStore for SqlEntryStore {
    #[tracing::instrument(skip(self, draft))]
    async fn add(&self, draft: EntryDraft) -> Result<u64, StoreError> {
        let created_at = draft.created_at.unwrap_or_else(epoch_millis);
        let synced = draft.synced.unwrap_or(false);

        let result = sqlx::query("INSERT INTO entries (text, created_at, synced) VALUES (?, ?, ?)")
            .bind(&draft.text)
            .bind(created_at)
            .bind(i64::from(synced))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let id = result
            .last_insert_id()
            .ok_or_else(|| StoreError::Backend("no id returned for insert".to_string()))?;
        Ok(id as u64)
    }

    async fn get(&self, id: u64) -> Result<Option<Entry>, StoreError> {
        let row = sqlx::query("SELECT id, text, created_at, synced FROM entries WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Entry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, text, created_at, synced FROM entries ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn get_pending(&self) -> Result<Vec<Entry>, StoreError> {
        let rows =
            sqlx::query("SELECT id, text, created_at, synced FROM entries WHERE synced = 0")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    #[tracing::instrument(skip(self), fields(count = ids.len()))]
    async fn mark_synced(&self, ids: &[u64]) -> Result<usize, StoreError> {
        self.flip_status(ids, true).await
    }

    #[tracing::instrument(skip(self), fields(count = ids.len()))]
    async fn mark_pending(&self, ids: &[u64]) -> Result<usize, StoreError> {
        self.flip_status(ids, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqlEntryStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let store = SqlEntryStore::new(&url).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_add_and_get_roundtrip() {
        let (_dir, store) = temp_store().await;

        let id = store.add(EntryDraft::new("buy serum")).await.unwrap();
        let entry = store.get(id).await.unwrap().unwrap();

        assert_eq!(entry.text, "buy serum");
        assert!(!entry.synced);
        assert!(entry.created_at > 0);
    }

    #[tokio::test]
    async fn test_pending_and_flip() {
        let (_dir, store) = temp_store().await;

        let a = store.add(EntryDraft::new("a")).await.unwrap();
        let b = store.add(EntryDraft::new("b")).await.unwrap();

        assert_eq!(store.get_pending().await.unwrap().len(), 2);

        let flipped = store.mark_synced(&[a]).await.unwrap();
        assert_eq!(flipped, 1);

        let pending = store.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);
    }

    #[tokio::test]
    async fn test_mark_synced_idempotent_and_skips_unknown() {
        let (_dir, store) = temp_store().await;

        let id = store.add(EntryDraft::new("note")).await.unwrap();
        assert_eq!(store.mark_synced(&[id, 424242]).await.unwrap(), 1);
        assert_eq!(store.mark_synced(&[id, 424242]).await.unwrap(), 0);
        assert!(store.get(id).await.unwrap().unwrap().synced);
    }

    #[tokio::test]
    async fn test_get_all_ordering() {
        let (_dir, store) = temp_store().await;

        for (text, ts) in [("old", 100i64), ("new", 300), ("mid", 200)] {
            let mut d = EntryDraft::new(text);
            d.created_at = Some(ts);
            store.add(d).await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        let texts: Vec<&str> = all.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_mark_pending_requeues() {
        let (_dir, store) = temp_store().await;

        let mut d = EntryDraft::new("note");
        d.synced = Some(true);
        let id = store.add(d).await.unwrap();
        assert!(store.get_pending().await.unwrap().is_empty());

        assert_eq!(store.mark_pending(&[id]).await.unwrap(), 1);
        assert_eq!(store.get_pending().await.unwrap().len(), 1);
    }
}
