//! Server-side entry ledger.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};
use thiserror::Error;

use crate::entry::{epoch_millis, EntryRecord};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// One ingested entry as the server remembers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// Client-assigned id, echoed back in the acknowledgement. Not unique:
    /// at-least-once delivery means the same id may be appended twice.
    pub id: u64,
    pub text: String,
    pub created_at: i64,
    /// Server-stamped ingestion time (epoch millis)
    pub synced_at: i64,
}

/// Append-only ingestion ledger.
///
/// Appends are atomic per batch. Duplicate client ids are appended as-is;
/// deduplication is deliberately not this layer's job.
#[async_trait]
pub trait EntryLedger: Send + Sync {
    /// Append a batch, stamping each record with the ingestion time.
    /// Returns the client ids acknowledged, in batch order.
    async fn append_batch(&self, records: &[EntryRecord]) -> Result<Vec<u64>, LedgerError>;

    /// Snapshot of the full ledger, append order.
    async fn all(&self) -> Result<Vec<LedgerRecord>, LedgerError>;

    async fn count(&self) -> Result<usize, LedgerError>;
}

/// In-memory ledger.
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<LedgerRecord>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryLedger for MemoryLedger {
    async fn append_batch(&self, records: &[EntryRecord]) -> Result<Vec<u64>, LedgerError> {
        let synced_at = epoch_millis();
        let mut ledger = self.records.write();
        let mut acked = Vec::with_capacity(records.len());
        for record in records {
            ledger.push(LedgerRecord {
                id: record.id,
                text: record.text.clone(),
                created_at: record.created_at.unwrap_or(synced_at),
                synced_at,
            });
            acked.push(record.id);
        }
        Ok(acked)
    }

    async fn all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Ok(self.records.read().clone())
    }

    async fn count(&self) -> Result<usize, LedgerError> {
        Ok(self.records.read().len())
    }
}

/// SQL-backed ledger. The table has its own append sequence; the client id
/// is an ordinary column because it is only unique per client store.
pub struct SqlLedger {
    pool: AnyPool,
}

impl SqlLedger {
    pub async fn new(pool: AnyPool, is_sqlite: bool) -> Result<Self, LedgerError> {
        let table = if is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                synced_at INTEGER NOT NULL
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                seq BIGINT PRIMARY KEY AUTO_INCREMENT,
                client_id BIGINT NOT NULL,
                text TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                synced_at BIGINT NOT NULL
            )
            "#
        };
        sqlx::query(table)
            .execute(&pool)
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl EntryLedger for SqlLedger {
    async fn append_batch(&self, records: &[EntryRecord]) -> Result<Vec<u64>, LedgerError> {
        let synced_at = epoch_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;

        let mut acked = Vec::with_capacity(records.len());
        for record in records {
            sqlx::query(
                "INSERT INTO ledger (client_id, text, created_at, synced_at) VALUES (?, ?, ?, ?)",
            )
            .bind(record.id as i64)
            .bind(&record.text)
            .bind(record.created_at.unwrap_or(synced_at))
            .bind(synced_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
            acked.push(record.id);
        }

        tx.commit()
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        Ok(acked)
    }

    async fn all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let rows = sqlx::query(
            "SELECT client_id, text, created_at, synced_at FROM ledger ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(LedgerRecord {
                    id: row
                        .try_get::<i64, _>("client_id")
                        .map_err(|e| LedgerError::Backend(e.to_string()))?
                        as u64,
                    text: row
                        .try_get::<String, _>("text")
                        .map_err(|e| LedgerError::Backend(e.to_string()))?,
                    created_at: row
                        .try_get::<i64, _>("created_at")
                        .map_err(|e| LedgerError::Backend(e.to_string()))?,
                    synced_at: row
                        .try_get::<i64, _>("synced_at")
                        .map_err(|e| LedgerError::Backend(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM ledger")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        let n = row
            .try_get::<i64, _>("n")
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, text: &str) -> EntryRecord {
        EntryRecord {
            id,
            text: text.to_string(),
            created_at: Some(1_700_000_000_000),
        }
    }

    #[tokio::test]
    async fn test_append_acks_in_batch_order() {
        let ledger = MemoryLedger::new();
        let acked = ledger
            .append_batch(&[record(3, "c"), record(1, "a"), record(2, "b")])
            .await
            .unwrap();
        assert_eq!(acked, vec![3, 1, 2]);
        assert_eq!(ledger.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_records_get_synced_at_stamp() {
        let ledger = MemoryLedger::new();
        ledger.append_batch(&[record(1, "note")]).await.unwrap();

        let all = ledger.all().await.unwrap();
        assert!(all[0].synced_at > 0);
        assert_eq!(all[0].created_at, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_missing_created_at_defaults_to_ingest_time() {
        let ledger = MemoryLedger::new();
        ledger
            .append_batch(&[EntryRecord {
                id: 1,
                text: "note".to_string(),
                created_at: None,
            }])
            .await
            .unwrap();

        let all = ledger.all().await.unwrap();
        assert_eq!(all[0].created_at, all[0].synced_at);
    }

    #[tokio::test]
    async fn test_duplicate_ids_append_twice() {
        let ledger = MemoryLedger::new();
        ledger.append_batch(&[record(7, "first")]).await.unwrap();
        let acked = ledger.append_batch(&[record(7, "retry")]).await.unwrap();

        assert_eq!(acked, vec![7]);
        assert_eq!(ledger.count().await.unwrap(), 2);
    }
}
