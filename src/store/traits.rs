use async_trait::async_trait;
use thiserror::Error;

use crate::entry::{Entry, EntryDraft};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable keyed storage of entries with query-by-status.
///
/// Mutating calls are transactional: a batch status flip is either fully
/// applied or, on an underlying fault, not durably committed at all.
/// Status flips are idempotent; ids that do not exist are silently skipped.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert a new entry and return its assigned id. Atomic: the record
    /// is either fully visible or not created at all.
    async fn add(&self, draft: EntryDraft) -> Result<u64, StoreError>;

    /// Fetch a single entry by id.
    async fn get(&self, id: u64) -> Result<Option<Entry>, StoreError>;

    /// All entries, newest-first by `created_at` (ties broken by id desc).
    async fn get_all(&self) -> Result<Vec<Entry>, StoreError>;

    /// All entries with `synced = false`, served from the status index.
    async fn get_pending(&self) -> Result<Vec<Entry>, StoreError>;

    /// Flip the given ids to `synced = true`. Returns how many rows
    /// actually changed state (already-synced and unknown ids count zero).
    async fn mark_synced(&self, ids: &[u64]) -> Result<usize, StoreError>;

    /// Flip the given ids back to pending. Same skip/idempotence rules.
    async fn mark_pending(&self, ids: &[u64]) -> Result<usize, StoreError>;
}
