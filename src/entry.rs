//! Entry data structures.
//!
//! An [`Entry`] is the unit that flows through the whole system: created in
//! the client store, drained by the reconciler, appended to the server
//! ledger. The wire types mirror the ingestion contract
//! (`POST /entries` with camelCase field names).

use serde::{Deserialize, Serialize};

/// A user note held in the client-side store.
///
/// Entries are immutable once created except for the `synced` flag, which
/// flips to `true` exactly once when an ingestion acknowledgement names the
/// id. A synced entry is never re-queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Store-assigned ordinal, unique within one store (auto-increment)
    pub id: u64,
    /// User-supplied text, opaque to the sync machinery
    pub text: String,
    /// Creation timestamp (epoch millis), immutable
    pub created_at: i64,
    /// False until the backend ledger acknowledged this id
    pub synced: bool,
}

/// Input for [`EntryStore::add`](crate::store::EntryStore::add).
///
/// The store owns no network knowledge, so the caller supplies `synced`
/// from its own connectivity view; `None` means pending.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub text: String,
    /// Defaults to now
    pub created_at: Option<i64>,
    /// Defaults to false (pending)
    pub synced: Option<bool>,
}

impl EntryDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            created_at: None,
            synced: None,
        }
    }
}

/// One entry as it travels to the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub id: u64,
    pub text: String,
    /// Optional on the wire; the server stamps now when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            text: entry.text.clone(),
            created_at: Some(entry.created_at),
        }
    }
}

/// Body of `POST /entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub entries: Vec<EntryRecord>,
}

/// Acknowledgement returned by the ingestion endpoint. Consumed immediately
/// by the reconciler, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub ok: bool,
    #[serde(default)]
    pub synced_ids: Vec<u64>,
}

/// Current time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
