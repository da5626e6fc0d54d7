use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{EntryStore, StoreError};
use crate::entry::{epoch_millis, Entry, EntryDraft};

/// In-memory entry store.
///
/// A single lock over the map and the pending index makes every call a
/// transaction: concurrent `add`s serialize on the lock and a batch flip is
/// observed either fully applied or not at all.
pub struct MemoryEntryStore {
    inner: RwLock<Inner>,
}

struct Inner {
    entries: BTreeMap<u64, Entry>,
    /// Secondary index: ids with `synced = false`
    pending: BTreeSet<u64>,
    next_id: u64,
}

impl MemoryEntryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: BTreeMap::new(),
                pending: BTreeSet::new(),
                next_id: 1,
            }),
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Default for MemoryEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn add(&self, draft: EntryDraft) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;

        let entry = Entry {
            id,
            text: draft.text,
            created_at: draft.created_at.unwrap_or_else(epoch_millis),
            synced: draft.synced.unwrap_or(false),
        };
        if !entry.synced {
            inner.pending.insert(id);
        }
        inner.entries.insert(id, entry);
        Ok(id)
    }

    async fn get(&self, id: u64) -> Result<Option<Entry>, StoreError> {
        Ok(self.inner.read().entries.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Entry>, StoreError> {
        let mut all: Vec<Entry> = self.inner.read().entries.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn get_pending(&self) -> Result<Vec<Entry>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .pending
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect())
    }

    async fn mark_synced(&self, ids: &[u64]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let mut flipped = 0;
        for id in ids {
            if let Some(entry) = inner.entries.get_mut(id) {
                if !entry.synced {
                    entry.synced = true;
                    flipped += 1;
                }
            }
            inner.pending.remove(id);
        }
        Ok(flipped)
    }

    async fn mark_pending(&self, ids: &[u64]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let mut flipped = 0;
        for id in ids {
            if let Some(entry) = inner.entries.get_mut(id) {
                if entry.synced {
                    entry.synced = false;
                    flipped += 1;
                }
                inner.pending.insert(*id);
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(text: &str) -> EntryDraft {
        EntryDraft::new(text)
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_ids() {
        let store = MemoryEntryStore::new();
        let a = store.add(draft("one")).await.unwrap();
        let b = store.add(draft("two")).await.unwrap();
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn test_add_defaults_to_pending() {
        let store = MemoryEntryStore::new();
        let id = store.add(draft("note")).await.unwrap();

        let entry = store.get(id).await.unwrap().unwrap();
        assert!(!entry.synced);
        assert!(entry.created_at > 0);
        assert_eq!(store.get_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_synced_skips_pending_index() {
        let store = MemoryEntryStore::new();
        let mut d = draft("note");
        d.synced = Some(true);
        store.add(d).await.unwrap();

        assert!(store.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_newest_first() {
        let store = MemoryEntryStore::new();
        for (text, ts) in [("old", 100), ("new", 300), ("mid", 200)] {
            let mut d = draft(text);
            d.created_at = Some(ts);
            store.add(d).await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        let texts: Vec<&str> = all.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let store = MemoryEntryStore::new();
        let id = store.add(draft("note")).await.unwrap();

        assert_eq!(store.mark_synced(&[id]).await.unwrap(), 1);
        // Second call flips nothing and changes nothing
        assert_eq!(store.mark_synced(&[id]).await.unwrap(), 0);
        assert!(store.get_pending().await.unwrap().is_empty());
        assert!(store.get(id).await.unwrap().unwrap().synced);
    }

    #[tokio::test]
    async fn test_mark_synced_skips_unknown_ids() {
        let store = MemoryEntryStore::new();
        let id = store.add(draft("note")).await.unwrap();

        let flipped = store.mark_synced(&[id, 999]).await.unwrap();
        assert_eq!(flipped, 1);
    }

    #[tokio::test]
    async fn test_mark_pending_requeues() {
        let store = MemoryEntryStore::new();
        let mut d = draft("note");
        d.synced = Some(true);
        let id = store.add(d).await.unwrap();

        assert_eq!(store.mark_pending(&[id]).await.unwrap(), 1);
        let pending = store.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        use std::sync::Arc;

        let store = Arc::new(MemoryEntryStore::new());
        let mut handles = vec![];
        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store.add(EntryDraft::new(format!("b{batch}-{i}"))).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
        assert_eq!(store.get_pending().await.unwrap().len(), 100);
    }
}
