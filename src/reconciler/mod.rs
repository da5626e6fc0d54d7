// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! Background sync reconciler.
//!
//! Owns the pending-entry state machine: entries are written to the local
//! store first, pushed optimistically when connectivity allows, and drained
//! in the background when connectivity returns or a sync is requested.
//! Synced state flips only on an acknowledgement that names the id, so an
//! entry survives any number of failed attempts and is retried until acked
//! (at-least-once delivery; the backend ledger tolerates duplicates).

pub mod client;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::entry::{EntryDraft, EntryRecord};
use crate::metrics;
use crate::resilience::{retry, RetryConfig};
use crate::store::{EntryStore, StoreError};

pub use client::{IngestBackend, IngestClient, IngestError};

/// Broadcast to interested parties (open pages, in the original deployment)
/// after a drain flips entries to synced.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Completed { ids: Vec<u64> },
}

/// What one drain pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Pending entries attempted
    pub attempted: usize,
    /// Ids acknowledged and flipped this pass
    pub synced_ids: Vec<u64>,
}

impl DrainOutcome {
    fn empty() -> Self {
        Self {
            attempted: 0,
            synced_ids: Vec::new(),
        }
    }
}

enum SyncCommand {
    TrySync,
}

/// Cheap cloneable handle for requesting an immediate sync attempt.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    /// Ask the reconciler to drain now. Returns false if the reconciler
    /// loop is gone.
    pub async fn try_sync(&self) -> bool {
        self.tx.send(SyncCommand::TrySync).await.is_ok()
    }
}

pub struct SyncReconciler {
    store: Arc<dyn EntryStore>,
    backend: Arc<dyn IngestBackend>,
    connectivity: watch::Receiver<bool>,
    events: broadcast::Sender<SyncEvent>,
    commands: Mutex<mpsc::Receiver<SyncCommand>>,
    command_tx: mpsc::Sender<SyncCommand>,
    retry_config: RetryConfig,
}

impl SyncReconciler {
    /// `connectivity` carries the current online/offline view; flipping it
    /// from false to true triggers a drain in [`run`](Self::run).
    pub fn new(
        store: Arc<dyn EntryStore>,
        backend: Arc<dyn IngestBackend>,
        connectivity: watch::Receiver<bool>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let (command_tx, command_rx) = mpsc::channel(8);
        Self {
            store,
            backend,
            connectivity,
            events,
            commands: Mutex::new(command_rx),
            command_tx,
            retry_config: RetryConfig::drain(),
        }
    }

    /// Subscribe to sync completion broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Handle for requesting syncs from elsewhere.
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            tx: self.command_tx.clone(),
        }
    }

    fn online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Persist a new entry, then push it optimistically if we look online.
    ///
    /// The local write always happens first and always succeeds
    /// independently of the network: the returned id is durable before any
    /// byte leaves the machine. A failed or unacknowledged push leaves the
    /// entry pending for the next drain.
    #[tracing::instrument(skip(self, text))]
    pub async fn submit(&self, text: impl Into<String>) -> Result<u64, StoreError> {
        let id = self.store.add(EntryDraft::new(text)).await?;
        metrics::record_operation("reconciler", "submit", "stored");

        if self.online() {
            if let Some(entry) = self.store.get(id).await? {
                let record = EntryRecord::from(&entry);
                match self.backend.post_entries(&[record]).await {
                    Ok(acked) if acked.contains(&id) => {
                        self.store.mark_synced(&[id]).await?;
                        debug!(id, "entry synced optimistically");
                        metrics::record_entries_synced(1);
                    }
                    Ok(_) => {
                        warn!(id, "backend accepted push without acknowledging id");
                        self.store.mark_pending(&[id]).await?;
                    }
                    Err(e) => {
                        debug!(id, error = %e, "optimistic push failed, entry stays pending");
                        self.store.mark_pending(&[id]).await?;
                    }
                }
            }
        }

        Ok(id)
    }

    /// One drain pass: attempt every pending entry, flip the acked ones,
    /// broadcast the flipped ids.
    ///
    /// Entries are attempted independently so one poisoned entry cannot
    /// block the rest of the queue. Unacked entries simply stay pending.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainOutcome, StoreError> {
        let pending = self.store.get_pending().await?;
        if pending.is_empty() {
            metrics::set_pending_entries(0);
            return Ok(DrainOutcome::empty());
        }

        let mut acked = Vec::new();
        for entry in &pending {
            let record = EntryRecord::from(entry);
            match self.backend.post_entries(&[record]).await {
                Ok(ids) if ids.contains(&entry.id) => acked.push(entry.id),
                Ok(_) => {
                    warn!(id = entry.id, "backend accepted batch without acknowledging id");
                }
                Err(e) => {
                    warn!(id = entry.id, error = %e, "ingestion failed, entry stays pending");
                }
            }
        }

        if !acked.is_empty() {
            self.store.mark_synced(&acked).await?;
            metrics::record_entries_synced(acked.len());
            info!(synced = acked.len(), attempted = pending.len(), "drain completed");
            let _ = self.events.send(SyncEvent::Completed { ids: acked.clone() });
        }
        metrics::set_pending_entries(pending.len() - acked.len());

        Ok(DrainOutcome {
            attempted: pending.len(),
            synced_ids: acked,
        })
    }

    /// Reconciler loop. Drains on the offline→online connectivity edge and
    /// on [`SyncHandle::try_sync`]; exits when both trigger sources are
    /// closed.
    pub async fn run(&self) {
        let mut connectivity = self.connectivity.clone();
        let mut was_online = *connectivity.borrow();
        let mut connectivity_open = true;

        loop {
            tokio::select! {
                changed = connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        connectivity_open = false;
                        continue;
                    }
                    let online = *connectivity.borrow();
                    if online && !was_online {
                        info!("connectivity restored, draining pending entries");
                        self.triggered_drain("connectivity").await;
                    }
                    was_online = online;
                }
                command = async { self.commands.lock().await.recv().await } => {
                    match command {
                        Some(SyncCommand::TrySync) => {
                            debug!("sync requested");
                            self.triggered_drain("request").await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn triggered_drain(&self, trigger: &str) {
        let started = std::time::Instant::now();
        let result = retry("sync_drain", &self.retry_config, || self.drain()).await;
        metrics::record_latency("reconciler", "drain", started.elapsed());
        match result {
            Ok(outcome) => {
                metrics::record_operation("reconciler", "drain", "success");
                debug!(
                    trigger,
                    attempted = outcome.attempted,
                    synced = outcome.synced_ids.len(),
                    "drain pass finished"
                );
            }
            Err(e) => {
                metrics::record_operation("reconciler", "drain", "error");
                warn!(trigger, error = %e, "drain failed, entries remain pending");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::store::MemoryEntryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    /// Scripted backend: acks everything, rejects everything, or rejects a
    /// chosen id while acking the rest.
    struct StubBackend {
        mode: SyncMutex<Mode>,
        batches: SyncMutex<Vec<Vec<u64>>>,
    }

    enum Mode {
        AckAll,
        RejectAll,
        RejectId(u64),
    }

    impl StubBackend {
        fn new(mode: Mode) -> Self {
            Self {
                mode: SyncMutex::new(mode),
                batches: SyncMutex::new(Vec::new()),
            }
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock() = mode;
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().len()
        }
    }

    #[async_trait]
    impl IngestBackend for StubBackend {
        async fn post_entries(&self, records: &[EntryRecord]) -> Result<Vec<u64>, IngestError> {
            let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
            self.batches.lock().push(ids.clone());
            match &*self.mode.lock() {
                Mode::AckAll => Ok(ids),
                Mode::RejectAll => Err(IngestError::Transport("connection refused".to_string())),
                Mode::RejectId(bad) => {
                    if ids.contains(bad) {
                        Err(IngestError::Rejected(500))
                    } else {
                        Ok(ids)
                    }
                }
            }
        }
    }

    struct Harness {
        reconciler: SyncReconciler,
        store: Arc<MemoryEntryStore>,
        backend: Arc<StubBackend>,
        connectivity: watch::Sender<bool>,
    }

    fn harness(online: bool, mode: Mode) -> Harness {
        let store = Arc::new(MemoryEntryStore::new());
        let backend = Arc::new(StubBackend::new(mode));
        let (connectivity, rx) = watch::channel(online);
        let reconciler = SyncReconciler::new(store.clone(), backend.clone(), rx);
        Harness {
            reconciler,
            store,
            backend,
            connectivity,
        }
    }

    async fn pending_ids(store: &MemoryEntryStore) -> Vec<u64> {
        store.get_pending().await.unwrap().iter().map(|e| e.id).collect()
    }

    #[tokio::test]
    async fn test_submit_online_syncs_optimistically() {
        let h = harness(true, Mode::AckAll);

        let id = h.reconciler.submit("buy serum").await.unwrap();

        let entry: Entry = h.store.get(id).await.unwrap().unwrap();
        assert!(entry.synced);
        assert!(pending_ids(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_offline_stays_pending_without_network_calls() {
        let h = harness(false, Mode::AckAll);

        let id = h.reconciler.submit("buy serum").await.unwrap();

        assert_eq!(pending_ids(&h.store).await, vec![id]);
        assert_eq!(h.backend.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_push_failure_keeps_entry_pending() {
        let h = harness(true, Mode::RejectAll);

        let id = h.reconciler.submit("buy serum").await.unwrap();

        assert_eq!(pending_ids(&h.store).await, vec![id]);
    }

    #[tokio::test]
    async fn test_drain_flips_acked_and_broadcasts() {
        let h = harness(false, Mode::AckAll);
        let a = h.reconciler.submit("a").await.unwrap();
        let b = h.reconciler.submit("b").await.unwrap();
        let mut events = h.reconciler.subscribe();

        let outcome = h.reconciler.drain().await.unwrap();

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.synced_ids, vec![a, b]);
        assert!(pending_ids(&h.store).await.is_empty());

        let SyncEvent::Completed { ids } = events.recv().await.unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_drain_partial_failure_does_not_block_others() {
        let h = harness(false, Mode::AckAll);
        let a = h.reconciler.submit("a").await.unwrap();
        let b = h.reconciler.submit("b").await.unwrap();
        let c = h.reconciler.submit("c").await.unwrap();
        h.backend.set_mode(Mode::RejectId(b));

        let outcome = h.reconciler.drain().await.unwrap();

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.synced_ids, vec![a, c]);
        assert_eq!(pending_ids(&h.store).await, vec![b]);
    }

    #[tokio::test]
    async fn test_drain_with_nothing_pending_is_silent() {
        let h = harness(false, Mode::AckAll);
        let mut events = h.reconciler.subscribe();

        let outcome = h.reconciler.drain().await.unwrap();

        assert_eq!(outcome, DrainOutcome::empty());
        assert_eq!(h.backend.batch_count(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drain_retries_entry_until_acked() {
        let h = harness(false, Mode::RejectAll);
        let id = h.reconciler.submit("stubborn").await.unwrap();

        h.reconciler.drain().await.unwrap();
        h.reconciler.drain().await.unwrap();
        assert_eq!(pending_ids(&h.store).await, vec![id]);

        h.backend.set_mode(Mode::AckAll);
        let outcome = h.reconciler.drain().await.unwrap();
        assert_eq!(outcome.synced_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_connectivity_edge_triggers_drain() {
        let h = harness(false, Mode::AckAll);
        let id = h.reconciler.submit("offline note").await.unwrap();
        let mut events = h.reconciler.subscribe();

        let reconciler = Arc::new(h.reconciler);
        let runner = reconciler.clone();
        tokio::spawn(async move { runner.run().await });

        h.connectivity.send(true).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("drain not triggered")
            .unwrap();
        let SyncEvent::Completed { ids } = event;
        assert_eq!(ids, vec![id]);
    }

    #[tokio::test]
    async fn test_try_sync_triggers_drain() {
        let h = harness(false, Mode::AckAll);
        let id = h.reconciler.submit("note").await.unwrap();
        let mut events = h.reconciler.subscribe();
        let handle = h.reconciler.handle();

        let reconciler = Arc::new(h.reconciler);
        let runner = reconciler.clone();
        tokio::spawn(async move { runner.run().await });

        assert!(handle.try_sync().await);

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("drain not triggered")
            .unwrap();
        let SyncEvent::Completed { ids } = event;
        assert_eq!(ids, vec![id]);
    }

    #[tokio::test]
    async fn test_online_to_offline_edge_does_not_drain() {
        let h = harness(true, Mode::RejectAll);
        h.reconciler.submit("note").await.unwrap();
        let calls_before = h.backend.batch_count();

        let reconciler = Arc::new(h.reconciler);
        let runner = reconciler.clone();
        tokio::spawn(async move { runner.run().await });

        h.connectivity.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.backend.batch_count(), calls_before);
    }
}
