// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! # glowsync
//!
//! Offline-first sync engine for a notes app: request-interception caching
//! on the client edge, a durable pending-entry queue reconciled in the
//! background, and a server-side ingestion endpoint that acknowledges ids
//! and fans out push notifications.
//!
//! ```text
//!        page requests                    user entries
//!             │                                │
//!             ▼                                ▼
//!      ┌─────────────┐                 ┌──────────────┐
//!      │ CacheRouter │                 │  EntryStore  │◄─── submit()
//!      │  (buckets)  │                 │ (pending ix) │
//!      └──────┬──────┘                 └──────┬───────┘
//!             │ network / cache               │ drain on connectivity
//!             ▼                               ▼
//!      ┌─────────────┐                ┌────────────────┐
//!      │   backend   │◄───POST────────│ SyncReconciler │──► SyncEvent
//!      │  /entries   │   /entries     └────────────────┘
//!      └──────┬──────┘
//!             │ ack + ledger append
//!             ▼
//!      ┌──────────────┐      ┌────────────────┐
//!      │  EntryLedger │      │ PushDispatcher │──► Web Push fan-out,
//!      └──────────────┘      └────────────────┘    dead-endpoint pruning
//! ```
//!
//! The crate is a library: embed the [`server`] router in your own binary
//! and drive the client pieces ([`CacheRouter`], [`SyncReconciler`]) from
//! the host runtime. Storage is pluggable behind [`EntryStore`],
//! [`server::EntryLedger`] and [`push::SubscriptionSet`]; in-memory and SQL
//! (SQLite/MySQL via sqlx `Any`) implementations ship in the box.
//!
//! ## Quick start
//!
//! ```no_run
//! use glowsync::{
//!     AppState, MemoryLedger, MemorySubscriptionSet, PushDispatcher, SyncConfig,
//!     WebPushTransport,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::default();
//!     let transport = Arc::new(WebPushTransport::new(&config)?);
//!     let subscriptions = Arc::new(MemorySubscriptionSet::new());
//!     let dispatcher = Arc::new(PushDispatcher::new(
//!         subscriptions.clone(),
//!         transport,
//!         Duration::from_millis(config.push_timeout_ms),
//!     ));
//!     let state = AppState {
//!         ledger: Arc::new(MemoryLedger::new()),
//!         subscriptions,
//!         dispatcher,
//!     };
//!     glowsync::server::serve(glowsync::server::router(state), "0.0.0.0:5000".parse()?).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod entry;
pub mod metrics;
pub mod push;
pub mod reconciler;
pub mod resilience;
pub mod server;
pub mod store;

pub use cache::{
    BucketStore, CacheError, CacheRouter, Generation, GenerationState, HttpFetcher,
    MemoryBucketStore, NetworkFetcher, PageRequest, PageResponse, Strategy,
};
pub use config::SyncConfig;
pub use entry::{Entry, EntryDraft, EntryRecord};
pub use push::{
    DispatchOutcome, DispatchReport, MemorySubscriptionSet, NotificationPayload, PushDispatcher,
    PushError, SqlSubscriptionSet, Subscription, SubscriptionSet, WebPushTransport,
};
pub use reconciler::{
    DrainOutcome, IngestClient, IngestError, SyncEvent, SyncHandle, SyncReconciler,
};
pub use resilience::{retry, RetryConfig};
pub use server::{AppState, EntryLedger, LedgerRecord, MemoryLedger, SqlLedger};
pub use store::{EntryStore, MemoryEntryStore, SqlEntryStore, StoreError};
