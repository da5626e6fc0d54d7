//! Client-side entry storage.
//!
//! Durable keyed storage of [`Entry`](crate::entry::Entry) rows with a
//! secondary index on the `synced` flag, so the reconciler can drain
//! pending entries without scanning. Two backends:
//!
//! - [`MemoryEntryStore`]: single-lock in-memory store (tests, ephemeral use)
//! - [`SqlEntryStore`]: SQLite/MySQL via sqlx with per-call transactions

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::MemoryEntryStore;
pub use sql::SqlEntryStore;
pub use traits::{EntryStore, StoreError};
