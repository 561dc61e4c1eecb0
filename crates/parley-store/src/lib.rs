//! # parley-store
//!
//! Persistence services for Parley.
//!
//! This crate provides:
//! - A small key/value [`Storage`] abstraction with SQLite and in-memory backends
//! - The [`MemoryStore`] consulted when building conversation context
//! - The [`OfflineQueue`] holding requests that failed on transport errors
//!
//! ## Storage Layout
//!
//! Everything lives in one SQLite database (`<data_dir>/parley/parley.db` by
//! default) with a single `kv` table. Memories and queued requests are JSON
//! documents under the keys [`MEMORY_KEY`] and [`QUEUE_KEY`].

pub mod memory;
pub mod queue;
pub mod storage;

pub use memory::{format_context, MemoryEntry, MemoryQuery, MemoryStore, MemoryType, NewMemory, MEMORY_KEY};
pub use queue::{FlushReport, OfflineQueue, QueuedItem, QUEUE_KEY};
pub use storage::{load_json, save_json, InMemoryStorage, SqliteStorage, Storage, StoreError};
