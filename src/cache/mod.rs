//! Local order cache for offline support.
//!
//! This module provides:
//! - A last-known order snapshot with a capture time and staleness check
//! - A FIFO queue of mutations made while offline
//! - Pluggable durable storage (SQLite, in-memory, disabled)
//! - Versioned persistence so older data is migrated rather than dropped

mod diagnostics;
mod envelope;
mod storage;
mod store;
mod traits;

pub use diagnostics::DiagnosticsSnapshot;
pub use storage::{KeyValueStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use store::{
  default_stale_after, CachedOrders, OfflineStore, CAPTURED_AT_KEY, ORDERS_KEY,
  PENDING_ACTIONS_KEY,
};
pub use traits::{CacheResult, CacheSource, Clock, ManualClock, SystemClock};
