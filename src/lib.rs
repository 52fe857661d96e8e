//! Offline order cache and pending-action reconciliation for suite operations.
//!
//! [`cache::OfflineStore`] keeps the last known order list and a FIFO queue of
//! mutations made while disconnected. [`sync::Reconciler`] decides when to
//! serve the cache, when to queue, and replays the queue against a
//! [`remote::OrderService`] once connectivity returns.

pub mod cache;
pub mod config;
pub mod logging;
pub mod orders;
pub mod remote;
pub mod sync;
