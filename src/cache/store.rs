//! Order snapshot cache and pending-action queue over a durable key-value store.
//!
//! Storage problems never reach the caller: reads degrade to "nothing
//! cached" / an empty queue and writes become no-ops. Each absorbed failure
//! is logged and counted in [`StorageDiagnostics`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::diagnostics::{DiagnosticsSnapshot, StorageDiagnostics, StorageOp};
use super::envelope;
use super::storage::KeyValueStorage;
use super::traits::{Clock, SystemClock};
use crate::orders::{Order, OrderStatus};
use crate::sync::action::PendingAction;

/// Storage key of the serialized order snapshot.
pub const ORDERS_KEY: &str = "suitesync.orders";
/// Storage key of the snapshot capture time (epoch milliseconds).
pub const CAPTURED_AT_KEY: &str = "suitesync.orders.captured_at";
/// Storage key of the serialized pending-action queue.
pub const PENDING_ACTIONS_KEY: &str = "suitesync.pending_actions";

/// Default age after which a snapshot is reported as stale.
pub fn default_stale_after() -> Duration {
  Duration::hours(24)
}

/// The cached order list as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedOrders {
  /// `None` when nothing is cached or the cached data is unreadable
  pub orders: Option<Vec<Order>>,
  pub is_stale: bool,
  pub captured_at: Option<DateTime<Utc>>,
}

impl CachedOrders {
  fn missing() -> Self {
    Self {
      orders: None,
      is_stale: true,
      captured_at: None,
    }
  }
}

/// Local order cache plus the queue of mutations waiting for replay.
///
/// One instance is built per process around an injected storage backend.
pub struct OfflineStore<S: KeyValueStorage> {
  storage: S,
  clock: Arc<dyn Clock>,
  stale_after: Duration,
  diagnostics: StorageDiagnostics,
}

impl<S: KeyValueStorage> OfflineStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage,
      clock: Arc::new(SystemClock),
      stale_after: default_stale_after(),
      diagnostics: StorageDiagnostics::default(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Set the age after which cached orders are reported as stale.
  pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
    self.stale_after = stale_after;
    self
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  pub fn diagnostics(&self) -> DiagnosticsSnapshot {
    self.diagnostics.snapshot()
  }

  /// Check if a snapshot captured at `captured_at` is stale right now.
  pub fn is_stale(&self, captured_at: DateTime<Utc>) -> bool {
    self.now() - captured_at > self.stale_after
  }

  // --------------------------------------------------------------------------
  // Snapshot
  // --------------------------------------------------------------------------

  /// Replace the snapshot with `orders`, stamped with the current time.
  pub fn cache_orders(&self, orders: &[Order]) {
    if !self.write(ORDERS_KEY, &orders) {
      return;
    }
    let captured_at = self.now().timestamp_millis();
    if self.write(CAPTURED_AT_KEY, &captured_at) {
      debug!(count = orders.len(), "cached order snapshot");
    }
  }

  /// Read the snapshot back.
  pub fn get_cached_orders(&self) -> CachedOrders {
    let Some(orders) = self.read::<Vec<Order>>(ORDERS_KEY) else {
      return CachedOrders::missing();
    };

    let captured_at = self
      .read::<i64>(CAPTURED_AT_KEY)
      .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    // Unknown capture time counts as stale
    let is_stale = captured_at.map(|t| self.is_stale(t)).unwrap_or(true);

    CachedOrders {
      orders: Some(orders),
      is_stale,
      captured_at,
    }
  }

  /// Set the status of one cached order. Does nothing without a snapshot.
  ///
  /// The capture time is left alone so a local edit never makes old data
  /// look fresh.
  pub fn update_cached_order_status(&self, order_id: &str, new_status: OrderStatus) {
    let Some(mut orders) = self.read::<Vec<Order>>(ORDERS_KEY) else {
      return;
    };

    let mut changed = false;
    for order in orders.iter_mut().filter(|o| o.id == order_id) {
      order.status = new_status;
      changed = true;
    }

    if changed {
      self.write(ORDERS_KEY, &orders);
    } else {
      debug!(order_id, "status update for order not in snapshot");
    }
  }

  /// Insert or replace one order in the snapshot. Does nothing without a snapshot.
  pub fn upsert_cached_order(&self, order: &Order) {
    self.merge_cached_orders(std::slice::from_ref(order));
  }

  /// Fold a partial listing into the snapshot, keeping its capture time.
  ///
  /// Known orders are replaced in place and new ones go to the front. Orders
  /// missing from `fetched` are kept. Does nothing without a snapshot.
  pub fn merge_cached_orders(&self, fetched: &[Order]) {
    let Some(mut orders) = self.read::<Vec<Order>>(ORDERS_KEY) else {
      return;
    };

    let mut added = Vec::new();
    for order in fetched {
      match orders.iter_mut().find(|o| o.id == order.id) {
        Some(existing) => *existing = order.clone(),
        None => added.push(order.clone()),
      }
    }
    orders.splice(0..0, added);
    self.write(ORDERS_KEY, &orders);
  }

  // --------------------------------------------------------------------------
  // Pending-action queue
  // --------------------------------------------------------------------------

  /// Append an action to the end of the queue.
  ///
  /// An action whose idempotency key is already queued is ignored.
  pub fn add_pending_action(&self, mut action: PendingAction) {
    action.ensure_key();
    let mut actions = self.get_pending_actions();

    if actions
      .iter()
      .any(|a| a.idempotency_key() == action.idempotency_key())
    {
      debug!(
        key = action.idempotency_key(),
        kind = action.kind(),
        "action already queued"
      );
      return;
    }

    actions.push(action);
    self.write(PENDING_ACTIONS_KEY, &actions);
  }

  /// All queued actions, oldest first.
  pub fn get_pending_actions(&self) -> Vec<PendingAction> {
    let mut actions = self
      .read::<Vec<PendingAction>>(PENDING_ACTIONS_KEY)
      .unwrap_or_default();

    let mut keyed = false;
    for action in &mut actions {
      keyed |= action.ensure_key();
    }
    if keyed {
      self.write(PENDING_ACTIONS_KEY, &actions);
    }

    actions
  }

  /// Drop the whole queue.
  pub fn clear_pending_actions(&self) {
    self.remove_queue();
  }

  fn remove_queue(&self) -> bool {
    match self.storage.remove(PENDING_ACTIONS_KEY) {
      Ok(()) => true,
      Err(e) => {
        self
          .diagnostics
          .record(StorageOp::Write, PENDING_ACTIONS_KEY, &e);
        false
      }
    }
  }

  /// Remove the first queued action with `key`, once it has been applied remotely.
  ///
  /// Returns `true` only if the shortened queue was persisted.
  pub fn acknowledge_pending_action(&self, key: &str) -> bool {
    let mut actions = self.get_pending_actions();
    let Some(index) = actions.iter().position(|a| a.idempotency_key() == key) else {
      return false;
    };

    actions.remove(index);
    if actions.is_empty() {
      self.remove_queue()
    } else {
      self.write(PENDING_ACTIONS_KEY, &actions)
    }
  }

  /// Swap a local order id for the one the backend assigned.
  ///
  /// Queued status changes aimed at `local_id` are re-pointed and the cached
  /// placeholder is replaced by `created`.
  pub fn rebind_order_id(&self, local_id: &str, created: &Order) {
    let mut actions = self.get_pending_actions();
    let mut rebound = 0;
    for action in &mut actions {
      if action.rebind(local_id, &created.id) {
        rebound += 1;
      }
    }
    if rebound > 0 {
      self.write(PENDING_ACTIONS_KEY, &actions);
    }

    if let Some(mut orders) = self.read::<Vec<Order>>(ORDERS_KEY) {
      let mut replaced = false;
      for order in orders.iter_mut().filter(|o| o.id == local_id) {
        // Keep any status the user set locally after creation
        let status = order.status;
        *order = created.clone();
        order.status = status;
        replaced = true;
      }
      if replaced {
        self.write(ORDERS_KEY, &orders);
      }
    }

    info!(local_id, remote_id = %created.id, rebound, "local order id resolved");
  }

  // --------------------------------------------------------------------------
  // Internals
  // --------------------------------------------------------------------------

  /// Read and decode one key. Legacy formats are rewritten in the current one.
  fn read<T: Serialize + DeserializeOwned>(&self, key: &str) -> Option<T> {
    let text = match self.storage.get(key) {
      Ok(Some(text)) => text,
      Ok(None) => return None,
      Err(e) => {
        self.diagnostics.record(StorageOp::Read, key, &e);
        return None;
      }
    };

    match envelope::decode::<T>(&text) {
      Ok(decoded) => {
        if decoded.needs_migration() {
          info!(key, from = decoded.version, "migrating stored data");
          self.write(key, &decoded.data);
        }
        Some(decoded.data)
      }
      Err(e) => {
        self.diagnostics.record(StorageOp::Decode, key, &e);
        None
      }
    }
  }

  /// Encode and write one key. Returns `false` if anything failed.
  fn write<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> bool {
    let text = match envelope::encode(&data) {
      Ok(text) => text,
      Err(e) => {
        self.diagnostics.record(StorageOp::Encode, key, &e);
        return false;
      }
    };

    match self.storage.set(key, &text) {
      Ok(()) => true,
      Err(e) => {
        self.diagnostics.record(StorageOp::Write, key, &e);
        false
      }
    }
  }
}
