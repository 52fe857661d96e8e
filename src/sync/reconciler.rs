//! Keeps the local cache, the pending-action queue and the backend consistent.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use color_eyre::{eyre::eyre, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::action::PendingAction;
use super::network::{NetworkEvent, NetworkObserver};
use crate::cache::{CacheResult, KeyValueStorage, OfflineStore};
use crate::orders::{is_local_id, NewOrder, Order, OrderStatus, StaffRole};
use crate::remote::OrderService;

/// What happened to a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  /// Applied by the backend
  Applied,
  /// Recorded locally for replay
  Queued,
}

/// The action replay stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFailure {
  pub idempotency_key: String,
  pub kind: &'static str,
  pub order_id: String,
  pub error: String,
}

/// Summary of one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
  /// Actions the backend accepted
  pub applied: usize,
  /// Duplicates of actions already applied in this run
  pub skipped: usize,
  /// Status changes for local orders whose creation is gone from the queue
  pub dropped: usize,
  /// Actions still queued afterwards
  pub remaining: usize,
  pub failure: Option<ReplayFailure>,
}

impl ReplayReport {
  pub fn is_complete(&self) -> bool {
    self.failure.is_none() && self.remaining == 0
  }
}

/// Orchestrates reads, writes and replay around an [`OfflineStore`].
pub struct Reconciler<S: KeyValueStorage, R: OrderService> {
  store: OfflineStore<S>,
  remote: R,
  online: AtomicBool,
  replay_lock: Mutex<()>,
}

impl<S: KeyValueStorage, R: OrderService> Reconciler<S, R> {
  /// Create a reconciler that assumes the device starts online.
  pub fn new(store: OfflineStore<S>, remote: R) -> Self {
    Self {
      store,
      remote,
      online: AtomicBool::new(true),
      replay_lock: Mutex::new(()),
    }
  }

  pub fn store(&self) -> &OfflineStore<S> {
    &self.store
  }

  pub fn remote(&self) -> &R {
    &self.remote
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Record connectivity without replaying. Returns the previous state.
  pub fn set_online(&self, online: bool) -> bool {
    self.online.swap(online, Ordering::SeqCst)
  }

  pub fn pending_count(&self) -> usize {
    self.store.get_pending_actions().len()
  }

  // --------------------------------------------------------------------------
  // Read path
  // --------------------------------------------------------------------------

  /// Load orders for display.
  ///
  /// 1. If online, fetch from the backend and refresh the cache
  /// 2. On failure or when offline, serve the cached snapshot, flagged stale if old
  /// 3. With nothing cached, return an empty list flagged offline
  ///
  /// Pending actions are never replayed from here.
  pub async fn load_orders(&self, role: Option<StaffRole>) -> CacheResult<Vec<Order>> {
    if self.is_online() {
      match self.remote.fetch(role).await {
        Ok(orders) => {
          // A role-scoped listing is a slice; it must not replace the full snapshot
          match role.and_then(|r| r.visible_statuses()) {
            None => self.store.cache_orders(&orders),
            Some(_) => self.store.merge_cached_orders(&orders),
          }
          return CacheResult::from_network(orders);
        }
        Err(e) => {
          warn!(error = %e, "order fetch failed, serving cached orders");
        }
      }
    }

    let cached = self.store.get_cached_orders();
    match cached.orders {
      Some(orders) => {
        let orders = orders
          .into_iter()
          .filter(|o| role.map(|r| r.can_see(o.status)).unwrap_or(true))
          .collect();
        CacheResult::from_cache(orders, cached.captured_at, cached.is_stale)
      }
      None => CacheResult::offline(Vec::new()),
    }
  }

  // --------------------------------------------------------------------------
  // Write path
  // --------------------------------------------------------------------------

  /// Change an order's status, remotely when possible and queued otherwise.
  ///
  /// Orders created offline are always queued since the backend does not
  /// know them yet.
  pub async fn change_status(&self, order_id: &str, status: OrderStatus) -> Result<WriteOutcome> {
    if self.is_online() && !is_local_id(order_id) {
      self.remote.update_status(order_id, status, None).await?;
      self.store.update_cached_order_status(order_id, status);
      return Ok(WriteOutcome::Applied);
    }

    self.queue_status_change(order_id, status)?;
    Ok(WriteOutcome::Queued)
  }

  fn queue_status_change(&self, order_id: &str, status: OrderStatus) -> Result<()> {
    if is_local_id(order_id) {
      let creation_queued = self.store.get_pending_actions().iter().any(|a| {
        matches!(a, PendingAction::NewOrder { order, .. } if order.id == order_id)
      });
      if !creation_queued {
        return Err(eyre!(
          "Order {} was never queued for creation; refusing to queue a status change for it",
          order_id
        ));
      }
    }

    let action = PendingAction::status_change(order_id, status, self.store.now());
    debug!(order_id, %status, key = action.idempotency_key(), "queued status change");
    self.store.add_pending_action(action);
    self.store.update_cached_order_status(order_id, status);
    Ok(())
  }

  /// Create an order. Offline, a placeholder with a local id is cached and
  /// the creation is queued.
  pub async fn create_order(&self, request: NewOrder) -> Result<(Order, WriteOutcome)> {
    if self.is_online() {
      let order = self.remote.create(&request, None).await?;
      self.store.upsert_cached_order(&order);
      return Ok((order, WriteOutcome::Applied));
    }

    let now = self.store.now();
    let order = Order::local(&request, now);
    debug!(order_id = %order.id, suite_id = %order.suite_id, "queued new order");
    self
      .store
      .add_pending_action(PendingAction::new_order(order.clone(), now));
    self.store.upsert_cached_order(&order);
    Ok((order, WriteOutcome::Queued))
  }

  // --------------------------------------------------------------------------
  // Replay
  // --------------------------------------------------------------------------

  /// Apply queued actions against the backend, oldest first.
  ///
  /// Each action leaves the queue only once the backend accepted it. Replay
  /// stops at the first failure so later actions never overtake earlier ones.
  pub async fn replay(&self) -> ReplayReport {
    let _guard = self.replay_lock.lock().await;

    let actions = self.store.get_pending_actions();
    let mut report = ReplayReport::default();
    if actions.is_empty() {
      return report;
    }

    info!(count = actions.len(), "replaying pending actions");

    // local id -> id assigned by the backend during this run
    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for action in actions {
      let key = action.idempotency_key().to_string();

      if !seen.insert(key.clone()) {
        if !self.acknowledge(&action, &key, &mut report) {
          break;
        }
        report.skipped += 1;
        continue;
      }

      let result = match &action {
        PendingAction::StatusChange {
          order_id,
          new_status,
          ..
        } => {
          let target = resolved
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| order_id.clone());

          if is_local_id(&target) {
            warn!(order_id, "dropping status change for an order that was never created");
            if !self.acknowledge(&action, &key, &mut report) {
              break;
            }
            report.dropped += 1;
            continue;
          }

          self
            .remote
            .update_status(&target, *new_status, Some(&key))
            .await
        }
        PendingAction::NewOrder { order, .. } => self
          .remote
          .create(&order.to_request(), Some(&key))
          .await
          .map(|created| {
            self.store.rebind_order_id(&order.id, &created);
            resolved.insert(order.id.clone(), created.id);
          }),
      };

      match result {
        Ok(()) => {
          report.applied += 1;
          if !self.acknowledge(&action, &key, &mut report) {
            break;
          }
        }
        Err(e) => {
          warn!(
            kind = action.kind(),
            order_id = action.order_id(),
            error = %e,
            "replay stopped"
          );
          report.failure = Some(ReplayFailure {
            idempotency_key: key,
            kind: action.kind(),
            order_id: action.order_id().to_string(),
            error: e.to_string(),
          });
          break;
        }
      }
    }

    report.remaining = self.store.get_pending_actions().len();
    info!(
      applied = report.applied,
      skipped = report.skipped,
      dropped = report.dropped,
      remaining = report.remaining,
      "replay finished"
    );
    report
  }

  /// Remove a handled action from the queue. On failure the report records
  /// it so replay stops before anything newer is sent.
  fn acknowledge(&self, action: &PendingAction, key: &str, report: &mut ReplayReport) -> bool {
    if self.store.acknowledge_pending_action(key) {
      return true;
    }

    warn!(
      kind = action.kind(),
      order_id = action.order_id(),
      key,
      "could not remove handled action from the queue, replay stopped"
    );
    report.failure = Some(ReplayFailure {
      idempotency_key: key.to_string(),
      kind: action.kind(),
      order_id: action.order_id().to_string(),
      error: "handled but could not be removed from the queue".to_string(),
    });
    false
  }

  // --------------------------------------------------------------------------
  // Connectivity
  // --------------------------------------------------------------------------

  /// React to a connectivity change. Coming back online replays the queue.
  pub async fn handle_network_event(&self, event: NetworkEvent) -> Option<ReplayReport> {
    match event {
      NetworkEvent::Offline => {
        if self.set_online(false) {
          info!("offline: mutations will be queued locally");
        }
        None
      }
      NetworkEvent::Online => {
        if self.set_online(true) {
          return None;
        }
        let pending = self.pending_count();
        info!(pending, "back online");
        if pending == 0 {
          None
        } else {
          Some(self.replay().await)
        }
      }
    }
  }

  /// Follow `observer` until it closes.
  pub async fn run(&self, mut observer: NetworkObserver) {
    while let Some(event) = observer.next().await {
      self.handle_network_event(event).await;
    }
    debug!("network observer closed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, Clock, ManualClock, MemoryStorage, PENDING_ACTIONS_KEY};
  use crate::orders::OrderItem;
  use crate::remote::MockOrderService;
  use chrono::{Duration, TimeZone, Utc};
  use std::sync::Arc;

  /// Memory storage whose next queue write can be made to fail.
  #[derive(Default)]
  struct QueueWriteFailure {
    inner: MemoryStorage,
    fail_next: AtomicBool,
  }

  impl QueueWriteFailure {
    fn fail_next_queue_write(&self) {
      self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<()> {
      if key == PENDING_ACTIONS_KEY && self.fail_next.swap(false, Ordering::SeqCst) {
        return Err(eyre!("disk full"));
      }
      Ok(())
    }
  }

  impl KeyValueStorage for QueueWriteFailure {
    fn get(&self, key: &str) -> Result<Option<String>> {
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
      self.check(key)?;
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
      self.check(key)?;
      self.inner.remove(key)
    }
  }

  type TestReconciler = Reconciler<MemoryStorage, MockOrderService>;

  fn setup(service: MockOrderService) -> (TestReconciler, MockOrderService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
      Utc.with_ymd_and_hms(2024, 9, 14, 18, 0, 0).unwrap(),
    ));
    let store = OfflineStore::new(MemoryStorage::new()).with_clock(clock.clone());
    (Reconciler::new(store, service.clone()), service, clock)
  }

  fn order(id: &str, status: OrderStatus) -> Order {
    Order {
      id: id.to_string(),
      suite_id: "S-7".to_string(),
      items: vec![OrderItem::new("Pizza", 1).unwrap()],
      status,
      created_at: Utc.with_ymd_and_hms(2024, 9, 14, 17, 0, 0).unwrap(),
      delivery_time: None,
      is_pre_order: false,
    }
  }

  fn new_order_request() -> NewOrder {
    NewOrder::new("S-330", vec![OrderItem::new("Tacos", 3).unwrap()], false, None).unwrap()
  }

  fn cached(reconciler: &TestReconciler, id: &str) -> Order {
    reconciler
      .store()
      .get_cached_orders()
      .orders
      .unwrap()
      .into_iter()
      .find(|o| o.id == id)
      .unwrap()
  }

  #[tokio::test]
  async fn test_online_read_caches_orders() {
    let (reconciler, _, _) = setup(MockOrderService::with_sample_data());

    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.len(), 4);
    assert_eq!(reconciler.store().get_cached_orders().orders, Some(result.data));
  }

  #[tokio::test]
  async fn test_failed_fetch_falls_back_to_cache() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;

    service.set_available(false);
    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data.len(), 4);
  }

  #[tokio::test]
  async fn test_offline_read_skips_backend() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;
    reconciler.set_online(false);

    service.create(&new_order_request(), None).await.unwrap();
    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data.len(), 4);
  }

  #[tokio::test]
  async fn test_offline_read_applies_role_filter() {
    let (reconciler, _, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;
    reconciler.set_online(false);

    let result = reconciler.load_orders(Some(StaffRole::Runner)).await;
    assert!(result.data.iter().all(|o| o.status == OrderStatus::Ready));
    assert_eq!(result.data.len(), 1);
  }

  #[tokio::test]
  async fn test_role_read_keeps_full_snapshot() {
    let (reconciler, _, _) = setup(MockOrderService::with_sample_data());
    assert_eq!(reconciler.load_orders(None).await.data.len(), 4);

    let kitchen = reconciler.load_orders(Some(StaffRole::Kitchen)).await;
    assert_eq!(kitchen.source, CacheSource::Network);
    assert_eq!(kitchen.data.len(), 2);

    reconciler.set_online(false);
    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data.len(), 4);

    // Orders outside the kitchen's view still take optimistic updates
    let outcome = reconciler
      .change_status("ORD-3", OrderStatus::Completed)
      .await
      .unwrap();
    assert_eq!(outcome, WriteOutcome::Queued);
    assert_eq!(cached(&reconciler, "ORD-3").status, OrderStatus::Completed);
  }

  #[tokio::test]
  async fn test_manager_read_replaces_snapshot() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;

    service.create(&new_order_request(), None).await.unwrap();
    let result = reconciler.load_orders(Some(StaffRole::Manager)).await;
    assert_eq!(result.data.len(), 5);
    assert_eq!(reconciler.store().get_cached_orders().orders.unwrap().len(), 5);
  }

  #[tokio::test]
  async fn test_stale_cache_is_flagged_not_hidden() {
    let (reconciler, service, clock) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;

    service.set_available(false);
    clock.advance(Duration::hours(25));

    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::CacheStale);
    assert!(result.is_stale());
    assert_eq!(result.data.len(), 4);
  }

  #[tokio::test]
  async fn test_nothing_cached_and_offline_is_empty() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    service.set_available(false);

    let result = reconciler.load_orders(None).await;
    assert_eq!(result.source, CacheSource::Offline);
    assert!(result.data.is_empty());
    assert!(result.is_stale());
  }

  #[tokio::test]
  async fn test_read_does_not_replay() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;
    reconciler.set_online(false);
    reconciler
      .change_status("ORD-1", OrderStatus::Ready)
      .await
      .unwrap();

    reconciler.set_online(true);
    reconciler.load_orders(None).await;

    assert_eq!(reconciler.pending_count(), 1);
    assert!(service.calls().is_empty());
  }

  #[tokio::test]
  async fn test_online_status_change_applies_remotely() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;

    let outcome = reconciler
      .change_status("ORD-2", OrderStatus::Ready)
      .await
      .unwrap();

    assert_eq!(outcome, WriteOutcome::Applied);
    assert_eq!(service.calls(), vec!["update:ORD-2:ready".to_string()]);
    assert_eq!(cached(&reconciler, "ORD-2").status, OrderStatus::Ready);
    assert_eq!(reconciler.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_online_status_change_error_propagates() {
    let (reconciler, _, _) = setup(MockOrderService::new());
    let result = reconciler.change_status("ORD-404", OrderStatus::Ready).await;
    assert!(result.is_err());
    assert_eq!(reconciler.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_offline_status_change_is_queued_and_optimistic() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;
    reconciler.set_online(false);

    let outcome = reconciler
      .change_status("ORD-1", OrderStatus::InProgress)
      .await
      .unwrap();

    assert_eq!(outcome, WriteOutcome::Queued);
    assert_eq!(cached(&reconciler, "ORD-1").status, OrderStatus::InProgress);
    assert!(service.calls().is_empty());

    let actions = reconciler.store().get_pending_actions();
    assert_eq!(actions.len(), 1);
    assert!(matches!(
      &actions[0],
      PendingAction::StatusChange { order_id, new_status: OrderStatus::InProgress, .. } if order_id == "ORD-1"
    ));
  }

  #[tokio::test]
  async fn test_status_change_for_unknown_local_order_rejected() {
    let (reconciler, _, _) = setup(MockOrderService::with_sample_data());
    reconciler.set_online(false);

    let result = reconciler
      .change_status("local-deadbeef", OrderStatus::Ready)
      .await;
    assert!(result.is_err());
    assert_eq!(reconciler.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_online_create() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;

    let (order, outcome) = reconciler.create_order(new_order_request()).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Applied);
    assert_eq!(order.id, "ORD-5");
    assert_eq!(cached(&reconciler, "ORD-5").suite_id, "S-330");
    assert_eq!(service.orders().len(), 5);
  }

  #[tokio::test]
  async fn test_offline_create_then_status_change_replays_in_order() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.load_orders(None).await;
    reconciler.handle_network_event(NetworkEvent::Offline).await;

    let (local, outcome) = reconciler.create_order(new_order_request()).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Queued);
    assert!(local.is_local());
    assert_eq!(cached(&reconciler, &local.id).status, OrderStatus::Pending);

    // Local orders queue even once online
    reconciler.set_online(true);
    let outcome = reconciler
      .change_status(&local.id, OrderStatus::Ready)
      .await
      .unwrap();
    assert_eq!(outcome, WriteOutcome::Queued);
    reconciler.set_online(false);

    let report = reconciler
      .handle_network_event(NetworkEvent::Online)
      .await
      .unwrap();

    assert_eq!(report.applied, 2);
    assert!(report.is_complete());
    assert_eq!(
      service.calls(),
      vec!["create:ORD-5".to_string(), "update:ORD-5:ready".to_string()]
    );
    assert_eq!(cached(&reconciler, "ORD-5").status, OrderStatus::Ready);
    assert_eq!(reconciler.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_partial_replay_keeps_unapplied_actions() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    reconciler.set_online(false);
    reconciler.change_status("ORD-1", OrderStatus::Ready).await.unwrap();
    reconciler.change_status("ORD-2", OrderStatus::Ready).await.unwrap();
    reconciler.change_status("ORD-3", OrderStatus::Completed).await.unwrap();

    service.fail_updates_for("ORD-2");
    let report = reconciler.replay().await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.remaining, 2);
    let failure = report.failure.unwrap();
    assert_eq!(failure.order_id, "ORD-2");
    assert_eq!(failure.kind, "status_change");

    let remaining: Vec<String> = reconciler
      .store()
      .get_pending_actions()
      .iter()
      .map(|a| a.order_id().to_string())
      .collect();
    assert_eq!(remaining, vec!["ORD-2".to_string(), "ORD-3".to_string()]);

    service.clear_failures();
    let report = reconciler.replay().await;
    assert_eq!(report.applied, 2);
    assert!(report.is_complete());
    assert_eq!(
      service.calls(),
      vec![
        "update:ORD-1:ready".to_string(),
        "update:ORD-2:ready".to_string(),
        "update:ORD-3:completed".to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn test_replay_stops_when_queue_write_fails() {
    let service = MockOrderService::with_sample_data();
    let store = OfflineStore::new(QueueWriteFailure::default());
    let reconciler = Reconciler::new(store, service.clone());
    reconciler.set_online(false);
    reconciler.change_status("ORD-1", OrderStatus::Ready).await.unwrap();
    reconciler
      .change_status("ORD-1", OrderStatus::Completed)
      .await
      .unwrap();

    reconciler.store().storage().fail_next_queue_write();
    let report = reconciler.replay().await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.remaining, 2);
    let failure = report.failure.unwrap();
    assert_eq!(failure.order_id, "ORD-1");
    assert_eq!(failure.kind, "status_change");
    assert_eq!(service.calls(), vec!["update:ORD-1:ready".to_string()]);

    // Nothing newer was sent, so the next run keeps the original order
    let report = reconciler.replay().await;
    assert!(report.is_complete());
    assert_eq!(reconciler.pending_count(), 0);
    let remote = service.orders().into_iter().find(|o| o.id == "ORD-1").unwrap();
    assert_eq!(remote.status, OrderStatus::Completed);
  }

  #[tokio::test]
  async fn test_replay_skips_duplicate_entries() {
    let (reconciler, service, clock) = setup(MockOrderService::with_sample_data());
    let action = PendingAction::status_change("ORD-1", OrderStatus::Ready, clock.now());
    let raw = serde_json::to_string(&vec![action.clone(), action]).unwrap();
    reconciler.store().storage().set(PENDING_ACTIONS_KEY, &raw).unwrap();

    let report = reconciler.replay().await;
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(service.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_orphaned_local_status_change_is_dropped() {
    let (reconciler, service, clock) = setup(MockOrderService::with_sample_data());
    let orphan = PendingAction::status_change("local-0000", OrderStatus::Ready, clock.now());
    let raw = serde_json::to_string(&vec![orphan]).unwrap();
    reconciler.store().storage().set(PENDING_ACTIONS_KEY, &raw).unwrap();

    let report = reconciler.replay().await;
    assert_eq!(report.dropped, 1);
    assert_eq!(report.remaining, 0);
    assert!(service.calls().is_empty());
  }

  #[tokio::test]
  async fn test_online_event_without_transition_does_nothing() {
    let (reconciler, _, _) = setup(MockOrderService::with_sample_data());
    assert!(reconciler
      .handle_network_event(NetworkEvent::Online)
      .await
      .is_none());
  }

  #[tokio::test]
  async fn test_offline_mark_ready_then_reconnect() {
    let service = MockOrderService::with_orders(vec![order("ORD-7", OrderStatus::Pending)]);
    let (reconciler, service, _) = setup(service);
    reconciler.load_orders(None).await;

    reconciler.handle_network_event(NetworkEvent::Offline).await;
    reconciler.change_status("ORD-7", OrderStatus::Ready).await.unwrap();

    let value = serde_json::to_value(&reconciler.store().get_pending_actions()[0]).unwrap();
    assert_eq!(value["type"], "status_change");
    assert_eq!(value["orderId"], "ORD-7");
    assert_eq!(value["newStatus"], "ready");
    assert_eq!(cached(&reconciler, "ORD-7").status, OrderStatus::Ready);
    assert_eq!(service.orders()[0].status, OrderStatus::Pending);

    let report = reconciler
      .handle_network_event(NetworkEvent::Online)
      .await
      .unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(reconciler.pending_count(), 0);

    let remote = reconciler.load_orders(None).await;
    assert_eq!(remote.source, CacheSource::Network);
    assert_eq!(remote.data[0].status, OrderStatus::Ready);
    assert_eq!(cached(&reconciler, "ORD-7").status, OrderStatus::Ready);
  }

  #[tokio::test]
  async fn test_run_follows_observer() {
    let (reconciler, service, _) = setup(MockOrderService::with_sample_data());
    let reconciler = Arc::new(reconciler);
    let (observer, signal) = NetworkObserver::manual();

    reconciler.set_online(false);
    reconciler.change_status("ORD-1", OrderStatus::Ready).await.unwrap();

    let runner = {
      let reconciler = Arc::clone(&reconciler);
      tokio::spawn(async move { reconciler.run(observer).await })
    };

    signal.online();
    drop(signal);
    runner.await.unwrap();

    assert!(reconciler.is_online());
    assert_eq!(reconciler.pending_count(), 0);
    assert_eq!(service.calls(), vec!["update:ORD-1:ready".to_string()]);
  }
}
