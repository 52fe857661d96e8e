use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::OrderService;
use crate::orders::{NewOrder, Order, OrderItem, OrderStatus, StaffRole};

/// In-memory backend used for demos and tests.
///
/// Honors idempotency keys: a repeated create returns the first result and a
/// repeated status update is acknowledged without being applied again.
#[derive(Clone, Default)]
pub struct MockOrderService {
  state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
  orders: Vec<Order>,
  unavailable: bool,
  next_id: u64,
  created_by_key: HashMap<String, Order>,
  applied_keys: HashSet<String>,
  failing_orders: HashSet<String>,
  calls: Vec<String>,
}

impl MockOrderService {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_orders(orders: Vec<Order>) -> Self {
    let service = Self::new();
    {
      let mut state = service.lock();
      state.next_id = orders.len() as u64;
      state.orders = orders;
    }
    service
  }

  /// A few game-day and pre-event orders across suites.
  pub fn with_sample_data() -> Self {
    let now = Utc::now();
    let sample = [
      ("ORD-1", "S-101", &[("Nachos", 2), ("Lemonade", 4)][..], OrderStatus::Pending, false),
      ("ORD-2", "S-104", &[("Wings", 3)][..], OrderStatus::InProgress, false),
      ("ORD-3", "S-110", &[("Fruit Tray", 1), ("Sparkling Water", 6)][..], OrderStatus::Ready, true),
      ("ORD-4", "S-212", &[("Sliders", 12)][..], OrderStatus::Completed, true),
    ];

    let orders = sample
      .iter()
      .enumerate()
      .filter_map(|(i, (id, suite, items, status, pre_order))| {
        let items = items
          .iter()
          .map(|(name, qty)| OrderItem::new(*name, *qty))
          .collect::<Result<Vec<_>>>()
          .ok()?;
        Some(Order {
          id: id.to_string(),
          suite_id: suite.to_string(),
          items,
          status: *status,
          created_at: now - Duration::minutes(90 - 15 * i as i64),
          delivery_time: pre_order.then(|| now + Duration::minutes(30)),
          is_pre_order: *pre_order,
        })
      })
      .collect();

    Self::with_orders(orders)
  }

  /// Simulate the backend going down or coming back.
  pub fn set_available(&self, available: bool) {
    self.lock().unavailable = !available;
  }

  pub fn is_available(&self) -> bool {
    !self.lock().unavailable
  }

  /// Make status updates for `order_id` fail until cleared.
  pub fn fail_updates_for(&self, order_id: &str) {
    self.lock().failing_orders.insert(order_id.to_string());
  }

  pub fn clear_failures(&self) {
    self.lock().failing_orders.clear();
  }

  /// Current backend contents.
  pub fn orders(&self) -> Vec<Order> {
    self.lock().orders.clone()
  }

  /// Mutations applied so far, in order (`create:<id>`, `update:<id>:<status>`).
  pub fn calls(&self) -> Vec<String> {
    self.lock().calls.clone()
  }

  fn lock(&self) -> MutexGuard<'_, MockState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl MockState {
  fn ensure_available(&self) -> Result<()> {
    if self.unavailable {
      Err(eyre!("Backend unreachable (mock offline)"))
    } else {
      Ok(())
    }
  }
}

impl OrderService for MockOrderService {
  async fn fetch(&self, role: Option<StaffRole>) -> Result<Vec<Order>> {
    let state = self.lock();
    state.ensure_available()?;
    Ok(
      state
        .orders
        .iter()
        .filter(|o| role.map(|r| r.can_see(o.status)).unwrap_or(true))
        .cloned()
        .collect(),
    )
  }

  async fn update_status(
    &self,
    order_id: &str,
    status: OrderStatus,
    idempotency_key: Option<&str>,
  ) -> Result<()> {
    let mut state = self.lock();
    state.ensure_available()?;

    if let Some(key) = idempotency_key {
      if state.applied_keys.contains(key) {
        return Ok(());
      }
    }
    if state.failing_orders.contains(order_id) {
      return Err(eyre!("Update rejected for order {}", order_id));
    }

    let order = state
      .orders
      .iter_mut()
      .find(|o| o.id == order_id)
      .ok_or_else(|| eyre!("Order {} not found", order_id))?;
    order.status = status;

    state.calls.push(format!("update:{}:{}", order_id, status));
    if let Some(key) = idempotency_key {
      state.applied_keys.insert(key.to_string());
    }
    Ok(())
  }

  async fn create(&self, request: &NewOrder, idempotency_key: Option<&str>) -> Result<Order> {
    let mut state = self.lock();
    state.ensure_available()?;

    if let Some(existing) = idempotency_key.and_then(|k| state.created_by_key.get(k)) {
      return Ok(existing.clone());
    }

    state.next_id += 1;
    let order = Order {
      id: format!("ORD-{}", state.next_id),
      suite_id: request.suite_id.clone(),
      items: request.items.clone(),
      status: OrderStatus::Pending,
      created_at: Utc::now(),
      delivery_time: request.delivery_time,
      is_pre_order: request.is_pre_order,
    };

    state.orders.push(order.clone());
    state.calls.push(format!("create:{}", order.id));
    if let Some(key) = idempotency_key {
      state.created_by_key.insert(key.to_string(), order.clone());
    }
    Ok(order)
  }

  async fn ping(&self) -> Result<()> {
    self.lock().ensure_available()
  }
}
