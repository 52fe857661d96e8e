//! Deferred mutations recorded while the remote service is unreachable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::orders::{Order, OrderStatus};

/// A mutation waiting to be replayed against the remote service.
///
/// Every action carries an idempotency key derived from what it does and
/// when it was requested, so re-queuing or re-sending the same action can
/// be recognized as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
  #[serde(rename_all = "camelCase")]
  StatusChange {
    order_id: String,
    new_status: OrderStatus,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    idempotency_key: String,
  },
  #[serde(rename_all = "camelCase")]
  NewOrder {
    order: Order,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    idempotency_key: String,
  },
}

impl PendingAction {
  pub fn status_change(
    order_id: impl Into<String>,
    new_status: OrderStatus,
    timestamp: DateTime<Utc>,
  ) -> Self {
    let mut action = PendingAction::StatusChange {
      order_id: order_id.into(),
      new_status,
      timestamp,
      idempotency_key: String::new(),
    };
    action.ensure_key();
    action
  }

  pub fn new_order(order: Order, timestamp: DateTime<Utc>) -> Self {
    let mut action = PendingAction::NewOrder {
      order,
      timestamp,
      idempotency_key: String::new(),
    };
    action.ensure_key();
    action
  }

  pub fn kind(&self) -> &'static str {
    match self {
      PendingAction::StatusChange { .. } => "status_change",
      PendingAction::NewOrder { .. } => "new_order",
    }
  }

  /// Id of the order this action touches.
  pub fn order_id(&self) -> &str {
    match self {
      PendingAction::StatusChange { order_id, .. } => order_id,
      PendingAction::NewOrder { order, .. } => &order.id,
    }
  }

  pub fn timestamp(&self) -> DateTime<Utc> {
    match self {
      PendingAction::StatusChange { timestamp, .. } | PendingAction::NewOrder { timestamp, .. } => {
        *timestamp
      }
    }
  }

  pub fn idempotency_key(&self) -> &str {
    match self {
      PendingAction::StatusChange {
        idempotency_key, ..
      }
      | PendingAction::NewOrder {
        idempotency_key, ..
      } => idempotency_key,
    }
  }

  /// Fill in the idempotency key if it is missing (actions queued before keys existed).
  ///
  /// Returns `true` when a key was added.
  pub fn ensure_key(&mut self) -> bool {
    if !self.idempotency_key().is_empty() {
      return false;
    }
    let key = self.compute_key();
    match self {
      PendingAction::StatusChange {
        idempotency_key, ..
      }
      | PendingAction::NewOrder {
        idempotency_key, ..
      } => *idempotency_key = key,
    }
    true
  }

  /// Point a status change at the id the backend assigned to a locally created order.
  ///
  /// The idempotency key is left untouched. Returns `true` if the action changed.
  pub fn rebind(&mut self, local_id: &str, remote_id: &str) -> bool {
    match self {
      PendingAction::StatusChange { order_id, .. } if order_id == local_id => {
        *order_id = remote_id.to_string();
        true
      }
      _ => false,
    }
  }

  fn compute_key(&self) -> String {
    let identity = match self {
      PendingAction::StatusChange {
        order_id,
        new_status,
        timestamp,
        ..
      } => format!(
        "status_change:{}:{}:{}",
        order_id,
        new_status,
        timestamp.timestamp_millis()
      ),
      PendingAction::NewOrder {
        order, timestamp, ..
      } => format!(
        "new_order:{}:{}:{}",
        order.id,
        order.suite_id,
        timestamp.timestamp_millis()
      ),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
  }
}
