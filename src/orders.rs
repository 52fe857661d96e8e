//! Order domain types shared by the cache, the remote service and the CLI.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Prefix of ids handed out to orders created while offline.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
  Pending,
  InProgress,
  Ready,
  Completed,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::InProgress,
    OrderStatus::Ready,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::InProgress => "in-progress",
      OrderStatus::Ready => "ready",
      OrderStatus::Completed => "completed",
      OrderStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    let normalized = s.trim().to_lowercase().replace('_', "-");
    OrderStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == normalized)
      .ok_or_else(|| eyre!("Unknown order status: {}", s))
  }
}

/// One line of a food/beverage order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
  pub name: String,
  pub quantity: NonZeroU32,
}

impl OrderItem {
  pub fn new(name: impl Into<String>, quantity: u32) -> Result<Self> {
    let name = name.into();
    let quantity = NonZeroU32::new(quantity)
      .ok_or_else(|| eyre!("Quantity for '{}' must be at least 1", name))?;
    Ok(Self { name, quantity })
  }
}

impl FromStr for OrderItem {
  type Err = color_eyre::Report;

  /// Parse `name:quantity` (quantity defaults to 1 when omitted).
  fn from_str(s: &str) -> Result<Self> {
    match s.rsplit_once(':') {
      Some((name, qty)) if !name.trim().is_empty() => {
        let qty: u32 = qty
          .trim()
          .parse()
          .map_err(|e| eyre!("Invalid quantity in '{}': {}", s, e))?;
        Self::new(name.trim(), qty)
      }
      Some(_) => Err(eyre!("Missing item name in '{}'", s)),
      None if !s.trim().is_empty() => Self::new(s.trim(), 1),
      None => Err(eyre!("Empty order item")),
    }
  }
}

/// A suite's food/beverage request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: String,
  pub suite_id: String,
  pub items: Vec<OrderItem>,
  pub status: OrderStatus,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub delivery_time: Option<DateTime<Utc>>,
  pub is_pre_order: bool,
}

impl Order {
  /// Build the placeholder order shown locally until the backend assigns an id.
  pub fn local(request: &NewOrder, created_at: DateTime<Utc>) -> Self {
    Self {
      id: local_id(request, created_at),
      suite_id: request.suite_id.clone(),
      items: request.items.clone(),
      status: OrderStatus::Pending,
      created_at,
      delivery_time: request.delivery_time,
      is_pre_order: request.is_pre_order,
    }
  }

  pub fn is_local(&self) -> bool {
    is_local_id(&self.id)
  }

  /// The creation request that would produce this order remotely.
  pub fn to_request(&self) -> NewOrder {
    NewOrder {
      suite_id: self.suite_id.clone(),
      items: self.items.clone(),
      is_pre_order: self.is_pre_order,
      delivery_time: self.delivery_time,
    }
  }
}

/// Request to create an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
  pub suite_id: String,
  pub items: Vec<OrderItem>,
  pub is_pre_order: bool,
  pub delivery_time: Option<DateTime<Utc>>,
}

impl NewOrder {
  pub fn new(
    suite_id: impl Into<String>,
    items: Vec<OrderItem>,
    is_pre_order: bool,
    delivery_time: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    let suite_id = suite_id.into();
    if suite_id.trim().is_empty() {
      return Err(eyre!("Suite id must not be empty"));
    }
    if items.is_empty() {
      return Err(eyre!("An order needs at least one item"));
    }
    Ok(Self {
      suite_id,
      items,
      is_pre_order,
      delivery_time,
    })
  }
}

/// Staff role used to narrow the order list to what that role works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
  Attendant,
  Kitchen,
  Runner,
  Manager,
}

impl StaffRole {
  /// Statuses visible to this role, `None` meaning all of them.
  pub fn visible_statuses(&self) -> Option<&'static [OrderStatus]> {
    match self {
      StaffRole::Kitchen => Some(&[OrderStatus::Pending, OrderStatus::InProgress]),
      StaffRole::Runner => Some(&[OrderStatus::Ready]),
      StaffRole::Attendant | StaffRole::Manager => None,
    }
  }

  pub fn can_see(&self, status: OrderStatus) -> bool {
    self
      .visible_statuses()
      .map(|statuses| statuses.contains(&status))
      .unwrap_or(true)
  }
}

pub fn is_local_id(id: &str) -> bool {
  id.starts_with(LOCAL_ID_PREFIX)
}

fn local_id(request: &NewOrder, created_at: DateTime<Utc>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.suite_id.as_bytes());
  for item in &request.items {
    hasher.update(item.name.as_bytes());
    hasher.update(item.quantity.get().to_be_bytes());
  }
  hasher.update(created_at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{}{}", LOCAL_ID_PREFIX, &digest[..12])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_serializes_kebab_case() {
    let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
    assert_eq!(json, "\"in-progress\"");
  }

  #[test]
  fn test_status_parse_accepts_variants() {
    assert_eq!("ready".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
    assert_eq!(
      "IN_PROGRESS".parse::<OrderStatus>().unwrap(),
      OrderStatus::InProgress
    );
    assert!("delivered".parse::<OrderStatus>().is_err());
  }

  #[test]
  fn test_zero_quantity_rejected() {
    assert!(OrderItem::new("Nachos", 0).is_err());
    let err = serde_json::from_str::<OrderItem>(r#"{"name":"Nachos","quantity":0}"#);
    assert!(err.is_err());
  }

  #[test]
  fn test_item_parse() {
    let item: OrderItem = "Hot Dog:3".parse().unwrap();
    assert_eq!(item.name, "Hot Dog");
    assert_eq!(item.quantity.get(), 3);

    let single: OrderItem = "Pretzel".parse().unwrap();
    assert_eq!(single.quantity.get(), 1);

    assert!(":2".parse::<OrderItem>().is_err());
    assert!("Beer:x".parse::<OrderItem>().is_err());
  }

  #[test]
  fn test_order_uses_camel_case_fields() {
    let order = Order {
      id: "ORD-1".to_string(),
      suite_id: "S-101".to_string(),
      items: vec![OrderItem::new("Water", 2).unwrap()],
      status: OrderStatus::Pending,
      created_at: Utc::now(),
      delivery_time: None,
      is_pre_order: true,
    };
    let value = serde_json::to_value(&order).unwrap();
    assert_eq!(value["suiteId"], "S-101");
    assert_eq!(value["isPreOrder"], true);
    assert!(value.get("deliveryTime").is_none());
  }

  #[test]
  fn test_new_order_validation() {
    assert!(NewOrder::new("S-1", vec![], false, None).is_err());
    assert!(NewOrder::new(" ", vec![OrderItem::new("Fries", 1).unwrap()], false, None).is_err());
  }

  #[test]
  fn test_local_order_gets_local_id() {
    let request = NewOrder::new("S-4", vec![OrderItem::new("Fries", 1).unwrap()], false, None).unwrap();
    let order = Order::local(&request, Utc::now());
    assert!(order.is_local());
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.to_request(), request);
  }

  #[test]
  fn test_role_visibility() {
    assert!(StaffRole::Kitchen.can_see(OrderStatus::Pending));
    assert!(!StaffRole::Kitchen.can_see(OrderStatus::Ready));
    assert!(StaffRole::Runner.can_see(OrderStatus::Ready));
    assert!(StaffRole::Manager.can_see(OrderStatus::Cancelled));
  }
}
