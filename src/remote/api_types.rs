//! Serde types matching rows of the hosted `orders` table.
//!
//! These types are separate from domain types so the backend's snake_case
//! columns and loose typing stay out of the rest of the crate.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::orders::{NewOrder, Order, OrderItem, OrderStatus};

// ============================================================================
// Rows returned by the backend
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiOrderItem {
  pub name: String,
  pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiOrder {
  pub id: serde_json::Value,
  pub suite_id: serde_json::Value,
  #[serde(default)]
  pub items: Vec<ApiOrderItem>,
  pub status: String,
  pub created_at: DateTime<Utc>,
  pub delivery_time: Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_pre_order: bool,
}

impl ApiOrder {
  pub fn into_order(self) -> Result<Order> {
    let id = id_to_string(&self.id).ok_or_else(|| eyre!("Order row without id"))?;
    let suite_id =
      id_to_string(&self.suite_id).ok_or_else(|| eyre!("Order {} has no suite id", id))?;
    let status: OrderStatus = self.status.parse()?;
    let items = self
      .items
      .into_iter()
      .map(|item| OrderItem::new(item.name, item.quantity))
      .collect::<Result<Vec<_>>>()
      .map_err(|e| eyre!("Order {} has an invalid item: {}", id, e))?;

    Ok(Order {
      id,
      suite_id,
      items,
      status,
      created_at: self.created_at,
      delivery_time: self.delivery_time,
      is_pre_order: self.is_pre_order,
    })
  }
}

/// Ids come back as numbers or uuids depending on the table definition.
fn id_to_string(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiOrderInsert {
  pub suite_id: String,
  pub items: Vec<ApiOrderItem>,
  pub status: OrderStatus,
  pub is_pre_order: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delivery_time: Option<DateTime<Utc>>,
}

impl From<&NewOrder> for ApiOrderInsert {
  fn from(request: &NewOrder) -> Self {
    Self {
      suite_id: request.suite_id.clone(),
      items: request
        .items
        .iter()
        .map(|item| ApiOrderItem {
          name: item.name.clone(),
          quantity: item.quantity.get(),
        })
        .collect(),
      status: OrderStatus::Pending,
      is_pre_order: request.is_pre_order,
      delivery_time: request.delivery_time,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiStatusPatch {
  pub status: OrderStatus,
}

/// PostgREST filter value for a set of statuses, e.g. `in.(pending,ready)`.
pub fn status_filter(statuses: &[OrderStatus]) -> String {
  let list: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
  format!("in.({})", list.join(","))
}
