use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{status_filter, ApiOrder, ApiOrderInsert, ApiStatusPatch};
use super::OrderService;
use crate::config::{BackendConfig, Config};
use crate::orders::{NewOrder, Order, OrderStatus, StaffRole};

/// Hosted backend client speaking the PostgREST dialect.
#[derive(Clone)]
pub struct RestOrderService {
  client: reqwest::Client,
  endpoint: Url,
  api_key: String,
  client_key_column: Option<String>,
}

impl RestOrderService {
  pub fn new(config: &Config) -> Result<Self> {
    let backend = config
      .backend
      .as_ref()
      .ok_or_else(|| eyre!("No backend configured"))?;
    let api_key = Config::get_api_key()?;
    let timeout = Duration::from_secs(config.network.request_timeout_secs);
    Self::with_key(backend, api_key, timeout)
  }

  pub fn with_key(backend: &BackendConfig, api_key: String, timeout: Duration) -> Result<Self> {
    let endpoint = Self::endpoint(backend)?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      endpoint,
      api_key,
      client_key_column: backend.client_key_column.clone(),
    })
  }

  fn endpoint(backend: &BackendConfig) -> Result<Url> {
    let mut base = backend.url.trim_end_matches('/').to_string();
    base.push('/');
    Url::parse(&base)
      .and_then(|url| url.join(&format!("rest/v1/{}", backend.table)))
      .map_err(|e| eyre!("Invalid backend url {}: {}", backend.url, e))
  }

  fn request(&self, method: Method, idempotency_key: Option<&str>) -> RequestBuilder {
    let builder = self
      .client
      .request(method, self.endpoint.clone())
      .header("apikey", &self.api_key)
      .bearer_auth(&self.api_key);

    match idempotency_key {
      Some(key) => builder.header("Idempotency-Key", key),
      None => builder,
    }
  }

  /// Insert body, tagged with the idempotency key when a key column is configured.
  fn insert_body(
    &self,
    request: &NewOrder,
    idempotency_key: Option<&str>,
  ) -> Result<serde_json::Value> {
    let mut body = serde_json::to_value(ApiOrderInsert::from(request))
      .map_err(|e| eyre!("Failed to encode order: {}", e))?;

    if let (Some(column), Some(key), Some(fields)) = (
      &self.client_key_column,
      idempotency_key,
      body.as_object_mut(),
    ) {
      fields.insert(column.clone(), serde_json::Value::String(key.to_string()));
    }
    Ok(body)
  }

  async fn find_by_client_key(&self, column: &str, key: &str) -> Result<ApiOrder> {
    let rows: Vec<ApiOrder> = self
      .request(Method::GET, None)
      .query(&[(column, format!("eq.{}", key))])
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to look up order for key {}: {}", key, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse order: {}", e))?;

    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("No order found for idempotency key {}", key))
  }
}

impl OrderService for RestOrderService {
  async fn fetch(&self, role: Option<StaffRole>) -> Result<Vec<Order>> {
    let mut query = vec![
      ("select", "*".to_string()),
      ("order", "created_at.desc".to_string()),
    ];
    if let Some(statuses) = role.and_then(|r| r.visible_statuses()) {
      query.push(("status", status_filter(statuses)));
    }

    let rows: Vec<ApiOrder> = self
      .request(Method::GET, None)
      .query(&query)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to fetch orders: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse orders: {}", e))?;

    debug!(count = rows.len(), "fetched orders");
    rows.into_iter().map(ApiOrder::into_order).collect()
  }

  async fn update_status(
    &self,
    order_id: &str,
    status: OrderStatus,
    idempotency_key: Option<&str>,
  ) -> Result<()> {
    self
      .request(Method::PATCH, idempotency_key)
      .query(&[("id", format!("eq.{}", order_id))])
      .header("Prefer", "return=minimal")
      .json(&ApiStatusPatch { status })
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to update order {}: {}", order_id, e))?;

    Ok(())
  }

  async fn create(&self, request: &NewOrder, idempotency_key: Option<&str>) -> Result<Order> {
    let body = self.insert_body(request, idempotency_key)?;
    let dedup = self.client_key_column.as_deref().zip(idempotency_key);

    let builder = match dedup {
      Some((column, _)) => self
        .request(Method::POST, idempotency_key)
        .query(&[("on_conflict", column)])
        .header("Prefer", "resolution=ignore-duplicates,return=representation"),
      None => self
        .request(Method::POST, idempotency_key)
        .header("Prefer", "return=representation"),
    };

    let rows: Vec<ApiOrder> = builder
      .json(&body)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to create order for suite {}: {}", request.suite_id, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse created order: {}", e))?;

    let row = match (rows.into_iter().next(), dedup) {
      (Some(row), _) => row,
      // Duplicate ignored: an earlier attempt already inserted the order
      (None, Some((column, key))) => {
        debug!(key, "create already applied, loading existing row");
        self.find_by_client_key(column, key).await?
      }
      (None, None) => return Err(eyre!("Backend returned no row for the created order")),
    };
    row.into_order()
  }

  async fn ping(&self) -> Result<()> {
    self
      .request(Method::GET, None)
      .query(&[("select", "id"), ("limit", "1")])
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Backend unreachable: {}", e))?;

    Ok(())
  }
}
