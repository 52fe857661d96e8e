//! Remote order service: the hosted backend and a mock stand-in.
//!
//! The rest of the crate only talks to [`OrderService`]. [`OrderBackend`]
//! picks the real or mock implementation at startup.

pub mod api_types;
mod mock;
mod rest;

use color_eyre::Result;
use std::future::Future;

use crate::orders::{NewOrder, Order, OrderStatus, StaffRole};

pub use mock::MockOrderService;
pub use rest::RestOrderService;

/// Operations the cache consumes from the backend.
///
/// Every method fails when the backend cannot be reached or rejects the
/// request. Mutations take the idempotency key of the pending action they
/// replay, if any, so the backend can drop repeats.
pub trait OrderService: Send + Sync {
  /// List orders, narrowed to what `role` works on.
  fn fetch(&self, role: Option<StaffRole>) -> impl Future<Output = Result<Vec<Order>>> + Send;

  fn update_status(
    &self,
    order_id: &str,
    status: OrderStatus,
    idempotency_key: Option<&str>,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Create an order; the backend assigns its id.
  fn create(
    &self,
    request: &NewOrder,
    idempotency_key: Option<&str>,
  ) -> impl Future<Output = Result<Order>> + Send;

  /// Cheap reachability check.
  fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Real or mock backend, chosen by configuration.
#[derive(Clone)]
pub enum OrderBackend {
  Rest(RestOrderService),
  Mock(MockOrderService),
}

impl OrderBackend {
  pub fn name(&self) -> &'static str {
    match self {
      OrderBackend::Rest(_) => "rest",
      OrderBackend::Mock(_) => "mock",
    }
  }
}

impl OrderService for OrderBackend {
  async fn fetch(&self, role: Option<StaffRole>) -> Result<Vec<Order>> {
    match self {
      OrderBackend::Rest(service) => service.fetch(role).await,
      OrderBackend::Mock(service) => service.fetch(role).await,
    }
  }

  async fn update_status(
    &self,
    order_id: &str,
    status: OrderStatus,
    idempotency_key: Option<&str>,
  ) -> Result<()> {
    match self {
      OrderBackend::Rest(service) => service.update_status(order_id, status, idempotency_key).await,
      OrderBackend::Mock(service) => service.update_status(order_id, status, idempotency_key).await,
    }
  }

  async fn create(&self, request: &NewOrder, idempotency_key: Option<&str>) -> Result<Order> {
    match self {
      OrderBackend::Rest(service) => service.create(request, idempotency_key).await,
      OrderBackend::Mock(service) => service.create(request, idempotency_key).await,
    }
  }

  async fn ping(&self) -> Result<()> {
    match self {
      OrderBackend::Rest(service) => service.ping().await,
      OrderBackend::Mock(service) => service.ping().await,
    }
  }
}
