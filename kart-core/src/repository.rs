use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::models::{LineItem, NewOrder, Order, OrderStatus, Shipment};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),
    #[error("Duplicate idempotency key: {0}")]
    DuplicateKey(String),
    #[error("Datastore error: {0}")]
    Database(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository trait for order data access. Every call carries the caller's
/// auth context so the datastore can apply row-level authorization.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Idempotency keys are scoped to the customer that sent them.
    async fn find_by_idempotency_key(
        &self,
        auth: &AuthContext,
        customer_id: &str,
        key: &str,
    ) -> RepositoryResult<Option<Order>>;

    /// Fails with `DuplicateKey` when the customer already has an order
    /// under the key.
    async fn insert_order(&self, auth: &AuthContext, order: &NewOrder) -> RepositoryResult<Order>;

    async fn insert_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        items: &[LineItem],
    ) -> RepositoryResult<()>;

    /// Loads the order together with its shipments.
    async fn get_order(&self, auth: &AuthContext, id: Uuid) -> RepositoryResult<Option<Order>>;

    /// Line items in cart order.
    async fn list_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<Vec<LineItem>>;

    async fn set_gateway_order_id(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        gateway_order_id: &str,
    ) -> RepositoryResult<()>;

    /// Flips payment_status to paid and records the provider's payment id.
    async fn mark_paid(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        payment_id: &str,
    ) -> RepositoryResult<()>;

    /// Atomically reserve the order for shipment booking. Returns false when
    /// another request holds the claim or a shipment is already recorded.
    async fn claim_shipment(&self, auth: &AuthContext, order_id: Uuid) -> RepositoryResult<bool>;

    /// Give the claim back after booking failed before anything was created.
    async fn release_shipment_claim(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<()>;

    async fn record_shipment(
        &self,
        auth: &AuthContext,
        shipment: &Shipment,
    ) -> RepositoryResult<()>;

    async fn update_status(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        status: OrderStatus,
    ) -> RepositoryResult<()>;
}
