use async_trait::async_trait;
use chrono::Utc;
use kart_core::models::{LineItem, NewOrder, Order, OrderStatus, PaymentStatus, Shipment};
use kart_core::repository::{OrderRepository, RepositoryError, RepositoryResult};
use kart_core::AuthContext;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    line_items: HashMap<Uuid, Vec<LineItem>>,
    shipments: HashMap<Uuid, Vec<Shipment>>,
    shipping_claims: HashSet<Uuid>,
}

/// Process-local order store for tests and local development without Postgres.
/// Ignores the auth context.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    tables: RwLock<Tables>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

impl Tables {
    fn hydrate(&self, order: &Order) -> Order {
        let mut order = order.clone();
        order.shipments = self.shipments.get(&order.id).cloned().unwrap_or_default();
        order
    }

    fn order_mut(&mut self, id: Uuid) -> RepositoryResult<&mut Order> {
        let order = self.orders.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        order.updated_at = Utc::now();
        Ok(order)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_idempotency_key(
        &self,
        _auth: &AuthContext,
        customer_id: &str,
        key: &str,
    ) -> RepositoryResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.customer_id == customer_id && o.idempotency_key == key)
            .map(|o| tables.hydrate(o)))
    }

    async fn insert_order(&self, _auth: &AuthContext, order: &NewOrder) -> RepositoryResult<Order> {
        let mut tables = self.tables.write().await;
        let taken = tables.orders.values().any(|o| {
            o.customer_id == order.customer_id && o.idempotency_key == order.idempotency_key
        });
        if taken {
            return Err(RepositoryError::DuplicateKey(order.idempotency_key.clone()));
        }
        let created = Order::from_new(order);
        tables.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_line_items(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
        items: &[LineItem],
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&order_id) {
            return Err(RepositoryError::NotFound(order_id));
        }
        tables.line_items.entry(order_id).or_default().extend_from_slice(items);
        Ok(())
    }

    async fn get_order(&self, _auth: &AuthContext, id: Uuid) -> RepositoryResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).map(|o| tables.hydrate(o)))
    }

    async fn list_line_items(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<Vec<LineItem>> {
        let tables = self.tables.read().await;
        let mut items = tables.line_items.get(&order_id).cloned().unwrap_or_default();
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    async fn set_gateway_order_id(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
        gateway_order_id: &str,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        tables.order_mut(order_id)?.gateway_order_id = Some(gateway_order_id.to_string());
        Ok(())
    }

    async fn mark_paid(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
        payment_id: &str,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        let order = tables.order_mut(order_id)?;
        order.payment_status = PaymentStatus::Paid;
        order.payment_id = Some(payment_id.to_string());
        Ok(())
    }

    async fn claim_shipment(&self, _auth: &AuthContext, order_id: Uuid) -> RepositoryResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&order_id) {
            return Err(RepositoryError::NotFound(order_id));
        }
        let shipped = tables.shipments.get(&order_id).is_some_and(|s| !s.is_empty());
        Ok(!shipped && tables.shipping_claims.insert(order_id))
    }

    async fn release_shipment_claim(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&order_id) {
            return Err(RepositoryError::NotFound(order_id));
        }
        tables.shipping_claims.remove(&order_id);
        Ok(())
    }

    async fn record_shipment(
        &self,
        _auth: &AuthContext,
        shipment: &Shipment,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&shipment.order_id) {
            return Err(RepositoryError::NotFound(shipment.order_id));
        }
        tables.shipments.entry(shipment.order_id).or_default().push(shipment.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        _auth: &AuthContext,
        order_id: Uuid,
        status: OrderStatus,
    ) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        tables.order_mut(order_id)?.status = status;
        Ok(())
    }
}
