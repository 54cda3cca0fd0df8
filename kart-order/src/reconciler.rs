use kart_core::models::{OrderStatus, PaymentMode, PaymentStatus, Shipment, ShipmentResult};
use kart_core::repository::OrderRepository;
use kart_core::AuthContext;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The one place order status is derived from a shipment outcome.
///
/// Cash-on-delivery orders become `shipped` once an AWB exists and
/// `processing` otherwise. Online-payment orders stay `pending` after
/// booking, paid or not.
pub fn derive_order_status(
    payment_status: PaymentStatus,
    shipment: Option<&ShipmentResult>,
    payment_mode: PaymentMode,
) -> OrderStatus {
    let has_awb = shipment.is_some_and(|s| s.awb_code.is_some());
    match (payment_mode, payment_status) {
        (PaymentMode::Cod, _) if has_awb => OrderStatus::Shipped,
        (PaymentMode::Cod, _) => OrderStatus::Processing,
        (PaymentMode::Gateway, PaymentStatus::Paid | PaymentStatus::Unpaid) => OrderStatus::Pending,
    }
}

/// Writes orchestration outcomes back onto the order. Failures here are
/// logged and dropped: the customer-facing step already succeeded.
pub struct StatusReconciler {
    repo: Arc<dyn OrderRepository>,
}

impl StatusReconciler {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    pub async fn update(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        result: &ShipmentResult,
        payment_mode: PaymentMode,
    ) {
        let shipment = Shipment::from_result(order_id, result);
        if let Err(e) = self.repo.record_shipment(auth, &shipment).await {
            error!(
                %order_id,
                shipment_id = result.shipment_id,
                error = %e,
                "Failed to record shipment"
            );
        }

        let order = match self.repo.get_order(auth, order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                error!(%order_id, "Order vanished before status reconciliation");
                return;
            }
            Err(e) => {
                error!(%order_id, error = %e, "Failed to load order for status reconciliation");
                return;
            }
        };

        let derived = derive_order_status(order.payment_status, Some(result), payment_mode);
        let next = order.status.advance_to(derived);
        if next != derived {
            warn!(
                %order_id,
                current = %order.status,
                derived = %derived,
                "Refusing to regress order status"
            );
        }
        if next == order.status {
            return;
        }

        match self.repo.update_status(auth, order_id, next).await {
            Ok(()) => info!(%order_id, from = %order.status, to = %next, "Order status reconciled"),
            Err(e) => error!(%order_id, error = %e, "Failed to update order status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kart_core::models::{NewOrder, ShippingAddress};
    use kart_store::InMemoryOrderRepository;

    fn result(awb: Option<&str>) -> ShipmentResult {
        ShipmentResult {
            shipment_id: 11,
            external_order_id: 22,
            awb_code: awb.map(String::from),
            ..ShipmentResult::default()
        }
    }

    fn auth() -> AuthContext {
        AuthContext::new("jwt", "cust-1", serde_json::json!({ "sub": "cust-1" }))
    }

    async fn seeded(repo: &InMemoryOrderRepository, mode: PaymentMode) -> Uuid {
        let new = NewOrder {
            id: Uuid::new_v4(),
            idempotency_key: Uuid::new_v4().to_string(),
            customer_id: "cust-1".into(),
            amount: 5000,
            currency: "INR".into(),
            payment_method: mode,
            shipping_address: ShippingAddress {
                full_name: "Ravi".into(),
                phone: None,
                email: None,
                line1: "1 Park St".into(),
                line2: None,
                city: "Kolkata".into(),
                state: "WB".into(),
                postal_code: None,
                country: "India".into(),
            },
        };
        repo.insert_order(&auth(), &new).await.unwrap().id
    }

    #[test]
    fn test_cod_status_follows_awb() {
        let with_awb = result(Some("AWB1"));
        let without = result(None);
        assert_eq!(
            derive_order_status(PaymentStatus::Unpaid, Some(&with_awb), PaymentMode::Cod),
            OrderStatus::Shipped
        );
        assert_eq!(
            derive_order_status(PaymentStatus::Unpaid, Some(&without), PaymentMode::Cod),
            OrderStatus::Processing
        );
        assert_eq!(
            derive_order_status(PaymentStatus::Unpaid, None, PaymentMode::Cod),
            OrderStatus::Processing
        );
    }

    #[test]
    fn test_gateway_orders_stay_pending() {
        let with_awb = result(Some("AWB1"));
        assert_eq!(
            derive_order_status(PaymentStatus::Paid, Some(&with_awb), PaymentMode::Gateway),
            OrderStatus::Pending
        );
        assert_eq!(
            derive_order_status(PaymentStatus::Paid, None, PaymentMode::Gateway),
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_cod_with_awb_becomes_shipped() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order_id = seeded(&repo, PaymentMode::Cod).await;

        StatusReconciler::new(repo.clone())
            .update(&auth(), order_id, &result(Some("AWB9")), PaymentMode::Cod)
            .await;

        let order = repo.get_order(&auth(), order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipment_id(), Some(11));
        assert_eq!(order.awb_code(), Some("AWB9"));
    }

    #[tokio::test]
    async fn test_cod_without_awb_becomes_processing() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order_id = seeded(&repo, PaymentMode::Cod).await;

        StatusReconciler::new(repo.clone())
            .update(&auth(), order_id, &result(None), PaymentMode::Cod)
            .await;

        let order = repo.get_order(&auth(), order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.awb_code(), None);
    }

    #[tokio::test]
    async fn test_status_does_not_regress() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order_id = seeded(&repo, PaymentMode::Cod).await;
        let reconciler = StatusReconciler::new(repo.clone());

        reconciler
            .update(&auth(), order_id, &result(Some("AWB1")), PaymentMode::Cod)
            .await;
        reconciler
            .update(&auth(), order_id, &result(None), PaymentMode::Cod)
            .await;

        let order = repo.get_order(&auth(), order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipments.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_order_is_logged_not_raised() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        StatusReconciler::new(repo.clone())
            .update(&auth(), Uuid::new_v4(), &result(Some("AWB1")), PaymentMode::Cod)
            .await;
    }
}
