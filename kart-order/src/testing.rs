//! In-memory doubles of the external providers for unit tests.

use async_trait::async_trait;
use kart_core::payment::{GatewayOrder, PaymentGateway};
use kart_core::shipping::{
    AwbAssignment, Courier, CreatedShipment, PickupConfirmation, ServiceabilityQuery,
    ShipmentPayload, ShippingAggregator,
};
use kart_core::models::{LineItem, NewOrder, Order, OrderStatus, Shipment};
use kart_core::repository::{OrderRepository, RepositoryError, RepositoryResult};
use kart_core::{AuthContext, GatewayError};
use kart_store::InMemoryOrderRepository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct AggregatorState {
    login_calls: u32,
    fail_login: bool,
    fail_create: bool,
    unauthorized_creates: u32,
    unsent_creates: u32,
    timed_out_creates: u32,
    flaky_serviceability: u32,
    fail_serviceability: bool,
    no_couriers: bool,
    fail_awb: bool,
    fail_label: bool,
    fail_pickup: bool,
    create_calls: u32,
    assigned_courier: Option<Option<i64>>,
    label_calls: u32,
    pickup_calls: u32,
    last_payload: Option<ShipmentPayload>,
    tokens_seen: Vec<String>,
}

pub struct FakeAggregator {
    state: Mutex<AggregatorState>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut AggregatorState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail_login(&self) {
        self.with(|s| s.fail_login = true);
    }

    pub fn fail_create(&self) {
        self.with(|s| s.fail_create = true);
    }

    pub fn reject_token_on_next_create(&self) {
        self.with(|s| s.unauthorized_creates = 1);
    }

    /// Next create fails before reaching the aggregator.
    pub fn refuse_connection_on_next_create(&self) {
        self.with(|s| s.unsent_creates = 1);
    }

    /// Next create is saved by the aggregator but answered with a 504.
    pub fn time_out_after_next_create(&self) {
        self.with(|s| s.timed_out_creates = 1);
    }

    pub fn fail_serviceability_once(&self) {
        self.with(|s| s.flaky_serviceability = 1);
    }

    pub fn fail_serviceability(&self) {
        self.with(|s| s.fail_serviceability = true);
    }

    pub fn no_couriers(&self) {
        self.with(|s| s.no_couriers = true);
    }

    pub fn fail_awb(&self) {
        self.with(|s| s.fail_awb = true);
    }

    pub fn fail_label(&self) {
        self.with(|s| s.fail_label = true);
    }

    pub fn fail_pickup(&self) {
        self.with(|s| s.fail_pickup = true);
    }

    pub fn login_calls(&self) -> u32 {
        self.with(|s| s.login_calls)
    }

    pub fn create_calls(&self) -> u32 {
        self.with(|s| s.create_calls)
    }

    /// `Some(None)` means automatic assignment was requested.
    pub fn assigned_courier(&self) -> Option<Option<i64>> {
        self.with(|s| s.assigned_courier)
    }

    pub fn label_calls(&self) -> u32 {
        self.with(|s| s.label_calls)
    }

    pub fn pickup_calls(&self) -> u32 {
        self.with(|s| s.pickup_calls)
    }

    pub fn last_payload(&self) -> Option<ShipmentPayload> {
        self.with(|s| s.last_payload.clone())
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.with(|s| s.tokens_seen.clone())
    }
}

#[async_trait]
impl ShippingAggregator for FakeAggregator {
    async fn login(&self, _email: &str, _password: &str) -> Result<String, GatewayError> {
        self.with(|s| {
            s.login_calls += 1;
            if s.fail_login {
                return Err(GatewayError::Unauthorized("bad credentials".into()));
            }
            Ok(format!("token-{}", s.login_calls))
        })
    }

    async fn create_shipment(
        &self,
        token: &str,
        payload: &ShipmentPayload,
    ) -> Result<CreatedShipment, GatewayError> {
        // a real aggregator call suspends; let concurrent requests interleave here
        tokio::task::yield_now().await;
        self.with(|s| {
            if s.unsent_creates > 0 {
                s.unsent_creates -= 1;
                return Err(GatewayError::Connect("connection refused".into()));
            }
            s.create_calls += 1;
            s.tokens_seen.push(token.to_string());
            if s.unauthorized_creates > 0 {
                s.unauthorized_creates -= 1;
                return Err(GatewayError::Unauthorized("token expired".into()));
            }
            if s.fail_create {
                return Err(GatewayError::Http {
                    status: 422,
                    message: "invalid pincode".into(),
                });
            }
            s.last_payload = Some(payload.clone());
            if s.timed_out_creates > 0 {
                s.timed_out_creates -= 1;
                return Err(GatewayError::Http {
                    status: 504,
                    message: "gateway timeout".into(),
                });
            }
            Ok(CreatedShipment {
                external_order_id: 9001,
                shipment_id: 7001,
            })
        })
    }

    async fn serviceability(
        &self,
        _token: &str,
        _query: &ServiceabilityQuery,
    ) -> Result<Vec<Courier>, GatewayError> {
        self.with(|s| {
            if s.flaky_serviceability > 0 {
                s.flaky_serviceability -= 1;
                return Err(GatewayError::Http {
                    status: 503,
                    message: "service unavailable".into(),
                });
            }
            if s.fail_serviceability {
                return Err(GatewayError::Network("timeout".into()));
            }
            if s.no_couriers {
                return Ok(Vec::new());
            }
            Ok(vec![
                Courier {
                    courier_company_id: 42,
                    courier_name: "Delhivery".into(),
                },
                Courier {
                    courier_company_id: 7,
                    courier_name: "Ekart".into(),
                },
            ])
        })
    }

    async fn assign_awb(
        &self,
        _token: &str,
        _shipment_id: i64,
        courier_id: Option<i64>,
    ) -> Result<AwbAssignment, GatewayError> {
        self.with(|s| {
            s.assigned_courier = Some(courier_id);
            if s.fail_awb {
                return Ok(AwbAssignment {
                    status: 0,
                    awb_code: None,
                    courier_name: None,
                });
            }
            Ok(AwbAssignment {
                status: 1,
                awb_code: Some("AWB123456".into()),
                courier_name: Some(
                    if courier_id == Some(42) { "Delhivery" } else { "Auto" }.into(),
                ),
            })
        })
    }

    async fn generate_label(&self, _token: &str, shipment_id: i64) -> Result<String, GatewayError> {
        self.with(|s| {
            s.label_calls += 1;
            if s.fail_label {
                return Err(GatewayError::InvalidResponse("label_created=0".into()));
            }
            Ok(format!("https://labels.test/{}.pdf", shipment_id))
        })
    }

    async fn schedule_pickup(
        &self,
        _token: &str,
        _shipment_id: i64,
    ) -> Result<PickupConfirmation, GatewayError> {
        self.with(|s| {
            s.pickup_calls += 1;
            if s.fail_pickup {
                return Ok(PickupConfirmation { status: 0 });
            }
            Ok(PickupConfirmation { status: 1 })
        })
    }
}

#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<u32>,
    fail: Mutex<bool>,
    time_out_next: Mutex<bool>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Next order is created but the response is a 504.
    pub fn time_out_next(&self) {
        *self.time_out_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *self.fail.lock().unwrap() {
            return Err(GatewayError::Http {
                status: 401,
                message: "Authentication failed".into(),
            });
        }
        let mut time_out = self.time_out_next.lock().unwrap();
        if *time_out {
            *time_out = false;
            return Err(GatewayError::Http {
                status: 504,
                message: "gateway timeout".into(),
            });
        }
        Ok(GatewayOrder {
            id: format!("order_test{}", calls),
            amount,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".into(),
        })
    }
}

/// In-memory repository whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemoryOrderRepository,
    fail_orders: AtomicBool,
    fail_line_items: AtomicBool,
    fail_gateway_id: AtomicBool,
    hide_duplicates: AtomicBool,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_orders(&self) {
        self.fail_orders.store(true, Ordering::SeqCst);
    }

    pub fn fail_line_items(&self) {
        self.fail_line_items.store(true, Ordering::SeqCst);
    }

    pub fn fail_gateway_id(&self) {
        self.fail_gateway_id.store(true, Ordering::SeqCst);
    }

    /// Every insert collides with a key held by an order the caller cannot see.
    pub fn hide_duplicates(&self) {
        self.hide_duplicates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderRepository for FlakyRepository {
    async fn find_by_idempotency_key(
        &self,
        auth: &AuthContext,
        customer_id: &str,
        key: &str,
    ) -> RepositoryResult<Option<Order>> {
        self.inner.find_by_idempotency_key(auth, customer_id, key).await
    }

    async fn insert_order(&self, auth: &AuthContext, order: &NewOrder) -> RepositoryResult<Order> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection reset".into()));
        }
        if self.hide_duplicates.load(Ordering::SeqCst) {
            return Err(RepositoryError::DuplicateKey(order.idempotency_key.clone()));
        }
        self.inner.insert_order(auth, order).await
    }

    async fn insert_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        items: &[LineItem],
    ) -> RepositoryResult<()> {
        if self.fail_line_items.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(
                "permission denied for table line_items".into(),
            ));
        }
        self.inner.insert_line_items(auth, order_id, items).await
    }

    async fn get_order(&self, auth: &AuthContext, id: Uuid) -> RepositoryResult<Option<Order>> {
        self.inner.get_order(auth, id).await
    }

    async fn list_line_items(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<Vec<LineItem>> {
        self.inner.list_line_items(auth, order_id).await
    }

    async fn set_gateway_order_id(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        gateway_order_id: &str,
    ) -> RepositoryResult<()> {
        if self.fail_gateway_id.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection reset".into()));
        }
        self.inner.set_gateway_order_id(auth, order_id, gateway_order_id).await
    }

    async fn mark_paid(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        payment_id: &str,
    ) -> RepositoryResult<()> {
        self.inner.mark_paid(auth, order_id, payment_id).await
    }

    async fn claim_shipment(&self, auth: &AuthContext, order_id: Uuid) -> RepositoryResult<bool> {
        self.inner.claim_shipment(auth, order_id).await
    }

    async fn release_shipment_claim(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
    ) -> RepositoryResult<()> {
        self.inner.release_shipment_claim(auth, order_id).await
    }

    async fn record_shipment(
        &self,
        auth: &AuthContext,
        shipment: &Shipment,
    ) -> RepositoryResult<()> {
        self.inner.record_shipment(auth, shipment).await
    }

    async fn update_status(
        &self,
        auth: &AuthContext,
        order_id: Uuid,
        status: OrderStatus,
    ) -> RepositoryResult<()> {
        self.inner.update_status(auth, order_id, status).await
    }
}
