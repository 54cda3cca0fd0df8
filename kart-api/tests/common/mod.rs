use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use kart_api::{app, AppState};
use kart_core::payment::{GatewayOrder, PaymentGateway};
use kart_core::retry::RetryPolicy;
use kart_core::shipping::{
    AwbAssignment, Courier, CreatedShipment, PickupConfirmation, ServiceabilityQuery,
    ShipmentPayload, ShippingAggregator, ShippingCredentials,
};
use kart_core::{GatewayError, Masked};
use kart_order::{
    PaymentService, PipelineCoordinator, ShipmentOrchestrator, ShippingSettings, TokenCache,
};
use kart_store::InMemoryOrderRepository;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const KEY_SECRET: &str = "rzp_test_secret";

#[derive(Default)]
pub struct StubAggregator {
    pub creates: AtomicU32,
}

#[async_trait]
impl ShippingAggregator for StubAggregator {
    async fn login(&self, _email: &str, _password: &str) -> Result<String, GatewayError> {
        Ok("ship-token".into())
    }

    async fn create_shipment(
        &self,
        _token: &str,
        _payload: &ShipmentPayload,
    ) -> Result<CreatedShipment, GatewayError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        Ok(CreatedShipment {
            external_order_id: 9000 + n,
            shipment_id: 7000 + n,
        })
    }

    async fn serviceability(
        &self,
        _token: &str,
        _query: &ServiceabilityQuery,
    ) -> Result<Vec<Courier>, GatewayError> {
        Ok(vec![Courier {
            courier_company_id: 42,
            courier_name: "Delhivery".into(),
        }])
    }

    async fn assign_awb(
        &self,
        _token: &str,
        shipment_id: i64,
        _courier_id: Option<i64>,
    ) -> Result<AwbAssignment, GatewayError> {
        Ok(AwbAssignment {
            status: 1,
            awb_code: Some(format!("AWB{}", shipment_id)),
            courier_name: Some("Delhivery".into()),
        })
    }

    async fn generate_label(&self, _token: &str, shipment_id: i64) -> Result<String, GatewayError> {
        Ok(format!("https://labels.test/{}.pdf", shipment_id))
    }

    async fn schedule_pickup(
        &self,
        _token: &str,
        _shipment_id: i64,
    ) -> Result<PickupConfirmation, GatewayError> {
        Ok(PickupConfirmation { status: 1 })
    }
}

#[derive(Default)]
pub struct StubGateway {
    pub orders: AtomicU32,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder {
            id: format!("order_stub{}", n),
            amount,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: "created".into(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryOrderRepository>,
    pub aggregator: Arc<StubAggregator>,
}

pub fn test_app() -> TestApp {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let aggregator = Arc::new(StubAggregator::default());
    let tokens = Arc::new(TokenCache::new(
        aggregator.clone(),
        ShippingCredentials {
            email: "ops@kart.test".into(),
            password: Masked::from("pw"),
        },
        RetryPolicy::none(),
    ));
    let pipeline = PipelineCoordinator::new(
        repo.clone(),
        PaymentService::new(
            Arc::new(StubGateway::default()),
            Masked::from(KEY_SECRET),
            RetryPolicy::none(),
        ),
        ShipmentOrchestrator::new(
            aggregator.clone(),
            tokens,
            ShippingSettings {
                pickup_location: "Primary".into(),
                pickup_pincode: 110001,
            },
            RetryPolicy::none(),
        ),
    );

    TestApp {
        router: app(AppState::new(Some(Arc::new(pipeline)), Masked::from(JWT_SECRET))),
        repo,
        aggregator,
    }
}

/// Router whose pipeline could not be built from config.
pub fn unconfigured_app() -> Router {
    app(AppState::new(None, Masked::from(JWT_SECRET)))
}

pub fn bearer(subject: &str) -> String {
    let claims = json!({
        "sub": subject,
        "role": "authenticated",
        "exp": (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    });
    let key = EncodingKey::from_secret(JWT_SECRET.as_bytes());
    let token = encode(&Header::default(), &claims, &key).unwrap();
    format!("Bearer {}", token)
}

/// POST a fresh checkout in `mode` as `subject`.
pub async fn place_order(router: &Router, subject: &str, mode: &str) -> (StatusCode, Value) {
    send(router, "POST", "/v1/orders", Some(&bearer(subject)), Some(checkout_body(mode))).await
}

pub fn checkout_body(mode: &str) -> Value {
    json!({
        "idempotency_key": uuid::Uuid::new_v4().to_string(),
        "amount": 100000,
        "currency": "INR",
        "cart_items": [{ "product_id": 1, "qty": 2, "price": 500 }],
        "customer_id": "cust-1",
        "shipping_address": {
            "full_name": "Asha Rao",
            "phone": "+91 98765 43210",
            "line1": "12 MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "postal_code": "560001"
        },
        "payment_mode": mode
    })
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        request = request.header("authorization", auth);
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
