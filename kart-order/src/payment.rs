use hmac::{Hmac, Mac};
use kart_core::payment::{GatewayOrder, PaymentGateway};
use kart_core::retry::{retry_unsent, RetryPolicy};
use kart_core::{GatewayError, Masked};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Creates payment intents and checks the signatures the client sends back
/// after completing a payment.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    key_secret: Masked<String>,
    retry: RetryPolicy,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        key_secret: Masked<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            key_secret,
            retry,
        }
    }

    /// Create a gateway order for `amount` minor units. Only resent when the
    /// previous attempt never reached the gateway, so a timed-out request
    /// cannot leave a second order behind.
    pub async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt_id: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let gateway = &self.gateway;
        let intent = retry_unsent(&self.retry, "create_payment_intent", || {
            gateway.create_order(amount, currency, receipt_id)
        })
        .await?;

        tracing::info!(
            gateway_order_id = %intent.id,
            receipt = receipt_id,
            amount,
            "Payment intent created"
        );
        Ok(intent)
    }

    /// True when `signature_hex` is HMAC-SHA256(secret, "{gateway_order_id}|{payment_id}").
    /// Has no side effects; any malformed input simply fails verification.
    pub fn verify(&self, gateway_order_id: &str, payment_id: &str, signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex.trim()) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(self.key_secret.expose().as_bytes()) else {
            return false;
        };
        mac.update(signing_payload(gateway_order_id, payment_id).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

fn signing_payload(gateway_order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", gateway_order_id, payment_id)
}

/// Hex signature the gateway's checkout hands back to the client. Only built
/// for tests, in this crate and downstream through the `test-support` feature.
#[cfg(any(test, feature = "test-support"))]
pub fn sign_payment(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signing_payload(gateway_order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
