use async_trait::async_trait;
use kart_core::payment::{GatewayOrder, PaymentGateway};
use kart_core::{GatewayError, Masked};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{decode, network, trim_base, REQUEST_TIMEOUT};

/// Client for the Razorpay orders API, authenticated with the key pair.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: Masked<String>,
}

impl RazorpayClient {
    pub fn new(
        base_url: &str,
        key_id: &str,
        key_secret: Masked<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(network)?;
        Ok(Self {
            client,
            base_url: trim_base(base_url),
            key_id: key_id.to_string(),
            key_secret,
        })
    }
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose()))
            .json(&CreateOrderRequest {
                amount,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(network)?;
        let body: OrderResponse = decode(response).await?;
        debug!(gateway_order_id = %body.id, status = %body.status, "Razorpay order created");
        Ok(GatewayOrder {
            id: body.id,
            amount: body.amount,
            currency: body.currency,
            receipt: body.receipt,
            status: body.status,
        })
    }
}
