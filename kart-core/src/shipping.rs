use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pii::Masked;
use crate::GatewayError;

/// Body of the aggregator's ad-hoc order creation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentPayload {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: i64,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: i64,
    pub shipping_is_billing: bool,
    pub order_items: Vec<ShipmentItem>,
    pub payment_method: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sub_total: Decimal,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub selling_price: Decimal,
}

/// Identifiers returned when the aggregator accepts a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedShipment {
    pub external_order_id: i64,
    pub shipment_id: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceabilityQuery {
    pub pickup_postcode: i64,
    pub delivery_postcode: i64,
    pub weight: f64,
    pub cod: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Courier {
    pub courier_company_id: i64,
    pub courier_name: String,
}

/// `status == 1` means the provider assigned an AWB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbAssignment {
    pub status: i64,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickupConfirmation {
    pub status: i64,
}

/// Outbound contract of the shipping aggregator.
#[async_trait]
pub trait ShippingAggregator: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<String, GatewayError>;

    async fn create_shipment(
        &self,
        token: &str,
        payload: &ShipmentPayload,
    ) -> Result<CreatedShipment, GatewayError>;

    /// Couriers able to deliver the parcel, best first.
    async fn serviceability(
        &self,
        token: &str,
        query: &ServiceabilityQuery,
    ) -> Result<Vec<Courier>, GatewayError>;

    /// Without `courier_id` the aggregator picks a courier itself.
    async fn assign_awb(
        &self,
        token: &str,
        shipment_id: i64,
        courier_id: Option<i64>,
    ) -> Result<AwbAssignment, GatewayError>;

    async fn generate_label(&self, token: &str, shipment_id: i64) -> Result<String, GatewayError>;

    async fn schedule_pickup(
        &self,
        token: &str,
        shipment_id: i64,
    ) -> Result<PickupConfirmation, GatewayError>;
}

/// Account used to log in to the shipping aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingCredentials {
    pub email: String,
    pub password: Masked<String>,
}

impl ShippingCredentials {
    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

/// The aggregator login failed, so no token can be handed out.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no shipping token: {0}")]
pub struct NoToken(pub String);

/// Source of the shared aggregator auth token.
#[async_trait]
pub trait ShippingTokenProvider: Send + Sync {
    /// Cached token if still valid, otherwise a fresh login.
    async fn get(&self) -> Result<String, NoToken>;

    /// Forget the cached token so the next `get` logs in again.
    async fn invalidate(&self);
}
