use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Fulfillment status of an order. Variants are declared in lifecycle order,
/// so `Ord` reflects how far an order has progressed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
        }
    }

    /// Move forward to `target`, never backwards. Returns the status to store.
    pub fn advance_to(self, target: OrderStatus) -> OrderStatus {
        self.max(target)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// How the customer settles the order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Cash on delivery
    Cod,
    /// Online payment through the payment gateway
    Gateway,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cod => "cod",
            PaymentMode::Gateway => "gateway",
        }
    }

    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMode::Cod)
    }
}

macro_rules! impl_text_enum {
    ($ty:ident, $label:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(CoreError::ValidationError(format!(
                        "unknown {}: {}",
                        $label, other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_text_enum!(OrderStatus, "order status", {
    "pending" => Pending,
    "processing" => Processing,
    "shipped" => Shipped,
});

impl_text_enum!(PaymentStatus, "payment status", {
    "unpaid" => Unpaid,
    "paid" => Paid,
});

impl_text_enum!(PaymentMode, "payment mode", {
    "cod" => Cod,
    "gateway" => Gateway,
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

/// A cart line as submitted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(alias = "qty")]
    pub quantity: i32,
    #[serde(alias = "unit_price")]
    pub price: Decimal,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

/// Everything needed to insert an order row.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub idempotency_key: String,
    pub customer_id: String,
    /// Submitted amount in minor units (paise, cents)
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMode,
    pub shipping_address: ShippingAddress,
}

impl NewOrder {
    /// Amount in major units, e.g. 100000 paise -> 1000.00.
    pub fn total_amount(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }
}

/// The persisted record of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub idempotency_key: String,
    pub customer_id: String,
    pub amount: i64,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMode,
    pub shipping_address: ShippingAddress,
    pub gateway_order_id: Option<String>,
    pub payment_id: Option<String>,
    /// Newest last
    #[serde(default)]
    pub shipments: Vec<Shipment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_new(new: &NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: new.id,
            idempotency_key: new.idempotency_key.clone(),
            customer_id: new.customer_id.clone(),
            amount: new.amount,
            total_amount: new.total_amount(),
            currency: new.currency.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_method: new.payment_method,
            shipping_address: new.shipping_address.clone(),
            gateway_order_id: None,
            payment_id: None,
            shipments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn latest_shipment(&self) -> Option<&Shipment> {
        self.shipments.last()
    }

    pub fn shipment_id(&self) -> Option<i64> {
        self.latest_shipment().map(|s| s.shipment_id)
    }

    pub fn awb_code(&self) -> Option<&str> {
        self.latest_shipment().and_then(|s| s.awb_code.as_deref())
    }

    pub fn label_url(&self) -> Option<&str> {
        self.latest_shipment().and_then(|s| s.label_url.as_deref())
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// Immutable snapshot of a cart line at order time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub size: Option<String>,
    pub name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Index of the line in the submitted cart.
    pub position: i32,
}

impl LineItem {
    pub fn snapshot(order_id: Uuid, position: i32, item: &CartItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            size: item.size.clone(),
            name: item
                .name
                .clone()
                .unwrap_or_else(|| format!("Product {}", item.product_id)),
            sku: item.sku.clone().unwrap_or_else(|| default_sku(item)),
            quantity: item.quantity,
            unit_price: item.price,
            position,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

fn default_sku(item: &CartItem) -> String {
    let mut sku = format!("P{}", item.product_id);
    if let Some(variant) = item.variant_id {
        sku.push_str(&format!("-V{}", variant));
    }
    if let Some(size) = &item.size {
        sku.push('-');
        sku.push_str(&size.to_uppercase());
    }
    sku
}

/// Outcome of one orchestration run. Not persisted as-is; the reconciler
/// turns it into a [`Shipment`] row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentResult {
    pub shipment_id: i64,
    pub external_order_id: i64,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub label_url: Option<String>,
    pub pickup_scheduled: bool,
}

/// A shipment booked with the aggregator, owned by an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub shipment_id: i64,
    pub external_order_id: i64,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub label_url: Option<String>,
    pub pickup_scheduled: bool,
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    pub fn from_result(order_id: Uuid, result: &ShipmentResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            shipment_id: result.shipment_id,
            external_order_id: result.external_order_id,
            awb_code: result.awb_code.clone(),
            courier_name: result.courier_name.clone(),
            label_url: result.label_url.clone(),
            pickup_scheduled: result.pickup_scheduled,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".to_string(),
            phone: None,
            email: None,
            line1: "12 MG Road".to_string(),
            line2: None,
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
            postal_code: Some("560001".to_string()),
            country: "India".to_string(),
        }
    }

    #[test]
    fn test_status_never_regresses() {
        use OrderStatus::{Pending, Processing, Shipped};
        assert_eq!(Shipped.advance_to(Pending), Shipped);
        assert_eq!(Pending.advance_to(Processing), Processing);
        assert_eq!(Processing.advance_to(Shipped), Shipped);
    }

    #[test]
    fn test_total_amount_from_minor_units() {
        let new = NewOrder {
            id: Uuid::new_v4(),
            idempotency_key: "k1".to_string(),
            customer_id: "cust-1".to_string(),
            amount: 100000,
            currency: "INR".to_string(),
            payment_method: PaymentMode::Cod,
            shipping_address: address(),
        };
        let order = Order::from_new(&new);
        assert_eq!(order.total_amount, Decimal::new(100000, 2));
        assert_eq!(order.total_amount.to_string(), "1000.00");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn test_line_item_snapshot() {
        let cart: CartItem = serde_json::from_value(serde_json::json!({
            "product_id": 1, "qty": 2, "price": 500, "size": "m", "variant_id": 7
        }))
        .unwrap();
        let item = LineItem::snapshot(Uuid::new_v4(), 3, &cart);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.position, 3);
        assert_eq!(item.unit_price, Decimal::from(500));
        assert_eq!(item.sku, "P1-V7-M");
        assert_eq!(item.line_total(), Decimal::from(1000));
    }

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!("SHIPPED".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!(PaymentMode::Gateway.to_string(), "gateway");
        assert!("card".parse::<PaymentMode>().is_err());
    }
}
