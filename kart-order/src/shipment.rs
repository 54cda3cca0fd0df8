//! Shipment booking with the shipping aggregator.
//!
//! Five stages run strictly in order: CREATE, SERVICEABILITY, AWB ASSIGN,
//! LABEL and PICKUP. Only CREATE is mandatory; it anchors the external record.
//! The later stages enrich the shipment and may each fail without aborting the
//! run. Every stage outcome lands in an [`OrchestrationReport`].

use kart_core::models::{LineItem, Order, ShipmentResult, ShippingAddress};
use kart_core::retry::{retry, retry_unsent, RetryPolicy};
use kart_core::shipping::{
    Courier, ServiceabilityQuery, ShipmentItem, ShipmentPayload, ShippingAggregator,
    ShippingTokenProvider,
};
use kart_core::GatewayError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fixed parcel dimensions in centimetres.
pub const PACKAGE_LENGTH_CM: f64 = 10.0;
pub const PACKAGE_BREADTH_CM: f64 = 10.0;
pub const PACKAGE_HEIGHT_CM: f64 = 10.0;

/// Weight booked per line item, and the floor for an empty order (kg).
pub const WEIGHT_PER_ITEM_KG: f64 = 0.5;

/// Where parcels are collected from.
#[derive(Debug, Clone)]
pub struct ShippingSettings {
    pub pickup_location: String,
    pub pickup_pincode: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Create,
    Serviceability,
    AwbAssign,
    Label,
    Pickup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Create => "create",
            Stage::Serviceability => "serviceability",
            Stage::AwbAssign => "awb_assign",
            Stage::Label => "label",
            Stage::Pickup => "pickup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Per-stage outcomes of one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestrationReport {
    pub stages: Vec<StageReport>,
}

impl OrchestrationReport {
    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        match &outcome {
            StageOutcome::Ok => info!(%stage, "Shipment stage succeeded"),
            StageOutcome::Skipped(reason) => {
                info!(%stage, reason = %reason, "Shipment stage skipped")
            }
            StageOutcome::Failed(reason) => {
                warn!(%stage, reason = %reason, "Shipment stage failed")
            }
        }
        self.stages.push(StageReport { stage, outcome });
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| &r.outcome)
    }

    /// True when every enrichment stage succeeded.
    pub fn is_complete(&self) -> bool {
        self.stages.len() == 5 && self.stages.iter().all(|r| r.outcome == StageOutcome::Ok)
    }
}

/// A booked shipment and how each stage went.
#[derive(Debug, Clone)]
pub struct ShipmentOutcome {
    pub result: ShipmentResult,
    pub report: OrchestrationReport,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Shipment creation failed: {0}")]
    CreateFailed(GatewayError),
}

/// How far an aggregator call may be repeated after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Reads, or writes the aggregator deduplicates on its own.
    Repeatable,
    /// Creates a record on the aggregator side; resent only when the request
    /// never left this process.
    AtMostOnce,
}

pub struct ShipmentOrchestrator {
    aggregator: Arc<dyn ShippingAggregator>,
    tokens: Arc<dyn ShippingTokenProvider>,
    settings: ShippingSettings,
    retry: RetryPolicy,
}

impl ShipmentOrchestrator {
    pub fn new(
        aggregator: Arc<dyn ShippingAggregator>,
        tokens: Arc<dyn ShippingTokenProvider>,
        settings: ShippingSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            aggregator,
            tokens,
            settings,
            retry,
        }
    }

    /// Book a shipment for `order`. Errors only when the mandatory CREATE
    /// stage fails; enrichment failures are reported, not returned.
    pub async fn run(
        &self,
        order: &Order,
        items: &[LineItem],
    ) -> Result<ShipmentOutcome, OrchestrationError> {
        let mut report = OrchestrationReport::default();
        let aggregator = &self.aggregator;

        // 1. CREATE
        let payload = build_shipment_payload(order, items, &self.settings);
        let created = match self
            .call("create_shipment", Delivery::AtMostOnce, |token| {
                let payload = &payload;
                async move { aggregator.create_shipment(&token, payload).await }
            })
            .await
        {
            Ok(created) => created,
            Err(e) => {
                error!(
                    order_id = %order.id,
                    error = %e,
                    "Shipment creation failed, order stays unshipped"
                );
                return Err(OrchestrationError::CreateFailed(e));
            }
        };
        report.record(Stage::Create, StageOutcome::Ok);

        let mut result = ShipmentResult {
            shipment_id: created.shipment_id,
            external_order_id: created.external_order_id,
            ..ShipmentResult::default()
        };
        let shipment_id = result.shipment_id;

        // 2. SERVICEABILITY
        let query = ServiceabilityQuery {
            pickup_postcode: self.settings.pickup_pincode,
            delivery_postcode: payload.billing_pincode,
            weight: payload.weight,
            cod: order.payment_method.is_cod(),
        };
        let recommended: Option<Courier> = match self
            .call("serviceability", Delivery::Repeatable, |token| {
                let query = &query;
                async move { aggregator.serviceability(&token, query).await }
            })
            .await
        {
            Ok(couriers) => match couriers.into_iter().next() {
                Some(courier) => {
                    report.record(Stage::Serviceability, StageOutcome::Ok);
                    Some(courier)
                }
                None => {
                    report.record(
                        Stage::Serviceability,
                        StageOutcome::Skipped("no courier available for route".into()),
                    );
                    None
                }
            },
            Err(e) => {
                report.record(Stage::Serviceability, StageOutcome::Failed(e.to_string()));
                None
            }
        };

        // 3. AWB ASSIGN
        let courier_id = recommended.as_ref().map(|c| c.courier_company_id);
        match self
            .call("assign_awb", Delivery::AtMostOnce, |token| async move {
                aggregator.assign_awb(&token, shipment_id, courier_id).await
            })
            .await
        {
            Ok(assignment) if assignment.status == 1 && assignment.awb_code.is_some() => {
                result.awb_code = assignment.awb_code;
                result.courier_name = assignment
                    .courier_name
                    .or_else(|| recommended.as_ref().map(|c| c.courier_name.clone()));
                report.record(Stage::AwbAssign, StageOutcome::Ok);
            }
            Ok(assignment) => {
                report.record(
                    Stage::AwbAssign,
                    StageOutcome::Failed(format!("awb_assign_status {}", assignment.status)),
                );
            }
            Err(e) => report.record(Stage::AwbAssign, StageOutcome::Failed(e.to_string())),
        }

        if result.awb_code.is_none() {
            report.record(Stage::Label, StageOutcome::Skipped("no AWB assigned".into()));
            report.record(Stage::Pickup, StageOutcome::Skipped("no AWB assigned".into()));
            return Ok(finish(order, result, report));
        }

        // 4. LABEL
        match self
            .call("generate_label", Delivery::Repeatable, |token| async move {
                aggregator.generate_label(&token, shipment_id).await
            })
            .await
        {
            Ok(url) => {
                result.label_url = Some(url);
                report.record(Stage::Label, StageOutcome::Ok);
            }
            Err(e) => report.record(Stage::Label, StageOutcome::Failed(e.to_string())),
        }

        // 5. PICKUP
        match self
            .call("schedule_pickup", Delivery::AtMostOnce, |token| async move {
                aggregator.schedule_pickup(&token, shipment_id).await
            })
            .await
        {
            Ok(pickup) if pickup.status == 1 => {
                result.pickup_scheduled = true;
                report.record(Stage::Pickup, StageOutcome::Ok);
            }
            Ok(pickup) => report.record(
                Stage::Pickup,
                StageOutcome::Failed(format!("pickup_status {}", pickup.status)),
            ),
            Err(e) => report.record(Stage::Pickup, StageOutcome::Failed(e.to_string())),
        }

        Ok(finish(order, result, report))
    }

    /// Run one aggregator call with the shared token. A rejected token is
    /// dropped from the cache and the call is repeated once with a fresh one.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        delivery: Delivery,
        op: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let token = self.token().await?;
        match self.send(operation, delivery, &op, &token).await {
            Err(e) if e.is_unauthorized() => {
                warn!(operation, "Aggregator rejected the cached token, logging in again");
                self.tokens.invalidate().await;
                let token = self.token().await?;
                self.send(operation, delivery, &op, &token).await
            }
            other => other,
        }
    }

    async fn send<T, F, Fut>(
        &self,
        operation: &'static str,
        delivery: Delivery,
        op: &F,
        token: &str,
    ) -> Result<T, GatewayError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        match delivery {
            Delivery::Repeatable => retry(&self.retry, operation, || op(token.to_string())).await,
            Delivery::AtMostOnce => {
                retry_unsent(&self.retry, operation, || op(token.to_string())).await
            }
        }
    }

    async fn token(&self) -> Result<String, GatewayError> {
        self.tokens
            .get()
            .await
            .map_err(|e| GatewayError::NoToken(e.to_string()))
    }
}

fn finish(order: &Order, result: ShipmentResult, report: OrchestrationReport) -> ShipmentOutcome {
    info!(
        order_id = %order.id,
        shipment_id = result.shipment_id,
        awb_code = ?result.awb_code,
        pickup_scheduled = result.pickup_scheduled,
        complete = report.is_complete(),
        "Shipment orchestration finished"
    );
    ShipmentOutcome { result, report }
}

/// Assemble the CREATE payload from the order snapshot.
pub fn build_shipment_payload(
    order: &Order,
    items: &[LineItem],
    settings: &ShippingSettings,
) -> ShipmentPayload {
    let address: &ShippingAddress = &order.shipping_address;
    let (first_name, last_name) = split_name(&address.full_name);

    ShipmentPayload {
        order_id: order.id.to_string(),
        order_date: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
        pickup_location: settings.pickup_location.clone(),
        billing_customer_name: first_name,
        billing_last_name: last_name,
        billing_address: address.line1.clone(),
        billing_address_2: address.line2.clone().unwrap_or_default(),
        billing_city: address.city.clone(),
        billing_pincode: parse_pincode(address.postal_code.as_deref()),
        billing_state: address.state.clone(),
        billing_country: address.country.clone(),
        billing_email: address.email.clone().unwrap_or_default(),
        billing_phone: normalize_phone(address.phone.as_deref()),
        shipping_is_billing: true,
        order_items: items
            .iter()
            .map(|item| ShipmentItem {
                name: item.name.clone(),
                sku: item.sku.clone(),
                units: item.quantity,
                selling_price: item.unit_price,
            })
            .collect(),
        payment_method: if order.payment_method.is_cod() { "COD" } else { "Prepaid" }.to_string(),
        sub_total: subtotal(items),
        length: PACKAGE_LENGTH_CM,
        breadth: PACKAGE_BREADTH_CM,
        height: PACKAGE_HEIGHT_CM,
        weight: shipment_weight(items.len()),
    }
}

/// First whitespace-separated token, and everything after it.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Drops an assumed 3-character country-code prefix ("+91"), keeps the digits.
/// Missing or unparsable numbers become the all-zero placeholder.
pub fn normalize_phone(phone: Option<&str>) -> i64 {
    let Some(phone) = phone else {
        return 0;
    };
    let digits: String = phone
        .chars()
        .skip(3)
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

pub fn parse_pincode(postal_code: Option<&str>) -> i64 {
    postal_code
        .map(|p| p.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

pub fn shipment_weight(item_count: usize) -> f64 {
    (WEIGHT_PER_ITEM_KG * item_count as f64).max(WEIGHT_PER_ITEM_KG)
}

pub fn subtotal(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::line_total).sum()
}
