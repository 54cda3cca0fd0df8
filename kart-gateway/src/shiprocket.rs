use async_trait::async_trait;
use kart_core::shipping::{
    AwbAssignment, Courier, CreatedShipment, PickupConfirmation, ServiceabilityQuery,
    ShipmentPayload, ShippingAggregator,
};
use kart_core::GatewayError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{decode, network, trim_base, REQUEST_TIMEOUT};

/// Client for the Shiprocket external API.
#[derive(Debug, Clone)]
pub struct ShiprocketClient {
    client: Client,
    base_url: String,
}

impl ShiprocketClient {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(network)?;
        Ok(Self {
            client,
            base_url: trim_base(base_url),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_id: i64,
    shipment_id: i64,
}

#[derive(Deserialize)]
struct ServiceabilityResponse {
    #[serde(default)]
    data: Option<ServiceabilityData>,
}

#[derive(Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierCompany>,
}

#[derive(Deserialize)]
struct CourierCompany {
    courier_company_id: i64,
    courier_name: String,
}

#[derive(Serialize)]
struct AssignAwbRequest {
    shipment_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    courier_id: Option<i64>,
}

#[derive(Deserialize)]
struct AssignAwbResponse {
    #[serde(default)]
    awb_assign_status: i64,
    #[serde(default)]
    response: Option<AwbEnvelope>,
}

#[derive(Deserialize)]
struct AwbEnvelope {
    #[serde(default)]
    data: Option<AwbData>,
}

#[derive(Deserialize)]
struct AwbData {
    #[serde(default)]
    awb_code: Option<String>,
    #[serde(default)]
    courier_name: Option<String>,
}

#[derive(Serialize)]
struct ShipmentIds {
    shipment_id: [i64; 1],
}

#[derive(Deserialize)]
struct LabelResponse {
    #[serde(default)]
    label_created: i64,
    #[serde(default)]
    label_url: Option<String>,
}

#[derive(Deserialize)]
struct PickupResponse {
    #[serde(default)]
    pickup_status: i64,
}

#[async_trait]
impl ShippingAggregator for ShiprocketClient {
    async fn login(&self, email: &str, password: &str) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(network)?;
        let body: LoginResponse = decode(response).await?;
        Ok(body.token)
    }

    async fn create_shipment(
        &self,
        token: &str,
        payload: &ShipmentPayload,
    ) -> Result<CreatedShipment, GatewayError> {
        let response = self
            .client
            .post(self.url("/orders/create/adhoc"))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(network)?;
        let body: CreateOrderResponse = decode(response).await?;
        debug!(
            order_id = body.order_id,
            shipment_id = body.shipment_id,
            "Shiprocket order created"
        );
        Ok(CreatedShipment {
            external_order_id: body.order_id,
            shipment_id: body.shipment_id,
        })
    }

    async fn serviceability(
        &self,
        token: &str,
        query: &ServiceabilityQuery,
    ) -> Result<Vec<Courier>, GatewayError> {
        let params = [
            ("pickup_postcode", query.pickup_postcode.to_string()),
            ("delivery_postcode", query.delivery_postcode.to_string()),
            ("weight", query.weight.to_string()),
            ("cod", if query.cod { "1" } else { "0" }.to_string()),
        ];
        let response = self
            .client
            .get(self.url("/courier/serviceability/"))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(network)?;
        let body: ServiceabilityResponse = decode(response).await?;
        Ok(body
            .data
            .map(|d| d.available_courier_companies)
            .unwrap_or_default()
            .into_iter()
            .map(|c| Courier {
                courier_company_id: c.courier_company_id,
                courier_name: c.courier_name,
            })
            .collect())
    }

    async fn assign_awb(
        &self,
        token: &str,
        shipment_id: i64,
        courier_id: Option<i64>,
    ) -> Result<AwbAssignment, GatewayError> {
        let response = self
            .client
            .post(self.url("/courier/assign/awb"))
            .bearer_auth(token)
            .json(&AssignAwbRequest { shipment_id, courier_id })
            .send()
            .await
            .map_err(network)?;
        let body: AssignAwbResponse = decode(response).await?;
        let data = body.response.and_then(|r| r.data);
        Ok(AwbAssignment {
            status: body.awb_assign_status,
            awb_code: data.as_ref().and_then(|d| d.awb_code.clone()).filter(|c| !c.is_empty()),
            courier_name: data.and_then(|d| d.courier_name),
        })
    }

    async fn generate_label(&self, token: &str, shipment_id: i64) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.url("/courier/generate/label"))
            .bearer_auth(token)
            .json(&ShipmentIds {
                shipment_id: [shipment_id],
            })
            .send()
            .await
            .map_err(network)?;
        let body: LabelResponse = decode(response).await?;
        match body.label_url {
            Some(url) if body.label_created == 1 && !url.is_empty() => Ok(url),
            _ => Err(GatewayError::InvalidResponse(format!(
                "label not created for shipment {}",
                shipment_id
            ))),
        }
    }

    async fn schedule_pickup(
        &self,
        token: &str,
        shipment_id: i64,
    ) -> Result<PickupConfirmation, GatewayError> {
        let response = self
            .client
            .post(self.url("/courier/generate/pickup"))
            .bearer_auth(token)
            .json(&ShipmentIds {
                shipment_id: [shipment_id],
            })
            .send()
            .await
            .map_err(network)?;
        let body: PickupResponse = decode(response).await?;
        Ok(PickupConfirmation {
            status: body.pickup_status,
        })
    }
}
