use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::GatewayError;

/// A payment provider's pre-capture transaction record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String, // Provider's ID (e.g., order_Nx1...)
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent. `amount` is in minor units.
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;
}
