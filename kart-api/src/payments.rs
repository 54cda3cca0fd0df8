use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use kart_order::VerifyPaymentInput;
use serde::Serialize;

use crate::auth::MaybeAuth;
use crate::error::AppError;
use crate::orders::{json_body, pipeline};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awb_code: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    body: Result<Json<VerifyPaymentInput>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let pipeline = pipeline(&state)?;
    let input = json_body(body)?;

    let verified = pipeline.verify_payment(&input, auth.as_ref()).await?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        awb_code: verified.shipment.and_then(|s| s.awb_code),
    }))
}
