use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use kart_order::{CheckoutInput, CheckoutReceipt, PipelineCoordinator};
use std::sync::Arc;
use tracing::info;

use crate::auth::MaybeAuth;
use crate::error::AppError;
use crate::state::AppState;

pub(crate) fn pipeline(state: &AppState) -> Result<&Arc<PipelineCoordinator>, AppError> {
    state.pipeline.as_ref().ok_or_else(|| {
        AppError::ServiceError("Payment or shipping credentials not configured".to_string())
    })
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| AppError::ValidationError(e.body_text()))
}

pub async fn create_order(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    body: Result<Json<CheckoutInput>, JsonRejection>,
) -> Result<Json<CheckoutReceipt>, AppError> {
    let pipeline = pipeline(&state)?;
    let input = json_body(body)?;

    let receipt = pipeline.checkout(&input, auth.as_ref()).await?;
    info!(order_id = %receipt.order_id, payment_mode = %input.payment_mode, "Checkout completed");

    Ok(Json(receipt))
}
