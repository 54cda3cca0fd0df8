use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kart_order::PipelineError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    MethodNotAllowed,
    /// Payment verification rejected; answered with `success: false`.
    PaymentRejected(String),
    /// 500 whose message is safe to show (missing config or credentials).
    ServiceError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
            }
            AppError::PaymentRejected(msg) => {
                tracing::warn!("Payment rejected: {}", msg);
                let body = Json(json!({ "success": false, "error": msg }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::ServiceError(msg) => {
                tracing::error!("Service error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::MissingAuth => {
                AppError::ServiceError("Missing auth token".to_string())
            }
            PipelineError::Invalid(msg) => AppError::ValidationError(msg),
            e @ PipelineError::Conflict(_) => AppError::ConflictError(e.to_string()),
            PipelineError::InvalidSignature => {
                AppError::PaymentRejected("Invalid payment signature".to_string())
            }
            e @ (PipelineError::GatewayOrderMismatch(_) | PipelineError::NotGatewayOrder(_)) => {
                AppError::PaymentRejected(e.to_string())
            }
            e @ PipelineError::NotFound(_) => AppError::NotFoundError(e.to_string()),
            e @ (PipelineError::Persistence(_)
            | PipelineError::PaymentGateway(_)
            | PipelineError::Shipment(_)) => AppError::ServiceError(e.to_string()),
        }
    }
}
