use kart_core::GatewayError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ProviderErrorDetail>,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

/// Connect failures never reached the provider; anything later (timeouts,
/// reset streams) may have.
pub(crate) fn network(e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::Connect(e.to_string())
    } else {
        GatewayError::Network(e.to_string())
    }
}

/// Decode a successful body or turn the failure into a classified error.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(network)?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
    }

    let message = match serde_json::from_str::<ProviderError>(&body) {
        Ok(err) => err
            .message
            .or_else(|| err.error.and_then(|d| d.description))
            .unwrap_or(body),
        Err(_) => body,
    };

    match status {
        StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized(message)),
        _ => Err(GatewayError::Http {
            status: status.as_u16(),
            message,
        }),
    }
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
