use async_trait::async_trait;
use kart_core::retry::{retry, RetryPolicy};
use kart_core::shipping::{NoToken, ShippingAggregator, ShippingCredentials, ShippingTokenProvider};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{error, info};

/// Tokens are treated as valid for 24h, well inside the provider's own validity window.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// In-process cache of the aggregator auth token.
///
/// Readers share the lock. When the token has expired, concurrent callers may
/// each log in; the last successful login wins and the cached pair is always
/// replaced as a whole.
pub struct TokenCache {
    aggregator: Arc<dyn ShippingAggregator>,
    credentials: ShippingCredentials,
    ttl: Duration,
    retry: RetryPolicy,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        aggregator: Arc<dyn ShippingAggregator>,
        credentials: ShippingCredentials,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_ttl(aggregator, credentials, retry, TOKEN_TTL)
    }

    pub fn with_ttl(
        aggregator: Arc<dyn ShippingAggregator>,
        credentials: ShippingCredentials,
        retry: RetryPolicy,
        ttl: Duration,
    ) -> Self {
        Self {
            aggregator,
            credentials,
            ttl,
            retry,
            cached: RwLock::new(None),
        }
    }

    async fn login(&self) -> Result<String, NoToken> {
        let aggregator = &self.aggregator;
        let email = self.credentials.email.as_str();
        let password = self.credentials.password.expose().as_str();

        let token = retry(&self.retry, "shipping_login", || aggregator.login(email, password))
            .await
            .map_err(|e| {
                error!(error = %e, "Shipping aggregator login failed");
                NoToken(e.to_string())
            })?;

        let expires_at = Instant::now() + self.ttl;
        *self.cached.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        info!("Shipping aggregator token refreshed");

        Ok(token)
    }
}

#[async_trait]
impl ShippingTokenProvider for TokenCache {
    async fn get(&self) -> Result<String, NoToken> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if Instant::now() < cached.expires_at {
                    return Ok(cached.token.clone());
                }
            }
        }

        self.login().await
    }

    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
