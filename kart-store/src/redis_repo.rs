use async_trait::async_trait;
use kart_core::retry::{retry, RetryPolicy};
use kart_core::shipping::{NoToken, ShippingAggregator, ShippingCredentials, ShippingTokenProvider};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const TOKEN_KEY: &str = "kart:shipping:token";

/// Aggregator token shared across API replicas through Redis. The key
/// expires on its own, so there is no separate timestamp to keep in sync.
pub struct RedisTokenCache {
    client: redis::Client,
    aggregator: Arc<dyn ShippingAggregator>,
    credentials: ShippingCredentials,
    retry: RetryPolicy,
    ttl: Duration,
}

impl RedisTokenCache {
    pub fn new(
        connection_string: &str,
        aggregator: Arc<dyn ShippingAggregator>,
        credentials: ShippingCredentials,
        retry: RetryPolicy,
        ttl: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            aggregator,
            credentials,
            retry,
            ttl,
        })
    }

    async fn cached(&self) -> redis::RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(TOKEN_KEY).await
    }

    async fn store(&self, token: &str) -> redis::RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(TOKEN_KEY, token, self.ttl.as_secs()).await
    }
}

#[async_trait]
impl ShippingTokenProvider for RedisTokenCache {
    async fn get(&self) -> Result<String, NoToken> {
        match self.cached().await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            // Redis down: fall through to a direct login rather than failing the shipment
            Err(e) => warn!(error = %e, "Token cache read failed"),
        }

        let email = self.credentials.email.as_str();
        let password = self.credentials.password.expose().as_str();
        let token = retry(&self.retry, "shipping_login", || self.aggregator.login(email, password))
            .await
            .map_err(|e| {
                error!(error = %e, "Shipping aggregator login failed");
                NoToken(e.to_string())
            })?;

        if let Err(e) = self.store(&token).await {
            warn!(error = %e, "Token cache write failed");
        }
        info!("Shipping aggregator token refreshed");
        Ok(token)
    }

    async fn invalidate(&self) {
        let result: redis::RedisResult<()> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.del(TOKEN_KEY).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "Token cache invalidate failed");
        }
    }
}
