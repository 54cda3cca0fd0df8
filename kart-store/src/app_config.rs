use kart_core::retry::RetryPolicy;
use kart_core::shipping::ShippingCredentials;
use kart_core::Masked;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub shipping: ShippingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider that issues customer JWTs.
    pub jwt_secret: Masked<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: Masked<String>,
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,
}

impl PaymentConfig {
    pub fn is_complete(&self) -> bool {
        !self.key_id.trim().is_empty() && !self.key_secret.is_empty()
    }
}

fn default_payment_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStore {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShippingConfig {
    pub email: String,
    pub password: Masked<String>,
    #[serde(default = "default_shipping_base_url")]
    pub base_url: String,
    #[serde(default = "default_pickup_location")]
    pub pickup_location: String,
    pub pickup_pincode: i64,
    #[serde(default)]
    pub token_store: TokenStore,
}

impl ShippingConfig {
    pub fn credentials(&self) -> ShippingCredentials {
        ShippingCredentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

fn default_shipping_base_url() -> String {
    "https://apiv2.shiprocket.in/v1/external".to_string()
}

fn default_pickup_location() -> String {
    "Primary".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `KART__PAYMENT__KEY_SECRET=...` sets `payment.key_secret`
            .add_source(config::Environment::with_prefix("KART").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_matches_default_policy() {
        assert_eq!(RetryConfig::default().policy(), RetryPolicy::default());
    }

    #[test]
    fn test_retry_config_keeps_at_least_one_attempt() {
        let cfg = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(cfg.policy().max_attempts, 1);
    }

    #[test]
    fn test_deserializes_from_layered_sources() {
        let raw = r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/kart"
            [auth]
            jwt_secret = "dev"
            [payment]
            key_id = "rzp_test_1"
            key_secret = "s3cret"
            [shipping]
            email = "ops@kart.test"
            password = "pw"
            pickup_pincode = 110001
            token_store = "redis"
        "#;
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.max_connections, 5);
        assert!(cfg.redis.is_none());
        assert!(cfg.payment.is_complete());
        assert_eq!(cfg.payment.base_url, "https://api.razorpay.com");
        assert_eq!(cfg.shipping.token_store, TokenStore::Redis);
        assert_eq!(cfg.shipping.pickup_location, "Primary");
        assert!(cfg.shipping.credentials().is_complete());
        assert_eq!(cfg.retry.max_attempts, 3);
    }
}
