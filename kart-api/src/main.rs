use anyhow::Context;
use kart_core::shipping::ShippingTokenProvider;
use kart_gateway::{RazorpayClient, ShiprocketClient};
use kart_order::{
    PaymentService, PipelineCoordinator, ShipmentOrchestrator, ShippingSettings, TokenCache,
};
use kart_store::app_config::Config;
use kart_store::{DbClient, PgOrderRepository, RedisTokenCache, TokenStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kart_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "kart_api=debug,kart_order=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Kart API on port {}", config.server.port);

    let db = DbClient::new(&config.database).await.context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let pipeline = build_pipeline(&config, db)?;
    if pipeline.is_none() {
        tracing::warn!("Payment or shipping credentials missing; order endpoints will answer 500");
    }

    let app = app(AppState::new(pipeline, config.auth.jwt_secret.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_pipeline(
    config: &Config,
    db: DbClient,
) -> anyhow::Result<Option<Arc<PipelineCoordinator>>> {
    let credentials = config.shipping.credentials();
    if !config.payment.is_complete() || !credentials.is_complete() {
        return Ok(None);
    }

    let retry = config.retry.policy();
    let repo = Arc::new(PgOrderRepository::new(db.pool));
    let aggregator = Arc::new(ShiprocketClient::new(&config.shipping.base_url)?);
    let gateway = Arc::new(RazorpayClient::new(
        &config.payment.base_url,
        &config.payment.key_id,
        config.payment.key_secret.clone(),
    )?);

    let tokens: Arc<dyn ShippingTokenProvider> = match config.shipping.token_store {
        TokenStore::Memory => {
            Arc::new(TokenCache::new(aggregator.clone(), credentials, retry.clone()))
        }
        TokenStore::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("shipping.token_store = \"redis\" needs a [redis] section")?;
            Arc::new(RedisTokenCache::new(
                &redis.url,
                aggregator.clone(),
                credentials,
                retry.clone(),
                kart_order::token_cache::TOKEN_TTL,
            )?)
        }
    };

    let payments = PaymentService::new(gateway, config.payment.key_secret.clone(), retry.clone());
    let shipments = ShipmentOrchestrator::new(
        aggregator,
        tokens,
        ShippingSettings {
            pickup_location: config.shipping.pickup_location.clone(),
            pickup_pincode: config.shipping.pickup_pincode,
        },
        retry,
    );

    Ok(Some(Arc::new(PipelineCoordinator::new(repo, payments, shipments))))
}
