//! Feed Coordinator node
//!
//! Composition root: constructs the shared store, registry, catalog client,
//! and feed task once, injects them into the coordination components, and
//! spawns the long-lived tasks. Runs until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_coordinator::catalog::{CatalogSource, HttpCatalog};
use feed_coordinator::coordination::CoordinationStore;
use feed_coordinator::registry::InstrumentRegistry;
use feed_coordinator::{
    AppConfig, FeedClient, Listener, LivenessMonitor, NodeId, PgRegistry, RedisStore,
    SubscriptionCoordinator, SyncEngine, WsConnector,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let node_id = NodeId::generate();
    info!("starting feed coordinator node {node_id}");

    let store: Arc<dyn CoordinationStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("failed to connect the coordination store")?,
    );
    let registry: Arc<dyn InstrumentRegistry> = Arc::new(
        PgRegistry::connect(&config.database_url)
            .await
            .context("failed to connect the instrument registry")?,
    );
    let catalog: Arc<dyn CatalogSource> =
        Arc::new(HttpCatalog::new(&config.catalog).context("failed to build the catalog client")?);

    let (feed_client, feed) = FeedClient::new(
        Box::new(WsConnector::new(config.feed.ws_url.clone())),
        Arc::clone(&store),
        node_id.clone(),
        &config.feed,
    );
    tokio::spawn(feed_client.run());

    let coordinator =
        SubscriptionCoordinator::new(Arc::clone(&store), feed.clone(), node_id.clone());
    let listener = Listener::new(
        Arc::clone(&store),
        coordinator,
        feed,
        node_id,
        Duration::from_millis(config.listener_poll_interval_ms),
    );
    tokio::spawn(listener.run());

    let sync = Arc::new(SyncEngine::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        catalog,
        config.cache_ttl_secs,
    ));

    let underlying_sync = Arc::clone(&sync);
    let underlying_interval = config.sync.underlying_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(underlying_interval));
        loop {
            ticker.tick().await;
            if let Err(err) = underlying_sync.sync_underlyings().await {
                error!("underlying sync failed: {err}");
            }
        }
    });

    let derivative_sync = Arc::clone(&sync);
    let derivative_interval = config.sync.derivative_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(derivative_interval));
        loop {
            ticker.tick().await;
            if let Err(err) = derivative_sync.sync_derivatives().await {
                error!("derivative sync failed: {err}");
            }
        }
    });

    let monitor = LivenessMonitor::new(Arc::clone(&store), config.liveness.heartbeat_timeout_secs);
    let liveness_interval = config.liveness.check_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(liveness_interval));
        loop {
            ticker.tick().await;
            monitor.check_once().await;
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    Ok(())
}
