//! Solestore - footwear storefront service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solestore::config::Config;
use solestore::services::{EventPublisher, NatsPublisher, NoopPublisher};
use solestore::store::{MemoryStore, PgStore, Storage};
use solestore::{api, worker, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Storage> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    let state = AppState::new(store, events, config.auth.clone(), config.store.clone(), &config.payment_secret);
    if let Some(seed) = &config.admin_seed {
        state.auth.seed_admin(seed).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(worker::reservation_sweeper(state.orders.clone(), config.store.sweep_interval, shutdown_rx));

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("solestore listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    shutdown_tx.send(true).ok();
    sweeper.await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => { signal.recv().await; }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
