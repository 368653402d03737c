mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use bazaar_api::images::ImageCdn;
use bazaar_api::indexer::Indexer;
use bazaar_api::search::SearchIndex;
use bazaar_api::{AppState, AppStateInner};
use bazaar_stripe::StripeClient;

use crate::config::Config;

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "bazaar=debug,bazaar_api=debug,bazaar_db=info,bazaar_stripe=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            eprintln!("FATAL: {:#}. Set it in your .env file and restart.", e);
            std::process::exit(1);
        }
    };

    // Init database
    let db = bazaar_db::Database::open(&config.db_path)?;

    let indexer = match config.search.as_ref() {
        Some(s) => Indexer::spawn(SearchIndex::new(
            s.app_id.clone(),
            s.admin_key.clone(),
            s.index_name.clone(),
        )),
        None => Indexer::disabled(),
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        stripe: config.stripe.as_ref().map(|s| StripeClient::new(s.secret_key.clone())),
        stripe_webhook_secret: config.stripe.as_ref().and_then(|s| s.webhook_secret.clone()),
        stripe_price_id: config.stripe.as_ref().and_then(|s| s.price_id.clone()),
        images: config.images.map(|i| ImageCdn::new(i.account_id, i.api_token)),
        search: config
            .search
            .map(|s| SearchIndex::new(s.app_id, s.admin_key, s.index_name)),
        indexer,
    });

    let app = bazaar_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Bazaar server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
