use std::sync::Arc;

use tracing::error;

use bazaar_db::Database;
use bazaar_stripe::StripeClient;

use crate::error::ApiError;
use crate::images::ImageCdn;
use crate::indexer::Indexer;
use crate::search::SearchIndex;

pub type AppState = Arc<AppStateInner>;

/// Shared state for every handler. Managed services are optional; the
/// routes that need a missing one answer with a 500.
pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub stripe: Option<StripeClient>,
    pub stripe_webhook_secret: Option<String>,
    /// Promotion price used when a client does not name one.
    pub stripe_price_id: Option<String>,
    pub images: Option<ImageCdn>,
    pub search: Option<SearchIndex>,
    pub indexer: Indexer,
}

/// Run a blocking database call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}
