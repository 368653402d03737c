//! Full-text search over ads.
//!
//! When a hosted Algolia index is configured, queries go to it and the hit
//! ids are loaded back from the database so promotion state is current;
//! the hits are then re-ranked with the listing order. Without an index (or
//! when the index errors) the database substring search is used instead.

use anyhow::{Context, Result, bail};
use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use bazaar_db::AdFilter;
use bazaar_types::models::Ad;
use bazaar_types::ranking::rank_ads;

use crate::ads::{MAX_PAGE_SIZE, to_responses};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::{AppState, run_db};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    20
}

/// GET /search?q=...
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let text = query.q.trim().to_string();
    let filter = AdFilter {
        category: query.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        min_price: query.min_price,
        max_price: query.max_price,
        owner_id: None,
        limit: query.limit.min(MAX_PAGE_SIZE),
        offset: 0,
    };

    if text.is_empty() {
        let ads = run_db(&state, move |db| db.list_ads(&filter, now)).await?;
        return Ok(Json(to_responses(ads, now)));
    }

    if let Some(index) = &state.search {
        match index.query(&text, &filter).await {
            Ok(ids) => {
                let mut ads = run_db(&state, move |db| db.get_ads(&ids)).await?;
                rank_ads(&mut ads, now);
                return Ok(Json(to_responses(ads, now)));
            }
            Err(e) => warn!("Search index query failed, using database search: {:#}", e),
        }
    }

    let ads = run_db(&state, move |db| db.search_ads(&text, &filter, now)).await?;
    Ok(Json(to_responses(ads, now)))
}

/// Document stored in the hosted index for one ad.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub image_urls: Vec<String>,
    pub animation_url: Option<String>,
    pub is_topped: bool,
    pub topped_expires_at: Option<String>,
    pub created_at: String,
    /// Milliseconds since the epoch, for numeric sorting in the index.
    pub created_at_timestamp: i64,
}

impl From<&Ad> for IndexRecord {
    fn from(ad: &Ad) -> Self {
        Self {
            object_id: ad.id.to_string(),
            title: ad.title.clone(),
            description: ad.description.clone(),
            price: ad.price,
            category: ad.category.clone(),
            image_urls: ad.image_urls.clone(),
            animation_url: ad.animation_url.clone(),
            is_topped: ad.is_topped,
            topped_expires_at: ad.topped_expires_at.map(|t| t.to_rfc3339()),
            created_at: ad.created_at.to_rfc3339(),
            created_at_timestamp: ad.created_at.timestamp_millis(),
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
}

/// Client for one Algolia index.
#[derive(Clone)]
pub struct SearchIndex {
    http: reqwest::Client,
    app_id: String,
    api_key: String,
    index_name: String,
    write_host: String,
    read_host: String,
}

impl SearchIndex {
    pub fn new(app_id: String, api_key: String, index_name: String) -> Self {
        let write_host = format!("https://{}.algolia.net", app_id);
        let read_host = format!("https://{}-dsn.algolia.net", app_id);
        Self::with_hosts(app_id, api_key, index_name, write_host, read_host)
    }

    /// Explicit hosts for writes and queries, e.g. a local stand-in.
    pub fn with_hosts(
        app_id: String,
        api_key: String,
        index_name: String,
        write_host: String,
        read_host: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id,
            api_key,
            index_name,
            write_host,
            read_host,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn object_url(&self, object_id: &str) -> String {
        format!("{}/1/indexes/{}/{}", self.write_host, self.index_name, object_id)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("X-Algolia-Application-Id", &self.app_id)
            .header("X-Algolia-API-Key", &self.api_key)
    }

    /// Add or replace the record for `ad`.
    pub async fn save(&self, ad: &Ad) -> Result<()> {
        let record = IndexRecord::from(ad);
        let resp = self
            .request(reqwest::Method::PUT, self.object_url(&record.object_id))
            .json(&record)
            .send()
            .await
            .context("index save request failed")?;
        check_status(resp).await
    }

    pub async fn delete(&self, ad_id: Uuid) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, self.object_url(&ad_id.to_string()))
            .send()
            .await
            .context("index delete request failed")?;
        check_status(resp).await
    }

    /// Returns matching ad ids in the index's relevance order.
    pub async fn query(&self, text: &str, filter: &AdFilter) -> Result<Vec<Uuid>> {
        let mut body = serde_json::json!({
            "query": text,
            "hitsPerPage": filter.limit,
            "attributesToRetrieve": ["objectID"],
        });
        if let Some(filters) = build_filters(filter) {
            body["filters"] = serde_json::Value::String(filters);
        }

        let url = format!("{}/1/indexes/{}/query", self.read_host, self.index_name);
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await
            .context("index query request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("index query returned {}: {}", status, text);
        }

        let parsed: QueryResponse = resp.json().await.context("malformed index query response")?;
        debug!("Index returned {} hits for '{}'", parsed.hits.len(), text);

        Ok(parsed
            .hits
            .into_iter()
            .filter_map(|hit| match hit.object_id.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring index hit with non-UUID objectID '{}'", hit.object_id);
                    None
                }
            })
            .collect())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let text = resp.text().await.unwrap_or_default();
    bail!("index returned {}: {}", status, text)
}

/// Algolia filter expression for the listing filters, if any apply.
fn build_filters(filter: &AdFilter) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(category) = &filter.category {
        parts.push(format!("category:\"{}\"", category.replace('\\', "\\\\").replace('"', "\\\"")));
    }
    if let Some(min) = filter.min_price {
        parts.push(format!("price >= {}", min));
    }
    if let Some(max) = filter.max_price {
        parts.push(format!("price <= {}", max));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}
