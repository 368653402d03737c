use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{SubsecRound, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use bazaar_db::AdFilter;
use bazaar_types::api::{AdResponse, Claims, CreateAdRequest, UpdateAdRequest};
use bazaar_types::models::Ad;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::indexer::SyncEvent;
use crate::state::{AppState, run_db};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_IMAGES: usize = 10;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub fn default_limit() -> u32 {
    50
}

impl ListQuery {
    pub fn to_filter(&self) -> AdFilter {
        AdFilter {
            category: normalize_category(self.category.clone()),
            min_price: self.min_price,
            max_price: self.max_price,
            owner_id: None,
            limit: self.limit.min(MAX_PAGE_SIZE),
            offset: self.offset,
        }
    }
}

/// GET /ads: ranked listing.
pub async fn list_ads(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.to_filter();
    let now = Utc::now();
    let ads = run_db(&state, move |db| db.list_ads(&filter, now)).await?;
    Ok(Json(to_responses(ads, now)))
}

pub async fn get_ad(
    State(state): State<AppState>,
    ApiPath(ad_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ad = run_db(&state, move |db| db.get_ad(ad_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(AdResponse::new(ad, Utc::now())))
}

pub async fn create_ad(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateAdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ad = Ad {
        id: Uuid::new_v4(),
        owner_id: claims.sub,
        title: validate_title(&req.title)?,
        description: validate_description(req.description)?,
        price: validate_price(req.price)?,
        category: normalize_category(req.category),
        image_urls: validate_image_urls(req.image_urls)?,
        animation_url: validate_animation_url(req.animation_url)?,
        // Stored with microsecond precision; keep the response identical.
        created_at: Utc::now().trunc_subsecs(6),
        is_topped: false,
        topped_expires_at: None,
    };

    let stored = ad.clone();
    run_db(&state, move |db| db.insert_ad(&stored)).await?;
    info!("Ad {} created by {}", ad.id, claims.sub);

    state.indexer.enqueue(SyncEvent::Upsert(ad.clone()));
    Ok((StatusCode::CREATED, Json(AdResponse::new(ad, Utc::now()))))
}

/// PATCH /ads/{id}: owner only. Other users get a 404, as if the ad did
/// not exist.
pub async fn update_ad(
    State(state): State<AppState>,
    ApiPath(ad_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateAdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut ad = run_db(&state, move |db| db.get_ad(ad_id))
        .await?
        .filter(|ad| ad.owner_id == claims.sub)
        .ok_or(ApiError::NotFound)?;

    apply_update(&mut ad, req)?;

    let stored = ad.clone();
    let owner = claims.sub;
    if !run_db(&state, move |db| db.save_ad(&stored, owner)).await? {
        // Deleted between the read and the write.
        return Err(ApiError::NotFound);
    }

    state.indexer.enqueue(SyncEvent::Upsert(ad.clone()));
    Ok(Json(AdResponse::new(ad, Utc::now())))
}

pub async fn delete_ad(
    State(state): State<AppState>,
    ApiPath(ad_id): ApiPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub;
    if !run_db(&state, move |db| db.delete_ad(ad_id, owner)).await? {
        return Err(ApiError::NotFound);
    }

    info!("Ad {} deleted by {}", ad_id, owner);
    state.indexer.enqueue(SyncEvent::Delete(ad_id));
    Ok(StatusCode::NO_CONTENT)
}

/// GET /me/ads: the caller's ads, newest first.
pub async fn my_ads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub;
    let ads = run_db(&state, move |db| db.list_ads_by_owner(owner)).await?;
    Ok(Json(to_responses(ads, Utc::now())))
}

pub fn to_responses(ads: Vec<Ad>, now: chrono::DateTime<Utc>) -> Vec<AdResponse> {
    ads.into_iter().map(|ad| AdResponse::new(ad, now)).collect()
}

fn apply_update(ad: &mut Ad, req: UpdateAdRequest) -> Result<(), ApiError> {
    if let Some(title) = req.title {
        ad.title = validate_title(&title)?;
    }
    if let Some(description) = req.description {
        ad.description = validate_description(description)?;
    }
    if let Some(price) = req.price {
        ad.price = validate_price(price)?;
    }
    if let Some(category) = req.category {
        ad.category = normalize_category(category);
    }
    if let Some(urls) = req.image_urls {
        ad.image_urls = validate_image_urls(urls)?;
    }
    if let Some(url) = req.animation_url {
        ad.animation_url = validate_animation_url(url)?;
    }
    Ok(())
}

// -- Validation --

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required."));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "Title must be at most {} characters.",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: String) -> Result<String, ApiError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("Description is too long."));
    }
    Ok(description)
}

fn validate_price(price: Option<f64>) -> Result<Option<f64>, ApiError> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(ApiError::bad_request("Price must be a non-negative number."))
        }
        other => Ok(other),
    }
}

/// Blank categories are stored as no category.
fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn validate_image_urls(urls: Vec<String>) -> Result<Vec<String>, ApiError> {
    if urls.len() > MAX_IMAGES {
        return Err(ApiError::bad_request(format!("At most {} images are allowed.", MAX_IMAGES)));
    }
    if urls.iter().any(|u| !is_http_url(u)) {
        return Err(ApiError::bad_request("Image URLs must be http(s) URLs."));
    }
    Ok(urls)
}

fn validate_animation_url(url: Option<String>) -> Result<Option<String>, ApiError> {
    match url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        Some(u) if !is_http_url(&u) => {
            Err(ApiError::bad_request("Animation URL must be an http(s) URL."))
        }
        other => Ok(other),
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    rest.is_some_and(|r| !r.is_empty() && !r.chars().any(char::is_whitespace))
}
