use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{error, info};

use bazaar_types::api::UploadImageResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// 10 MB limit per image
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

const CLOUDFLARE_API: &str = "https://api.cloudflare.com/client/v4";

#[derive(Deserialize)]
struct CdnResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<CdnMessage>,
    result: Option<CdnResult>,
}

#[derive(Deserialize)]
struct CdnMessage {
    message: String,
}

#[derive(Deserialize)]
struct CdnResult {
    #[serde(default)]
    variants: Vec<String>,
}

/// Cloudflare Images upload client.
#[derive(Clone)]
pub struct ImageCdn {
    http: reqwest::Client,
    account_id: String,
    api_token: String,
    base_url: String,
}

impl ImageCdn {
    pub fn new(account_id: String, api_token: String) -> Self {
        Self::with_base_url(account_id, api_token, CLOUDFLARE_API.to_string())
    }

    pub fn with_base_url(account_id: String, api_token: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_id,
            api_token,
            base_url,
        }
    }

    /// Upload one image and return its first delivery variant URL.
    pub async fn upload(
        &self,
        file_name: String,
        content_type: Option<String>,
        data: Vec<u8>,
    ) -> Result<String, ApiError> {
        let mut part = reqwest::multipart::Part::bytes(data).file_name(file_name);
        if let Some(ct) = content_type {
            part = part
                .mime_str(&ct)
                .map_err(|_| ApiError::bad_request("Invalid image content type."))?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/accounts/{}/images/v1", self.base_url, self.account_id))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("image CDN request failed: {}", e))?;

        let status = resp.status();
        let body: CdnResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed image CDN response ({}): {}", status, e))?;

        parse_upload(status, body)
    }
}

fn parse_upload(status: reqwest::StatusCode, body: CdnResponse) -> Result<String, ApiError> {
    if !status.is_success() || !body.success {
        let message = body
            .errors
            .into_iter()
            .next()
            .map(|m| m.message)
            .unwrap_or_else(|| "Failed to upload image to the image CDN.".into());
        error!("Image CDN upload error ({}): {}", status, message);
        // A failed upload reported with a 2xx is still an error for our client.
        let status = StatusCode::from_u16(status.as_u16())
            .ok()
            .filter(|s| !s.is_success())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        return Err(ApiError::Upstream { status, message });
    }

    body.result
        .and_then(|r| r.variants.into_iter().next())
        .ok_or_else(|| ApiError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: "Image CDN returned no variants.".into(),
        })
}

/// POST /images: multipart form with an `image` field; proxies it to the CDN.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadImageResponse>, ApiError> {
    let cdn = state
        .images
        .as_ref()
        .ok_or(ApiError::Unavailable("Image CDN credentials not set."))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        if data.is_empty() {
            return Err(ApiError::bad_request("No image file provided."));
        }
        if data.len() > MAX_IMAGE_SIZE {
            return Err(ApiError::PayloadTooLarge);
        }

        let size = data.len();
        let url = cdn.upload(file_name, content_type, data.to_vec()).await?;
        info!("Uploaded image ({} bytes) to {}", size, url);
        return Ok(Json(UploadImageResponse { url }));
    }

    Err(ApiError::bad_request("No image file provided."))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> CdnResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn first_variant_is_returned() {
        let resp = body(
            r#"{"success": true, "errors": [], "result": {"id": "abc",
                "variants": ["https://imagedelivery.net/h/abc/public",
                             "https://imagedelivery.net/h/abc/thumb"]}}"#,
        );
        let url = parse_upload(reqwest::StatusCode::OK, resp).unwrap();
        assert_eq!(url, "https://imagedelivery.net/h/abc/public");
    }

    #[test]
    fn cdn_error_keeps_status_and_message() {
        let resp = body(
            r#"{"success": false,
                "errors": [{"code": 10000, "message": "Authentication error"}]}"#,
        );
        match parse_upload(reqwest::StatusCode::FORBIDDEN, resp) {
            Err(ApiError::Upstream { status, message }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "Authentication error");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsuccessful_2xx_is_bad_gateway() {
        let resp = body(r#"{"success": false, "errors": []}"#);
        let err = parse_upload(reqwest::StatusCode::OK, resp).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
