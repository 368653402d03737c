#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use bazaar_api::indexer::Indexer;
use bazaar_api::{AppState, AppStateInner, router};
use bazaar_db::Database;
use bazaar_stripe::webhook::signature_header;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub fn app() -> (Router, AppState) {
    app_with(|_| {})
}

/// App over an in-memory database with every managed service unset;
/// `configure` can plug in clients before the state is frozen.
pub fn app_with(configure: impl FnOnce(&mut AppStateInner)) -> (Router, AppState) {
    let mut inner = AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "integration-secret".into(),
        stripe: None,
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        stripe_price_id: None,
        images: None,
        search: None,
        indexer: Indexer::disabled(),
    };
    configure(&mut inner);
    let state: AppState = Arc::new(inner);
    (router(state.clone()), state)
}

/// Serve `mock` on an ephemeral local port and return its base URL.
pub async fn serve_mock(mock: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Every error response must carry a JSON body, so parsing failures panic.
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("non-JSON body ({e}): {}", String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    raw_request(method, uri, token, body.to_string())
}

pub fn raw_request(method: &str, uri: &str, token: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// `POST /images` with a single file part named `field`.
pub fn image_upload(token: &str, field: &str, data: &[u8]) -> Request<Body> {
    let boundary = "XBOUNDARY";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
         filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/images")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn register(app: &Router, email: &str) -> String {
    let body = json!({ "email": email, "password": "hunter22!" });
    let (status, body) = send(app, json_request("POST", "/auth/register", None, body)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

pub async fn create_ad(app: &Router, token: &str, body: Value) -> Value {
    let (status, body) = send(app, json_request("POST", "/ads", Some(token), body)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

pub fn webhook(payload: &str, secret: &str) -> Request<Body> {
    let now = chrono::Utc::now().timestamp();
    let signature = signature_header(payload.as_bytes(), secret, now).unwrap();
    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("stripe-signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

pub fn succeeded_event(event_id: &str, ad_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_test_1",
            "amount": 499,
            "currency": "usd",
            "client_secret": null,
            "status": "succeeded",
            "metadata": { "ad_id": ad_id, "price_id": "price_top" }
        }}
    })
    .to_string()
}
