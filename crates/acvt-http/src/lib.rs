//! HTTP transport to the ACVT backend REST API.
//!
//! One request, one answer: there is no retry or backoff here. Callers decide
//! what a failure means for the screen they are rendering.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub use reqwest::Method;

pub const CRATE_NAME: &str = "acvt-http";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub bearer_token: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            bearer_token: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus {
        status: u16,
        url: String,
        detail: Option<String>,
    },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }

    /// Message suitable for an alert banner. `subject` names what was being
    /// loaded or saved, e.g. "vendors".
    pub fn user_message(&self, subject: &str) -> String {
        match self {
            Self::HttpStatus {
                detail: Some(detail),
                ..
            } => detail.clone(),
            Self::HttpStatus { status, .. } => match *status {
                400 | 422 => format!("Invalid {subject} data. Please check all required fields."),
                401 | 403 => format!("You are not authorized to access {subject}."),
                404 => format!("The requested {subject} could not be found."),
                s if s >= 500 => {
                    "Server error. Please try again later or contact support.".to_string()
                }
                s => format!("Request for {subject} failed with status {s}."),
            },
            Self::Request(err) => format!("Network error: {err}"),
            Self::Decode { .. } => format!("Unexpected {subject} data returned by the server."),
        }
    }
}

/// Pull a human-readable `detail` out of an error body.
///
/// The backend sends either `{"detail": "..."}` or a list of validation
/// entries carrying `msg`.
pub fn extract_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        serde_json::Value::Array(items) => {
            let messages = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect::<Vec<_>>();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .with_context(|| format!("parsing backend base url {base_url:?}"))?;

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url,
            bearer_token: config.bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let body = self.execute(Method::GET, path, None::<&()>).await?;
        self.decode(path, &body)
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, payload: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(method, path, Some(payload)).await?;
        self.decode(path, &body)
    }

    /// DELETE and discard whatever body comes back.
    pub async fn delete(&self, path: &str) -> Result<(), FetchError> {
        self.execute(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, body: &[u8]) -> Result<T, FetchError> {
        serde_json::from_slice(body).map_err(|source| FetchError::Decode {
            url: self.url(path),
            source,
        })
    }

    async fn execute<B>(&self, method: Method, path: &str, payload: Option<&B>) -> Result<Vec<u8>, FetchError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let request_id = Uuid::new_v4();
        let span = info_span!("backend_request", %request_id, method = %method, url = %url);
        self.send_once(method, &url, payload).instrument(span).await
    }

    async fn send_once<B>(&self, method: Method, url: &str, payload: Option<&B>) -> Result<Vec<u8>, FetchError>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.client.request(method, url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await?.to_vec();

        if status.is_success() {
            debug!(status = status.as_u16(), bytes = body.len(), "backend response");
            return Ok(body);
        }

        let detail = extract_detail(&body);
        warn!(status = status.as_u16(), detail = detail.as_deref(), "backend rejected request");
        Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: final_url,
            detail,
        })
    }
}

/// `{collection}{id}` with `id` percent-encoded as one path segment, so `/`,
/// `?` and `#` inside an id cannot reach another resource. `None` for ids that
/// cannot name a record (empty, `.` or `..`).
pub fn item_path(collection: &str, id: &str) -> Option<String> {
    if matches!(id, "" | "." | "..") {
        return None;
    }
    let mut url = reqwest::Url::parse("http://backend.invalid").ok()?;
    url.set_path(collection);
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push(id);
    Some(url.path().to_string())
}

pub fn is_not_found(err: &FetchError) -> bool {
    err.status() == Some(StatusCode::NOT_FOUND.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde::Deserialize;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
    }

    async fn spawn_stub() -> String {
        let app = Router::new()
            .route(
                "/complaints/all",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if auth != "Bearer secret" {
                        return (AxumStatus::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"})));
                    }
                    (AxumStatus::OK, Json(json!([{"id": "c-1"}, {"id": "c-2"}])))
                }),
            )
            .route(
                "/vendor/",
                post(|Json(body): Json<serde_json::Value>| async move {
                    Json(json!({"id": "v-1", "name": body["name"]}))
                }),
            )
            .route(
                "/vendor/{id}",
                axum::routing::delete(|Path(id): Path<String>| async move {
                    if id == "v-1" {
                        AxumStatus::NO_CONTENT
                    } else {
                        AxumStatus::NOT_FOUND
                    }
                }),
            )
            .route(
                "/admin/statistics",
                get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route("/garbage", get(|| async { "not json" }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client(base_url: String, token: Option<&str>) -> HttpClient {
        HttpClient::new(HttpClientConfig {
            base_url,
            bearer_token: token.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = HttpClient::new(HttpClientConfig {
            base_url: "not a url".into(),
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn joins_paths_onto_base_url() {
        let c = client("http://backend:8000/".into(), None);
        assert_eq!(c.base_url(), "http://backend:8000");
        assert_eq!(c.url("/vendor/"), "http://backend:8000/vendor/");
        assert_eq!(c.url("complaints/all"), "http://backend:8000/complaints/all");
    }

    #[test]
    fn item_paths_keep_ids_inside_one_segment() {
        assert_eq!(item_path("/vendor/", "v-1").as_deref(), Some("/vendor/v-1"));
        assert_eq!(
            item_path("/employees/", "../complaints/all").as_deref(),
            Some("/employees/..%2Fcomplaints%2Fall")
        );
        assert_eq!(
            item_path("/vendor/", "v-1?force=true#x").as_deref(),
            Some("/vendor/v-1%3Fforce=true%23x")
        );
        assert_eq!(item_path("/vendor/", "%2e%2e").as_deref(), Some("/vendor/%252e%252e"));
        assert_eq!(item_path("/vendor/", ".."), None);
        assert_eq!(item_path("/vendor/", ""), None);
    }

    #[test]
    fn detail_extraction_handles_both_shapes() {
        assert_eq!(
            extract_detail(br#"{"detail": "Email already registered"}"#).as_deref(),
            Some("Email already registered")
        );
        assert_eq!(
            extract_detail(br#"{"detail": [{"msg": "field required"}, {"msg": "bad email"}]}"#).as_deref(),
            Some("field required; bad email")
        );
        assert_eq!(extract_detail(b"boom"), None);
        assert_eq!(extract_detail(br#"{"detail": ""}"#), None);
    }

    #[test]
    fn user_messages_follow_status() {
        let status = |status: u16, detail: Option<&str>| FetchError::HttpStatus {
            status,
            url: "http://x".into(),
            detail: detail.map(str::to_string),
        };
        assert_eq!(status(400, Some("Duplicate email")).user_message("vendor"), "Duplicate email");
        assert_eq!(
            status(403, None).user_message("vendors"),
            "You are not authorized to access vendors."
        );
        assert_eq!(
            status(503, None).user_message("vendors"),
            "Server error. Please try again later or contact support."
        );
        assert!(status(400, None).user_message("vendor").starts_with("Invalid vendor data"));
    }

    #[tokio::test]
    async fn get_json_sends_bearer_token() {
        let base = spawn_stub().await;
        let rows: Vec<Row> = client(base.clone(), Some("secret"))
            .get_json("/complaints/all")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let err = client(base, None)
            .get_json::<Vec<Row>>("/complaints/all")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.user_message("complaints"), "Not authenticated");
    }

    #[tokio::test]
    async fn send_json_round_trips_payload() {
        let base = spawn_stub().await;
        let created: serde_json::Value = client(base, None)
            .send_json(Method::POST, "/vendor/", &json!({"name": "CoolAir"}))
            .await
            .unwrap();
        assert_eq!(created["name"], "CoolAir");
    }

    #[tokio::test]
    async fn delete_accepts_empty_body_and_reports_missing() {
        let base = spawn_stub().await;
        let c = client(base, None);
        c.delete("/vendor/v-1").await.unwrap();
        let err = c.delete("/vendor/v-9").await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn server_errors_and_bad_json_are_typed() {
        let base = spawn_stub().await;
        let c = client(base, None);
        let err = c.get_json::<serde_json::Value>("/admin/statistics").await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 500, detail: None, .. }));

        let err = c.get_json::<Vec<Row>>("/garbage").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
