//! meshgen backend API façade.
//!
//! Frontends depend on the [`MeshApi`] trait only. [`HttpApi`] talks to a
//! running generator over HTTP; [`MockApi`] serves scripted responses for tests.

#![forbid(unsafe_code)]

use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use meshgen_core::{Method, RequestDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Raw HTTP outcome. Any status is a valid response; interpretation is up to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One rejected request parameter, as reported by the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidParameter {
    pub field: String,
    pub reason: String,
}

/// Error document returned by the generator on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_parameters: Option<Vec<InvalidParameter>>,
}

impl ErrorResponse {
    /// Best-effort typed view of an error body; other JSON shapes yield None.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn summary(&self) -> String {
        match self.invalid_parameters.as_deref() {
            Some(params) if !params.is_empty() => {
                let fields: Vec<String> = params.iter().map(|p| format!("{}: {}", p.field, p.reason)).collect();
                format!("{} ({})", self.details, fields.join(", "))
            }
            _ => self.details.clone(),
        }
    }
}

/// Errors that prevent an HTTP response from being obtained at all.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("config: {0}")]
    Config(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("read: {0}")]
    Read(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Backend surface consumed by the page controller.
#[async_trait::async_trait]
pub trait MeshApi: Send + Sync {
    /// Issue the described request. Non-2xx statuses are returned as `Ok`.
    async fn fetch(&self, request: &RequestDescriptor) -> ApiResult<ApiResponse>;
}

// ----------------- HTTP implementation -----------------

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_BASE.to_string(), timeout_ms: DEFAULT_TIMEOUT_MS }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// `MESHGEN_API_BASE` and `MESHGEN_TIMEOUT_MS`, falling back to defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var("MESHGEN_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let timeout_ms = std::env::var("MESHGEN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self { base_url, timeout_ms }
    }
}

pub struct HttpApi {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Config("base url is empty".into()));
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl MeshApi for HttpApi {
    async fn fetch(&self, request: &RequestDescriptor) -> ApiResult<ApiResponse> {
        let t0 = Instant::now();
        let url = meshgen_core::absolute(&self.base_url, request).map_err(|e| ApiError::Config(e.to_string()))?;
        debug!(method = %request.method, url = %url, "api: fetch start");
        let builder = match request.method {
            Method::Get => self.http.get(url.clone()),
            Method::Post => {
                let b = self.http.post(url.clone()).header(reqwest::header::CONTENT_TYPE, "application/json");
                match &request.body {
                    Some(body) => b.body(body.clone()),
                    None => b,
                }
            }
        };
        let resp = builder
            .header("x-request-id", format!("req_{}", uuid::Uuid::new_v4().simple()))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "api: transport failure");
                counter!("meshgen_transport_errors_total", 1);
                ApiError::Transport(e.to_string())
            })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ApiError::Read(e.to_string()))?;
        let took = t0.elapsed().as_secs_f64() * 1000.0;
        counter!("meshgen_requests_total", 1);
        histogram!("meshgen_request_ms", took);
        info!(method = %request.method, path = %request.path, status, bytes = body.len(), took_ms = took as u64, "api: fetch done");
        Ok(ApiResponse { status, body })
    }
}

// ----------------- Mock implementation -----------------

/// Scripted response for requests whose path matches.
#[derive(Debug, Clone)]
pub struct MockRoute {
    pub path: String,
    pub response: ApiResult<ApiResponse>,
    pub delay: Option<Duration>,
}

/// In-memory backend for tests. Routes are matched by exact path; unmatched
/// requests get a 404 error document. Every request is recorded.
#[derive(Default)]
pub struct MockApi {
    routes: Mutex<Vec<MockRoute>>,
    requests: Mutex<Vec<RequestDescriptor>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, response: ApiResponse) -> Self {
        self.push(MockRoute { path: path.to_string(), response: Ok(response), delay: None });
        self
    }

    pub fn route_delayed(self, path: &str, response: ApiResponse, delay: Duration) -> Self {
        self.push(MockRoute { path: path.to_string(), response: Ok(response), delay: Some(delay) });
        self
    }

    pub fn route_error(self, path: &str, error: ApiError) -> Self {
        self.push(MockRoute { path: path.to_string(), response: Err(error), delay: None });
        self
    }

    /// Later routes for the same path take precedence.
    pub fn push(&self, route: MockRoute) {
        self.routes.lock().unwrap().insert(0, route);
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RequestDescriptor> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

#[async_trait::async_trait]
impl MeshApi for MockApi {
    async fn fetch(&self, request: &RequestDescriptor) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let route = self.routes.lock().unwrap().iter().find(|r| r.path == request.path).cloned();
        match route {
            Some(r) => {
                if let Some(d) = r.delay {
                    tokio::time::sleep(d).await;
                }
                r.response
            }
            None => Ok(ApiResponse::with_status(
                404,
                serde_json::json!({ "status": 404, "details": format!("no route for {}", request.path) }).to_string(),
            )),
        }
    }
}
