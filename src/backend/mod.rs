//! Storage backend client
//!
//! Speaks the upload service's multipart contract: Init, SignPart,
//! Complete and Abort. Every call carries an explicit bearer credential.
//!
//! # Example
//!
//! ```no_run
//! use kata_uploadr::backend::{BackendConfig, BearerToken, HttpBackend, StorageBackend, InitRequest};
//! use kata_uploadr::upload::planner::DeviceClass;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(BackendConfig {
//!     base_url: "https://app.example.com/api/uploads".to_string(),
//!     request_timeout: std::time::Duration::from_secs(30),
//! })?;
//!
//! let token = BearerToken::new("user-session-token")?;
//! let session = backend
//!     .init(&token, &InitRequest {
//!         filename: "onboarding.mp4".to_string(),
//!         content_type: "video/mp4".to_string(),
//!         file_size: 26 * 1024 * 1024,
//!         device_class: DeviceClass::Standard,
//!     })
//!     .await?;
//! println!("upload id: {}", session.upload_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Endpoints
//!
//! | Operation | Route | Response |
//! |-----------|-------|----------|
//! | Init | `POST {base}/init` | `uploadId`, `objectKey`, `partSize`, `partCount` |
//! | SignPart | `POST {base}/sign-part` | `url` |
//! | Complete | `POST {base}/complete` | `finalObjectLocator` |
//! | Abort | `POST {base}/abort` | `204 No Content` |

use crate::upload::planner::DeviceClass;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod credentials;

pub use credentials::{BearerToken, CredentialsError, TokenSource};

/// Errors from a single HTTP exchange with the backend or storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Client error ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RequestError {
    /// Classify a non-success HTTP status.
    ///
    /// 408 counts as a timeout and 429 as server-side throttling; all other
    /// 4xx are client errors.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 => RequestError::Timeout,
            429 => RequestError::Server { status, message },
            400..=499 => RequestError::Client { status, message },
            _ => RequestError::Server { status, message },
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Network(_) | RequestError::Timeout | RequestError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout
        } else if e.is_decode() {
            RequestError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            RequestError::from_status(status.as_u16(), e.to_string())
        } else {
            RequestError::Network(e.to_string())
        }
    }
}

/// Init request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub device_class: DeviceClass,
}

/// Init response
///
/// `part_size`/`part_count` may be omitted, in which case the client plan applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub upload_id: String,
    pub object_key: String,
    #[serde(default)]
    pub part_size: Option<u64>,
    #[serde(default)]
    pub part_count: Option<u32>,
}

/// SignPart request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub object_key: String,
    pub upload_id: String,
    pub part_number: u32,
}

/// SignPart response: a short-lived URL for one PUT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPartResponse {
    pub url: String,
}

/// One entry of the Complete part list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub integrity_tag: String,
}

/// Complete request; `parts` sorted ascending by part number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub object_key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

/// Complete response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub final_object_locator: String,
}

/// Abort request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub object_key: String,
    pub upload_id: String,
}

/// Backend operations the coordinator depends on
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a multipart session
    async fn init(
        &self,
        token: &BearerToken,
        request: &InitRequest,
    ) -> Result<InitResponse, RequestError>;

    /// Obtain a signed URL for one part
    async fn sign_part(
        &self,
        token: &BearerToken,
        request: &SignPartRequest,
    ) -> Result<SignPartResponse, RequestError>;

    /// Stitch the uploaded parts into the final object
    async fn complete(
        &self,
        token: &BearerToken,
        request: &CompleteRequest,
    ) -> Result<CompleteResponse, RequestError>;

    /// Release the server-side reservation
    async fn abort(&self, token: &BearerToken, request: &AbortRequest) -> Result<(), RequestError>;
}

/// HTTP backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the multipart routes, without trailing slash
    pub base_url: String,
    pub request_timeout: Duration,
}

/// reqwest-based [`StorageBackend`]
pub struct HttpBackend {
    config: BackendConfig,
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a new backend client
    pub fn new(config: BackendConfig) -> Result<Self, RequestError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RequestError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn route(&self, name: &str) -> String {
        format!("{}/{}", self.base_url(), name)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        name: &str,
        token: &BearerToken,
        body: &B,
    ) -> Result<reqwest::Response, RequestError> {
        let response = self
            .http_client
            .post(self.route(name))
            .bearer_auth(token.expose())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(RequestError::from_status(status.as_u16(), message))
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        name: &str,
        token: &BearerToken,
        body: &B,
    ) -> Result<R, RequestError> {
        let response = self.post(name, token, body).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| RequestError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    #[tracing::instrument(
        name = "backend.init",
        skip(self, token, request),
        fields(
            upload.filename = %request.filename,
            upload.bytes = request.file_size,
            upload.id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn init(
        &self,
        token: &BearerToken,
        request: &InitRequest,
    ) -> Result<InitResponse, RequestError> {
        let response: InitResponse = self.post_json("init", token, request).await?;
        tracing::Span::current().record("upload.id", response.upload_id.as_str());
        tracing::debug!(
            object_key = %response.object_key,
            part_size = ?response.part_size,
            part_count = ?response.part_count,
            "Init completed"
        );
        Ok(response)
    }

    #[tracing::instrument(
        name = "backend.sign_part",
        skip(self, token, request),
        fields(
            upload.id = %request.upload_id,
            part_number = request.part_number,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn sign_part(
        &self,
        token: &BearerToken,
        request: &SignPartRequest,
    ) -> Result<SignPartResponse, RequestError> {
        self.post_json("sign-part", token, request).await
    }

    #[tracing::instrument(
        name = "backend.complete",
        skip(self, token, request),
        fields(
            upload.id = %request.upload_id,
            parts_count = request.parts.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn complete(
        &self,
        token: &BearerToken,
        request: &CompleteRequest,
    ) -> Result<CompleteResponse, RequestError> {
        let response: CompleteResponse = self.post_json("complete", token, request).await?;
        tracing::info!(
            locator = %response.final_object_locator,
            parts = request.parts.len(),
            "Complete finished"
        );
        Ok(response)
    }

    #[tracing::instrument(
        name = "backend.abort",
        skip(self, token, request),
        fields(
            upload.id = %request.upload_id,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn abort(&self, token: &BearerToken, request: &AbortRequest) -> Result<(), RequestError> {
        self.post("abort", token, request).await.map(|_| ())
    }
}
