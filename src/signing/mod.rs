//! Signed-URL client
//!
//! Requests one pre-signed PUT destination per file from the signing service
//! in a single batch call.
//!
//! # Example
//!
//! ```no_run
//! use signed_uploadr::signing::{SignFileRequest, SignedUrlClient, SignedUrlRequest, SigningEndpoint, UrlSigner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SignedUrlClient::new(SigningEndpoint::Production)?;
//! let request = SignedUrlRequest {
//!     api_key: "api-key".to_string(),
//!     provider_id: "provider".to_string(),
//!     files: vec![SignFileRequest {
//!         key: "avatar.png".to_string(),
//!         acl: Some("public-read".to_string()),
//!         content_type: "image/png".to_string(),
//!     }],
//! };
//! let batch = client.get_signed_urls(&request).await?;
//! println!("PUT to {}", batch.files[0].signed_url);
//! # Ok(())
//! # }
//! ```

use crate::error::{ErrorCode, ServiceError};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Production signing service
pub const PRODUCTION_SIGNING_URL: &str = "https://upload-api.betterstack.dev/v1/signed-urls";

/// Local signing service used for testing
pub const TEST_SIGNING_URL: &str = "http://localhost:3002/v1/signed-urls";

/// Signed-URL client errors
#[derive(Error, Debug)]
pub enum SigningError {
    /// Non-200 response; carries the code from the response body when present
    #[error("Signing service rejected request ({status}): {code:?}")]
    Rejected { status: u16, code: Option<String> },

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<SigningError> for ServiceError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::Rejected {
                code: Some(code), ..
            } => ServiceError::new(ErrorCode::Service(code)),
            other => ServiceError::internal(other),
        }
    }
}

/// Which signing service to talk to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningEndpoint {
    #[default]
    Production,
    Test,
    Custom(String),
}

impl SigningEndpoint {
    /// Pick the endpoint from an explicit override or the test flag
    pub fn resolve(custom: Option<&str>, is_test: bool) -> Self {
        match custom {
            Some(url) => SigningEndpoint::Custom(url.to_string()),
            None if is_test => SigningEndpoint::Test,
            None => SigningEndpoint::Production,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            SigningEndpoint::Production => PRODUCTION_SIGNING_URL,
            SigningEndpoint::Test => TEST_SIGNING_URL,
            SigningEndpoint::Custom(url) => url,
        }
    }
}

/// Batch signing request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    pub api_key: String,
    pub provider_id: String,
    pub files: Vec<SignFileRequest>,
}

/// One file in a signing request
#[derive(Debug, Clone, Serialize)]
pub struct SignFileRequest {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Successful signing response
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrlBatch {
    pub files: Vec<SignedUrl>,
}

/// Signed destination for one file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub key: String,
    #[serde(default)]
    pub acl: Option<String>,
    pub signed_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

/// Source of signed upload URLs
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Request signed URLs for every file in the batch
    async fn get_signed_urls(
        &self,
        request: &SignedUrlRequest,
    ) -> Result<SignedUrlBatch, SigningError>;
}

/// HTTP client for the signing service
pub struct SignedUrlClient {
    endpoint: SigningEndpoint,
    http_client: reqwest::Client,
}

impl SignedUrlClient {
    /// Create a client for the given endpoint
    pub fn new(endpoint: SigningEndpoint) -> Result<Self, SigningError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| SigningError::ConfigError(e.to_string()))?;

        Ok(Self::with_http_client(endpoint, http_client))
    }

    /// Create a client sharing an existing connection pool
    pub fn with_http_client(endpoint: SigningEndpoint, http_client: reqwest::Client) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }

    pub fn endpoint(&self) -> &SigningEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl UrlSigner for SignedUrlClient {
    #[tracing::instrument(
        name = "signing.get_signed_urls",
        skip(self, request),
        fields(
            signing.url = %self.endpoint.url(),
            signing.provider_id = %request.provider_id,
            signing.files = request.files.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn get_signed_urls(
        &self,
        request: &SignedUrlRequest,
    ) -> Result<SignedUrlBatch, SigningError> {
        let start_time = Instant::now();

        let response = self
            .http_client
            .post(self.endpoint.url())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .json(request)
            .send()
            .await;
        metrics::record_operation_duration("sign", start_time.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::record_sign_request("error");
                return Err(e.into());
            }
        };

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status != reqwest::StatusCode::OK {
            metrics::record_sign_request("rejected");
            let body = response.json::<ErrorBody>().await.ok();
            return Err(SigningError::Rejected {
                status: status.as_u16(),
                code: body.and_then(|b| b.code),
            });
        }

        let batch: SignedUrlBatch = response.json().await?;
        metrics::record_sign_request("success");

        tracing::debug!(files = batch.files.len(), "Received signed URLs");

        Ok(batch)
    }
}
