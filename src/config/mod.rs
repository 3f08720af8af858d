//! Configuration module for Signed Uploadr
//!
//! Handles loading and parsing of YAML upload descriptions with support for
//! environment variable expansion and validation.
//!
//! # Example
//!
//! ```yaml
//! signing:
//!   api_key: "${UPLOAD_API_KEY}"
//!   provider_id: "my-provider"
//!   is_test: false
//! upload:
//!   throw_upload_error: false
//!   log: true
//! files:
//!   - path: "./avatar.png"
//!     key: "users/42/avatar.png"
//!     acl: "public-read"
//!     content_type: "image/png"
//! ```

use crate::signing::SigningEndpoint;
use crate::task::{FileEntry, UploadRequest};
use crate::upload::put_object::DEFAULT_CHUNK_SIZE;
use crate::upload::FilePayload;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Failed to read upload file {path:?}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub signing: SigningConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub files: Vec<FileConfig>,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    ///
    /// Missing credentials and an empty file list are left to the upload
    /// task, which reports them with their own error codes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref endpoint) = self.signing.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(
                    "Invalid signing endpoint: must start with http:// or https://".into(),
                ));
            }
        }

        if self.upload.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.chunk_size must be greater than 0".into(),
            ));
        }

        for file in &self.files {
            if file.path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "File entry has an empty path".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn signing_endpoint(&self) -> SigningEndpoint {
        SigningEndpoint::resolve(self.signing.endpoint.as_deref(), self.signing.is_test)
    }

    /// Read every listed file and build the task options
    pub async fn build_request(&self) -> Result<UploadRequest, ConfigError> {
        let mut request = UploadRequest::new(&self.signing.api_key, &self.signing.provider_id)
            .throw_upload_error(self.upload.throw_upload_error)
            .log(self.upload.log)
            .is_test(self.signing.is_test);
        if let Some(ref endpoint) = self.signing.endpoint {
            request = request.signing_url(endpoint);
        }

        for file in &self.files {
            let payload = FilePayload::from_path(&file.path, file.content_type.as_deref())
                .await
                .map_err(|source| ConfigError::FileError {
                    path: file.path.clone(),
                    source,
                })?;

            let mut entry = FileEntry::new(payload);
            entry.key = file.key.clone();
            entry.acl = file.acl.clone();
            request = request.file(entry);
        }

        Ok(request)
    }
}

/// Signing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Supports ${VAR} and ${VAR:-default} expansion
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub provider_id: String,
    /// Use the local test signing service. Default: false
    #[serde(default)]
    pub is_test: bool,
    /// Explicit signing endpoint URL, overrides `is_test`
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Upload behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_throw_upload_error")]
    pub throw_upload_error: bool,
    #[serde(default)]
    pub log: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            throw_upload_error: default_throw_upload_error(),
            log: false,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_throw_upload_error() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// One file to upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub acl: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}
