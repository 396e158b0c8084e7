//! Error taxonomy for the exporter.
//!
//! Only `AuthError` and `RateLimitError` ever reach a client. Everything else is
//! recovered where it happens: collection failures drop a single data source,
//! validation problems are sanitized away and encryption problems degrade to a
//! reversible encoding.

use thiserror::Error;

/// Machine-readable code carried by every 401 response.
pub const AUTH_ERROR_CODE: &str = "rest_forbidden";

/// Human-readable message carried by every 401 response.
pub const AUTH_ERROR_MESSAGE: &str = "Authentication required for metrics endpoint.";

/// Body text of a 429 response.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Missing or invalid credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthError {
    pub code: &'static str,
    pub message: &'static str,
    pub status: u16,
}

impl Default for AuthError {
    fn default() -> Self {
        Self {
            code: AUTH_ERROR_CODE,
            message: AUTH_ERROR_MESSAGE,
            status: 401,
        }
    }
}

/// Too many requests from one client inside the current window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit of {limit} requests exceeded for {client_ip}")]
pub struct RateLimitError {
    pub client_ip: String,
    pub limit: u64,
    pub retry_after_secs: u64,
    /// Unix timestamp at which the current window ends.
    pub reset_at: u64,
}

/// A host data provider could not answer a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),

    #[error("query failed: {0}")]
    Query(String),

    #[error("snapshot could not be loaded: {0}")]
    Snapshot(String),
}

/// A single data source failed; its contribution is omitted from the output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("{source_name}: {error}")]
    Host {
        source_name: &'static str,
        error: HostError,
    },

    #[error("{source_name}: rejected input {value:?}: {reason}")]
    InvalidInput {
        source_name: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl CollectionError {
    pub fn host(source_name: &'static str, error: HostError) -> Self {
        Self::Host { source_name, error }
    }
}

/// Malformed metric name, label or value. Always recovered by the formatter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("metric name {0:?} is empty after sanitization")]
    EmptyMetricName(String),

    #[error("non-numeric value {value:?} for metric {metric}")]
    NonNumericValue { metric: String, value: String },

    #[error("label value truncated from {0} characters")]
    LabelTruncated(usize),
}

/// Cipher support problems. Recovered by falling back to reversible encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    #[error("encryption key is not valid base64: {0}")]
    InvalidKey(String),

    #[error("ciphertext is malformed")]
    Malformed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Persistent or transient store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read option store {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write option store {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("option store {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Secret management failures.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("{0} is supplied via environment and cannot be regenerated at runtime")]
    EnvironmentManaged(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}
