//! Authentication gate for the metrics endpoint.
//!
//! A request is let through by the first scheme that succeeds: a bearer token
//! in the authorization header, an `api_key` query parameter, or an operator
//! session recognized by the host. Secret comparisons run in constant time and
//! an empty configured secret never matches.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::AuthError;
use crate::host::CapabilityCheck;
use crate::request::RequestView;
use crate::secrets::SecretStore;

static BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Bearer\s+(.+)").expect("static regex"));

/// Server variables that may carry the authorization header when a fronting
/// server strips it.
const AUTH_SERVER_VARS: [&str; 2] = ["HTTP_AUTHORIZATION", "REDIRECT_HTTP_AUTHORIZATION"];

/// Which scheme admitted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    ApiKey,
    Operator,
}

/// Constant-time equality. Empty `expected` never matches.
pub fn secret_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() || provided.is_empty() {
        return false;
    }
    bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

/// Finds the raw authorization value across headers and server variables.
pub fn extract_authorization(request: &RequestView) -> Option<String> {
    if let Some(v) = request.header("authorization").filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    if let Some(v) = request.header("http_authorization").filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    for var in AUTH_SERVER_VARS {
        if let Some(v) = request.server_vars.get(var).filter(|v| !v.is_empty()) {
            return Some(v.clone());
        }
    }
    request
        .server_vars
        .iter()
        .find(|(name, value)| name.eq_ignore_ascii_case("authorization") && !value.is_empty())
        .map(|(_, value)| value.clone())
}

/// Token from a `Bearer <token>` value, trimmed.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    BEARER
        .captures(authorization)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
}

pub struct AuthGate {
    secrets: Arc<SecretStore>,
    capability: Arc<dyn CapabilityCheck>,
}

impl AuthGate {
    pub fn new(secrets: Arc<SecretStore>, capability: Arc<dyn CapabilityCheck>) -> Self {
        Self {
            secrets,
            capability,
        }
    }

    /// Admits or rejects a request. Has no side effects.
    pub fn check(&self, request: &RequestView) -> Result<AuthMethod, AuthError> {
        if let Some(header) = extract_authorization(request) {
            if let (Some(token), Some(expected)) = (bearer_token(&header), self.secrets.bearer_token()) {
                if secret_matches(&expected, token) {
                    return Ok(AuthMethod::Bearer);
                }
            }
        }

        if let Some(provided) = request.param("api_key") {
            if let Some(expected) = self.secrets.api_key() {
                if secret_matches(&expected, provided) {
                    return Ok(AuthMethod::ApiKey);
                }
            }
        }

        if self.capability.is_operator(request) {
            return Ok(AuthMethod::Operator);
        }

        Err(AuthError::default())
    }
}
