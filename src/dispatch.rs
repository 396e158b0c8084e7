//! Request dispatch: route match, rate limit, authentication, cached metrics.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::auth::AuthGate;
use crate::cache::TieredCache;
use crate::error::{AuthError, RateLimitError, RATE_LIMIT_MESSAGE};
use crate::rate_limit::{client_ip, RateLimiter};
use crate::request::RequestView;
use crate::routes::match_route;
use crate::telemetry::{Outcome, Telemetry};

pub const DEFAULT_CHARSET: &str = "UTF-8";

/// A fully formed response, independent of the HTTP framework until converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, String)>,
    pub body: String,
}

impl MetricsResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn metrics(body: String, charset: &str) -> Self {
        let headers = vec![
            (header::CONTENT_TYPE, format!("text/plain; charset={}", charset)),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::X_FRAME_OPTIONS, "DENY".to_string()),
            (header::X_XSS_PROTECTION, "1; mode=block".to_string()),
            (header::REFERRER_POLICY, "no-referrer".to_string()),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ];
        Self {
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    fn json(status: StatusCode, body: serde_json::Value, charset: &str) -> Self {
        Self {
            status,
            headers: vec![(
                header::CONTENT_TYPE,
                format!("application/json; charset={}", charset),
            )],
            body: body.to_string(),
        }
    }

    fn unauthorized(err: &AuthError, charset: &str) -> Self {
        let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::UNAUTHORIZED);
        Self::json(
            status,
            json!({
                "code": err.code,
                "message": err.message,
                "data": { "status": err.status },
            }),
            charset,
        )
    }

    fn rate_limited(err: &RateLimitError, charset: &str) -> Self {
        let mut response = Self::json(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": RATE_LIMIT_MESSAGE }),
            charset,
        );
        response.headers.extend([
            (header::RETRY_AFTER, err.retry_after_secs.to_string()),
            (
                HeaderName::from_static("x-ratelimit-limit"),
                err.limit.to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-remaining"),
                "0".to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-reset"),
                err.reset_at.to_string(),
            ),
        ]);
        response
    }
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        }
        response
    }
}

pub struct Dispatcher {
    limiter: RateLimiter,
    gate: AuthGate,
    cache: TieredCache,
    charset: String,
    telemetry: Option<Arc<Telemetry>>,
}

impl Dispatcher {
    pub fn new(limiter: RateLimiter, gate: AuthGate, cache: TieredCache) -> Self {
        Self {
            limiter,
            gate,
            cache,
            charset: DEFAULT_CHARSET.to_string(),
            telemetry: None,
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Telemetry is recorded and its text appended to every metrics response.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// `None` when the request does not target the metrics endpoint.
    #[instrument(skip_all, fields(path = %request.path))]
    pub fn dispatch(&self, request: &RequestView) -> Option<MetricsResponse> {
        let route = match_route(request)?;
        debug!("Matched metrics route {:?}", route);
        Some(self.serve(request))
    }

    /// Rate limit, then authenticate, then answer from the cache.
    pub fn serve(&self, request: &RequestView) -> MetricsResponse {
        let started = Instant::now();

        let client = client_ip(request);
        if let Err(err) = self.limiter.allow(&client) {
            self.record(Outcome::RateLimited);
            return MetricsResponse::rate_limited(&err, &self.charset);
        }

        if let Err(err) = self.gate.check(request) {
            self.record(Outcome::Unauthorized);
            return MetricsResponse::unauthorized(&err, &self.charset);
        }

        let mut body = self.cache.get_metrics();
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(Outcome::Served);
            telemetry.observe_scrape(started.elapsed().as_secs_f64());
            body.push_str(&telemetry.render());
        }
        MetricsResponse::metrics(body, &self.charset)
    }

    fn record(&self, outcome: Outcome) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(outcome);
        }
    }
}
