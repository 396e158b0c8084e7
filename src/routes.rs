//! Declarative table of the URL shapes that reach the metrics endpoint.

use axum::http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::request::RequestView;

static SAFE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9/_-]+$").expect("static regex"));

/// REST namespace and route of the metrics endpoint.
pub const REST_ROUTE: &str = "slymetrics/v1/metrics";
/// Prefix under which REST routes are served on clean URLs.
pub const REST_PREFIX: &str = "wp-json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A query parameter whose presence selects the endpoint.
    QueryMarker(&'static str),
    /// A clean path, compared with surrounding slashes trimmed.
    Path(&'static str),
    /// A rewrite variable with a required value.
    RewriteVar {
        name: &'static str,
        value: &'static str,
    },
    /// The REST API route, GET and HEAD only.
    Rest,
}

pub const ROUTES: [Route; 7] = [
    Route::QueryMarker("slymetrics"),
    Route::QueryMarker("slybase_metrics"),
    Route::Path("slymetrics/metrics"),
    Route::Path("slymetrics"),
    Route::Path("metrics"),
    Route::RewriteVar {
        name: "slymetrics_endpoint",
        value: "metrics",
    },
    Route::Rest,
];

impl Route {
    pub fn matches(&self, request: &RequestView) -> bool {
        match self {
            Route::QueryMarker(name) => request.query.contains_key(*name),
            Route::Path(path) => request.path == *path,
            Route::RewriteVar { name, value } => request.param(name) == Some(*value),
            Route::Rest => {
                let method_ok = request.method == Method::GET || request.method == Method::HEAD;
                let rest_path = format!("{}/{}", REST_PREFIX, REST_ROUTE);
                let via_query = request
                    .param("rest_route")
                    .map(|r| r.trim_matches('/') == REST_ROUTE)
                    .unwrap_or(false);
                method_ok && (request.path == rest_path || via_query)
            }
        }
    }
}

/// The first matching route, if the request targets the metrics endpoint.
pub fn match_route(request: &RequestView) -> Option<Route> {
    if !request.path.is_empty() && !SAFE_PATH.is_match(&request.path) {
        warn!("Rejected request path with unexpected characters: {:?}", request.path);
        return None;
    }
    ROUTES.iter().copied().find(|route| route.matches(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Uri};

    fn with_method(method: Method, uri: &str) -> RequestView {
        RequestView::new(method, &uri.parse::<Uri>().unwrap(), HeaderMap::new())
    }

    #[test]
    fn test_query_markers() {
        assert_eq!(
            match_route(&RequestView::get("/?slymetrics")),
            Some(Route::QueryMarker("slymetrics"))
        );
        assert_eq!(
            match_route(&RequestView::get("/index.php?slybase_metrics=1")),
            None,
            "dots in the path are rejected before any route is tried"
        );
        assert_eq!(
            match_route(&RequestView::get("/?slybase_metrics=1")),
            Some(Route::QueryMarker("slybase_metrics"))
        );
    }

    #[test]
    fn test_clean_paths() {
        assert_eq!(
            match_route(&RequestView::get("/slymetrics/metrics/")),
            Some(Route::Path("slymetrics/metrics"))
        );
        assert_eq!(match_route(&RequestView::get("/slymetrics")), Some(Route::Path("slymetrics")));
        assert_eq!(match_route(&RequestView::get("/metrics")), Some(Route::Path("metrics")));
        assert_eq!(match_route(&RequestView::get("/metrics/extra")), None);
        assert_eq!(match_route(&RequestView::get("/")), None);
    }

    #[test]
    fn test_rewrite_var() {
        assert!(match_route(&RequestView::get("/?slymetrics_endpoint=metrics")).is_some());
        assert!(match_route(&RequestView::get("/?slymetrics_endpoint=other")).is_none());
    }

    #[test]
    fn test_rest_route() {
        assert_eq!(
            match_route(&RequestView::get("/wp-json/slymetrics/v1/metrics")),
            Some(Route::Rest)
        );
        assert_eq!(
            match_route(&RequestView::get("/?rest_route=/slymetrics/v1/metrics")),
            Some(Route::Rest)
        );
        assert_eq!(
            match_route(&with_method(Method::POST, "/wp-json/slymetrics/v1/metrics")),
            None
        );
        assert_eq!(
            match_route(&with_method(Method::HEAD, "/wp-json/slymetrics/v1/metrics")),
            Some(Route::Rest)
        );
    }

    #[test]
    fn test_unsafe_path_rejected() {
        assert_eq!(match_route(&RequestView::get("/metrics%00")), None);
        assert_eq!(match_route(&RequestView::get("/me.trics")), None);
    }
}
