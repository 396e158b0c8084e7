//! Normalized view of an incoming HTTP request.
//!
//! The dispatcher, the auth gate and the rate limiter only ever see this view,
//! never the framework request type.

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Uri};
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: Method,
    /// Path with leading and trailing slashes removed.
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    /// CGI-style server variables, e.g. `HTTP_AUTHORIZATION` forwarded by a
    /// fronting server.
    pub server_vars: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestView {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Self {
            method,
            path: uri.path().trim_matches('/').to_string(),
            query,
            headers,
            server_vars: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Convenience constructor for a GET with the given path and query string.
    pub fn get(path_and_query: &str) -> Self {
        let uri: Uri = path_and_query.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(Method::GET, &uri, HeaderMap::new())
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_server_var(mut self, name: &str, value: &str) -> Self {
        self.server_vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Header value as UTF-8, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Value of cookie `name` from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query_normalized() {
        let req = RequestView::get("/slymetrics/metrics/?api_key=abc&x=1");
        assert_eq!(req.path, "slymetrics/metrics");
        assert_eq!(req.param("api_key"), Some("abc"));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_cookie_lookup() {
        let req = RequestView::get("/").with_header("cookie", "a=1; operator_session=tok; b=2");
        assert_eq!(req.cookie("operator_session"), Some("tok"));
        assert_eq!(req.cookie("c"), None);
    }
}
