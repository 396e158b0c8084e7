//! Per-client fixed-window rate limiting.
//!
//! The client address is taken from the first proxy header that carries a
//! public address, falling back to the connection address. Counters live in the
//! transient store; the window is fixed by the first request in it.

use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RateLimitError;
use crate::request::RequestView;
use crate::store::TransientStore;

/// Headers consulted for the client address, in order.
pub const CLIENT_IP_HEADERS: [&str; 6] = [
    "cf-connecting-ip",
    "x-real-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "client-ip",
];

pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Admitted request with the remaining budget of its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub client_ip: String,
    pub count: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    let private = a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168);
    let reserved = a == 0
        || a == 127
        || (a == 169 && b == 254)
        || a >= 240
        || (a == 100 && (64..=127).contains(&b));
    !(private || reserved)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    let mapped = ip.to_ipv4_mapped().is_some();
    !(ip.is_unspecified() || ip.is_loopback() || unique_local || link_local || mapped)
}

/// True for globally routable addresses, as far as this limiter is concerned.
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn parse_public(candidate: &str) -> Option<IpAddr> {
    let candidate = candidate.split(',').next()?.trim();
    candidate.parse::<IpAddr>().ok().filter(|ip| is_public(*ip))
}

/// Resolves the client address for rate limiting.
pub fn client_ip(request: &RequestView) -> String {
    for header in CLIENT_IP_HEADERS {
        if let Some(ip) = request.header(header).and_then(parse_public) {
            return ip.to_string();
        }
    }
    request
        .remote_addr
        .map(|addr| addr.ip())
        .filter(|ip| is_public(*ip))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub struct RateLimiter {
    transient: Arc<dyn TransientStore>,
    namespace: String,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(
        transient: Arc<dyn TransientStore>,
        namespace: impl Into<String>,
        settings: RateLimitSettings,
    ) -> Self {
        Self {
            transient,
            namespace: namespace.into(),
            settings,
        }
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    /// Store key for a client: namespace plus a prefix of the address digest.
    pub fn counter_key(&self, client_ip: &str) -> String {
        let digest = hex::encode(Sha256::digest(client_ip.as_bytes()));
        format!("{}_rate_limit_{}", self.namespace, &digest[..32])
    }

    /// Counts one request from `client_ip`.
    pub fn allow(&self, client_ip: &str) -> Result<RateDecision, RateLimitError> {
        let window = self
            .transient
            .increment(&self.counter_key(client_ip), self.settings.window_secs);

        if window.count > self.settings.max_requests {
            warn!(
                "Rate limit exceeded for {} ({} requests in window)",
                client_ip, window.count
            );
            return Err(RateLimitError {
                client_ip: client_ip.to_string(),
                limit: self.settings.max_requests,
                retry_after_secs: self.settings.window_secs,
                reset_at: window.expires_at,
            });
        }

        debug!("Request {} in window for {}", window.count, client_ip);
        Ok(RateDecision {
            client_ip: client_ip.to_string(),
            count: window.count,
            remaining: self.settings.max_requests - window.count,
            reset_at: window.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryTransientStore;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Arc::new(MemoryTransientStore::new(clock.clone()));
        (
            RateLimiter::new(store, "slymetrics", RateLimitSettings::default()),
            clock,
        )
    }

    #[test]
    fn test_sixty_allowed_sixty_first_rejected() {
        let (limiter, _clock) = limiter();
        for i in 1..=60 {
            let decision = limiter.allow("93.184.216.34").unwrap();
            assert_eq!(decision.count, i);
        }
        let err = limiter.allow("93.184.216.34").unwrap_err();
        assert_eq!(err.retry_after_secs, 60);
        assert_eq!(err.limit, 60);
        assert_eq!(err.reset_at, 1_700_000_060);
    }

    #[test]
    fn test_window_resets() {
        let (limiter, clock) = limiter();
        for _ in 0..61 {
            let _ = limiter.allow("93.184.216.34");
        }
        assert!(limiter.allow("93.184.216.34").is_err());
        clock.advance(60);
        let decision = limiter.allow("93.184.216.34").unwrap();
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining, 59);
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..60 {
            limiter.allow("93.184.216.34").unwrap();
        }
        assert!(limiter.allow("8.8.8.8").is_ok());
    }

    #[test]
    fn test_rotating_clients_do_not_accumulate_counters() {
        use crate::store::SWEEP_INTERVAL;

        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Arc::new(MemoryTransientStore::new(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), "slymetrics", RateLimitSettings::default());

        for round in 0..5u32 {
            for client in 0..2000u32 {
                let ip = format!("93.{}.{}.{}", round + 1, client / 250, client % 250 + 1);
                limiter.allow(&ip).unwrap();
            }
            clock.advance(120);
        }

        assert!(
            store.len() <= 2000 + SWEEP_INTERVAL as usize,
            "{} counters held after 5 expired windows",
            store.len()
        );
    }

    #[test]
    fn test_counter_key_shape() {
        let (limiter, _clock) = limiter();
        let key = limiter.counter_key("93.184.216.34");
        assert!(key.starts_with("slymetrics_rate_limit_"));
        assert_eq!(key.len(), "slymetrics_rate_limit_".len() + 32);
        assert_ne!(key, limiter.counter_key("8.8.8.8"));
    }

    #[test]
    fn test_public_address_classification() {
        for ip in ["93.184.216.34", "8.8.8.8", "2606:4700::1111", "192.0.2.10"] {
            assert!(is_public(ip.parse().unwrap()), "{} should be public", ip);
        }
        for ip in [
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.1.1",
            "0.1.2.3",
            "240.0.0.1",
            "100.64.0.1",
            "::",
            "::1",
            "fe80::1",
            "fd00::1",
            "::ffff:8.8.8.8",
        ] {
            assert!(!is_public(ip.parse().unwrap()), "{} should be rejected", ip);
        }
        assert!(is_public("172.32.0.1".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_resolution_order() {
        let req = RequestView::get("/metrics")
            .with_header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .with_header("x-real-ip", "10.0.0.2")
            .with_remote_addr("198.51.100.1:4000".parse().unwrap());
        assert_eq!(client_ip(&req), "203.0.113.7");

        let req = RequestView::get("/metrics")
            .with_header("cf-connecting-ip", "93.184.216.34")
            .with_header("x-forwarded-for", "203.0.113.7");
        assert_eq!(client_ip(&req), "93.184.216.34");
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let req = RequestView::get("/metrics")
            .with_header("x-forwarded-for", "192.168.0.5")
            .with_remote_addr("198.51.100.1:4000".parse().unwrap());
        assert_eq!(client_ip(&req), "198.51.100.1");

        let req = RequestView::get("/metrics").with_remote_addr("127.0.0.1:4000".parse().unwrap());
        assert_eq!(client_ip(&req), UNKNOWN_CLIENT);

        let req = RequestView::get("/metrics").with_header("x-real-ip", "garbage");
        assert_eq!(client_ip(&req), UNKNOWN_CLIENT);
    }
}
