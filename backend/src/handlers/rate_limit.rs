use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::constants::RATE_LIMIT_WINDOW_SECS;
use crate::handlers::error::ErrorBody;

/// Sliding-window request counter keyed by client address.
#[derive(Debug)]
pub struct IpRateLimiter {
    requests: HashMap<String, Vec<Instant>>,
    max_requests_per_window: u32,
    window: Duration,
}

impl IpRateLimiter {
    pub fn new(max_requests_per_window: u32) -> Self {
        Self {
            requests: HashMap::new(),
            max_requests_per_window,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        }
    }

    pub fn can_make_request(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let window = self.window;

        // Forget clients that have been quiet for a whole window
        self.requests
            .retain(|_, times| times.last().is_some_and(|&t| now.duration_since(t) < window));

        let requests = self.requests.entry(key.to_string()).or_default();
        requests.retain(|&time| now.duration_since(time) < window);

        if requests.len() < self.max_requests_per_window as usize {
            requests.push(now);
            true
        } else {
            false
        }
    }
}

pub type SharedRateLimiter = Arc<Mutex<IpRateLimiter>>;

pub fn shared_rate_limiter(max_requests_per_window: u32) -> SharedRateLimiter {
    Arc::new(Mutex::new(IpRateLimiter::new(max_requests_per_window)))
}

pub async fn limit_by_ip(State(limiter): State<SharedRateLimiter>, request: Request, next: Next) -> Response {
    let client_ip = get_client_ip(request.headers());

    let allowed = limiter.lock().await.can_make_request(&client_ip);
    if !allowed {
        warn!(client_ip = %client_ip, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody {
                error: "Rate limit exceeded. Please try again later.".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

fn get_client_ip(headers: &HeaderMap) -> String {
    let ip_headers = [
        "cf-connecting-ip", // Cloudflare
        "x-forwarded-for",  // Standard proxy header
        "x-real-ip",        // Nginx
        "x-client-ip",      // Apache
    ];

    for header_name in &ip_headers {
        if let Some(ip_str) = headers.get(*header_name).and_then(|v| v.to_str().ok()) {
            // x-forwarded-for can be a comma-separated list, take the first one
            let ip = ip_str.split(',').next().unwrap_or(ip_str).trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_per_client() {
        let mut limiter = IpRateLimiter::new(2);

        assert!(limiter.can_make_request("10.0.0.1"));
        assert!(limiter.can_make_request("10.0.0.1"));
        assert!(!limiter.can_make_request("10.0.0.1"));
        assert!(limiter.can_make_request("10.0.0.2"));
    }

    #[test]
    fn first_forwarded_address_is_the_client() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(get_client_ip(&headers), "203.0.113.7");

        assert_eq!(get_client_ip(&HeaderMap::new()), "unknown");
    }
}
