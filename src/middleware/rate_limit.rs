use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Fixed-window request counter keyed by client.
#[derive(Clone)]
pub struct RateLimiter {
    // client -> (request_count, window_start)
    clients: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    pub fn check_rate_limit(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match clients.get_mut(client) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) > self.window_duration {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                clients.insert(client.to_string(), (1, now));
                true
            }
        }
    }

    pub fn cleanup_expired(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        clients.retain(|_, (_, window_start)| now.duration_since(*window_start) <= self.window_duration);
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }
}

/// Peer address when the server was started with connect info, otherwise
/// the first `x-forwarded-for` hop.
fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn enforce(limiter: &RateLimiter, request: &Request, scope: &str) -> Result<(), AppError> {
    let client = client_key(request);

    if !limiter.check_rate_limit(&client) {
        tracing::warn!("{} rate limit exceeded for {}", scope, client);
        return Err(AppError::QuotaExceeded(
            "Rate limit exceeded. Please try again later.".to_string(),
        ));
    }

    // Occasionally clean up expired entries
    if rand::random::<u8>() < 10 {
        limiter.cleanup_expired();
    }

    Ok(())
}

/// 100 requests per minute per client on the whole API.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    static RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();
    let limiter = RATE_LIMITER.get_or_init(|| RateLimiter::new(100, 60));

    enforce(limiter, &request, "API")?;
    Ok(next.run(request).await)
}

/// 10 requests per minute per client on register and login.
pub async fn strict_rate_limit_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    static STRICT_RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();
    let limiter = STRICT_RATE_LIMITER.get_or_init(|| RateLimiter::new(10, 60));

    enforce(limiter, &request, "Auth")?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_limit_is_per_client() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check_rate_limit("10.0.0.1"));
        assert!(limiter.check_rate_limit("10.0.0.1"));
        assert!(!limiter.check_rate_limit("10.0.0.1"));
        assert!(limiter.check_rate_limit("10.0.0.2"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, 60);
        let start = Instant::now();
        assert!(limiter.check_at("client", start));
        assert!(!limiter.check_at("client", start + Duration::from_secs(30)));
        assert!(limiter.check_at("client", start + Duration::from_secs(61)));
    }

    #[test]
    fn test_cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new(5, 0);
        limiter.check_rate_limit("a");
        std::thread::sleep(Duration::from_millis(5));
        limiter.cleanup_expired();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_key_uses_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.9");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&bare), "unknown");
    }
}
