//! Per-key sliding-window rate limiting for the mutation endpoints.
//!
//! Default backend is an in-memory map; a Redis backend is available for
//! multi-instance deployments and falls back to the in-memory map when
//! Redis is unreachable. The gateway callback and carrier webhook paths are
//! exempt: the gateway retries aggressively on non-200 responses and
//! carriers bring their own retry discipline.

use axum::{
    extract::Request,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Paths never rate limited.
const EXEMPT_PREFIXES: [&str; 5] = [
    "/health",
    "/docs",
    "/api-docs",
    "/api/v1/payments/callback",
    "/api/v1/webhooks",
];

fn num_to_header_value<T: ToString>(n: T) -> http::HeaderValue {
    // Numeric strings are always valid header values.
    http::HeaderValue::from_str(&n.to_string())
        .unwrap_or_else(|_| http::HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    LimitExceeded,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn tick(&mut self, window: Duration) -> u32 {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
        self.count += 1;
        self.count
    }

    fn time_until_reset(&self, window: Duration) -> Duration {
        let elapsed = self.window_start.elapsed();
        if elapsed >= window {
            Duration::from_secs(0)
        } else {
            window - elapsed
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

#[derive(Clone)]
pub enum RateLimitBackend {
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

impl Default for RateLimitBackend {
    fn default() -> Self {
        Self::InMemory
    }
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    pub fn with_config(&self, config: RateLimitConfig) -> Self {
        Self {
            store: self.store.clone(),
            config,
        }
    }

    pub async fn check_rate_limit(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let config = &self.config;
        match &self.store {
            RateLimitStore::InMemory { entries } => Ok(Self::check_in_memory(entries, key, config)),
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, config).await {
                        Ok(result) => Ok(result),
                        Err(err) => {
                            warn!("redis rate limit error, using fallback: {}", err);
                            Ok(Self::check_in_memory(fallback, key, config))
                        }
                    }
                }
                Err(err) => {
                    warn!("redis unreachable for rate limiting, using fallback: {}", err);
                    Ok(Self::check_in_memory(fallback, key, config))
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        let mut entry = entries
            .entry(key.to_string())
            .or_insert_with(RateLimitEntry::new);

        let count = entry.tick(config.window_duration);
        let allowed = count <= config.requests_per_window;
        let remaining = config.requests_per_window.saturating_sub(count);
        let reset_time = entry.time_until_reset(config.window_duration);

        RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = config.requests_per_window as i64;
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        } else {
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
            }
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => window_secs,
        };
        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(count.max(0) as u32)
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    /// Drops expired in-memory windows.
    pub async fn cleanup_expired(&self) {
        let retain = |entries: &DashMap<String, RateLimitEntry>, window: Duration| {
            let now = Instant::now();
            entries.retain(|_, entry| now.duration_since(entry.window_start) < window);
        };
        match &self.store {
            RateLimitStore::InMemory { entries } => retain(entries, self.config.window_duration),
            RateLimitStore::Redis { fallback, .. } => retain(fallback, self.config.window_duration),
        }
    }
}

/// Per-path-prefix limit override.
#[derive(Clone, Debug)]
pub struct PathPolicy {
    pub prefix: String,
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

/// Parses `prefix:limit:window_secs`; invalid entries are reported as
/// warnings and skipped.
pub fn parse_path_policies(policies: &str) -> (Vec<PathPolicy>, Vec<String>) {
    let mut parsed = Vec::new();
    let mut warnings = Vec::new();

    for spec in policies.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = spec.split(':').collect();
        let policy = (|| -> Option<PathPolicy> {
            if parts.len() != 3 || !parts[0].starts_with('/') {
                return None;
            }
            let limit: u32 = parts[1].trim().parse().ok().filter(|l| *l >= 1)?;
            let window_secs: u64 = parts[2].trim().parse().ok().filter(|w| *w >= 1)?;
            Some(PathPolicy {
                prefix: parts[0].trim().to_string(),
                requests_per_window: limit,
                window_duration: Duration::from_secs(window_secs),
            })
        })();

        match policy {
            Some(policy) => parsed.push(policy),
            None => warnings.push(format!("skipping invalid rate limit policy '{}'", spec)),
        }
    }

    (parsed, warnings)
}

/// Prefers the forwarded client address, then the per-user header, then a
/// fixed unknown bucket.
pub fn extract_key(request: &Request) -> String {
    if let Some(user_id) = request
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
    {
        return format!("user:{}", user_id);
    }

    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ip) = forwarded.split(',').next() {
            return format!("ip:{}", ip.trim());
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
    {
        return format!("ip:{}", real_ip);
    }

    "ip:unknown".to_string()
}

// Layer implementation for tower
#[derive(Clone)]
pub struct RateLimitLayer {
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        Self::from_limiter(RateLimiter::new(config, backend))
    }

    /// Wraps an existing limiter, so the caller can also hand it to the
    /// background cleanup task.
    pub fn from_limiter(rate_limiter: RateLimiter) -> Self {
        Self {
            rate_limiter,
            path_policies: Arc::new(Vec::new()),
        }
    }

    pub fn with_policies(mut self, policies: Vec<PathPolicy>) -> Self {
        self.path_policies = Arc::new(policies);
        self
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            rate_limiter: self.rate_limiter.clone(),
            path_policies: self.path_policies.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
}

impl<S> tower::Service<Request> for RateLimitService<S>
where
    S: tower::Service<Request, Response = Response<axum::body::Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<axum::body::Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let rate_limiter = self.rate_limiter.clone();
        let mut inner = self.inner.clone();
        let policies = self.path_policies.clone();

        Box::pin(async move {
            let path = request.uri().path().to_string();
            if EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
                return inner.call(request).await;
            }
            // Reads pass through; only mutations are limited.
            if matches!(
                *request.method(),
                http::Method::GET | http::Method::HEAD | http::Method::OPTIONS
            ) {
                return inner.call(request).await;
            }

            let key = extract_key(&request);

            let mut effective = rate_limiter.config.clone();
            for policy in policies.iter() {
                if path.starts_with(&policy.prefix) {
                    effective.requests_per_window = policy.requests_per_window;
                    effective.window_duration = policy.window_duration;
                    break;
                }
            }

            let limiter = if effective.requests_per_window != rate_limiter.config.requests_per_window
                || effective.window_duration != rate_limiter.config.window_duration
            {
                rate_limiter.with_config(effective)
            } else {
                rate_limiter.clone()
            };

            match limiter.check_rate_limit(&key).await {
                Ok(result) => {
                    if !result.allowed {
                        warn!("rate limit exceeded for key: {}", key);

                        let mut response =
                            Response::new(axum::body::Body::from("Rate limit exceeded"));
                        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                        if limiter.config.enable_headers {
                            apply_headers(response.headers_mut(), &result, 0);
                        }
                        return Ok(response);
                    }

                    let mut response = inner.call(request).await?;
                    if limiter.config.enable_headers {
                        apply_headers(response.headers_mut(), &result, result.remaining);
                    }
                    Ok(response)
                }
                Err(e) => {
                    // Never let the limiter take the API down with it.
                    warn!("rate limiter error: {}", e);
                    inner.call(request).await
                }
            }
        })
    }
}

fn apply_headers(headers: &mut http::HeaderMap, result: &RateLimitResult, remaining: u32) {
    let reset = result.reset_time.as_secs();
    let _ = headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
    let _ = headers.insert("X-RateLimit-Remaining", num_to_header_value(remaining));
    let _ = headers.insert("X-RateLimit-Reset", num_to_header_value(reset));
    let _ = headers.insert("RateLimit-Limit", num_to_header_value(result.limit));
    let _ = headers.insert("RateLimit-Remaining", num_to_header_value(remaining));
    let _ = headers.insert("RateLimit-Reset", num_to_header_value(reset));
}

/// Background cleanup task for the in-memory stores.
pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        rate_limiter.cleanup_expired().await;
        debug!("rate limiter cleanup completed");
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            RateLimitError::LimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
            RateLimitError::InvalidConfig(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid configuration")
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denies_after_limit_within_window() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 2,
            window_duration: Duration::from_secs(60),
            ..Default::default()
        });

        assert!(limiter.check_rate_limit("k").await.unwrap().allowed);
        assert!(limiter.check_rate_limit("k").await.unwrap().allowed);
        assert!(!limiter.check_rate_limit("k").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(60),
            ..Default::default()
        });

        assert!(limiter.check_rate_limit("a").await.unwrap().allowed);
        assert!(limiter.check_rate_limit("b").await.unwrap().allowed);
        assert!(!limiter.check_rate_limit("a").await.unwrap().allowed);
        assert!(!limiter.check_rate_limit("b").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn remaining_and_reset_metadata_are_reported() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 5,
            window_duration: Duration::from_secs(60),
            ..Default::default()
        });

        let first = limiter.check_rate_limit("meta").await.unwrap();
        assert_eq!(first.limit, 5);
        assert_eq!(first.remaining, 4);
        assert!(first.reset_time <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn window_expiry_resets_the_count() {
        let limiter = RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_millis(20),
            ..Default::default()
        });

        assert!(limiter.check_rate_limit("w").await.unwrap().allowed);
        assert!(!limiter.check_rate_limit("w").await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check_rate_limit("w").await.unwrap().allowed);
    }

    #[test]
    fn path_policy_parsing() {
        let (policies, warnings) =
            parse_path_policies("/api/v1/checkout:10:60, bad, /api/v1/coupons:0:60");
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].prefix, "/api/v1/checkout");
        assert_eq!(policies[0].requests_per_window, 10);
        assert_eq!(warnings.len(), 2);
    }
}
