/*!
 * # Rate Limiting Module
 *
 * Fixed-window request limiter guarding the public calculation path.
 *
 * Each identifier (client IP, optionally combined with the business id) gets
 * a counter that is monotonic within its window and resets exactly at the
 * window boundary. Per-key updates go through the map's entry lock, so
 * concurrent requests for the same identifier serialize their increments
 * instead of racing read-then-write.
 *
 * The tower layer applies the limiter at the HTTP boundary and emits the
 * standard `X-RateLimit-*` headers, plus `Retry-After` on denial. Rate
 * limiting never happens inside the pricing computation itself.
 */
use axum::{
    extract::Request,
    http::{Response, StatusCode},
};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Numeric strings are always valid ASCII header values.
fn num_to_header_value<T: ToString>(n: T) -> http::HeaderValue {
    http::HeaderValue::from_str(&n.to_string())
        .unwrap_or_else(|_| http::HeaderValue::from_static("0"))
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Outcome of one limiter check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whole-second Retry-After value, rounded up so callers never retry
    /// inside the same window.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

/// Fixed-window counter per identifier.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    entries: Arc<DashMap<String, WindowEntry>>,
    config: RateLimitConfig,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and consume one request slot for `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        // The dashmap entry guard holds the shard lock for the whole
        // read-modify-write, keeping per-key updates atomic.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + self.config.window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.config.window;
        }

        let allowed = entry.count < self.config.limit;
        if allowed {
            entry.count += 1;
        }
        let remaining = self.config.limit.saturating_sub(entry.count);
        let reset_after = entry.reset_at.saturating_duration_since(now);

        RateLimitDecision {
            allowed,
            limit: self.config.limit,
            remaining: if allowed { remaining } else { 0 },
            reset_after,
        }
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop entries whose window has passed, bounding memory to currently
    /// active identifiers.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.reset_at);
        before - self.entries.len()
    }

    pub fn active_identifiers(&self) -> usize {
        self.entries.len()
    }
}

/// Periodic purge of expired windows; lifecycle owned by bootstrap.
pub struct LimiterSweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl LimiterSweeper {
    pub fn start(limiter: FixedWindowLimiter, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = limiter.purge_expired();
                        if purged > 0 {
                            debug!(purged, "rate limiter sweep removed expired windows");
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        Self { handle, shutdown }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Identifier for a request: forwarded client IP when present, socket
/// fallback otherwise.
pub fn extract_ip_key(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return format!("ip:{}", ip_str);
        }
    }

    if let Some(info) = request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    {
        return format!("ip:{}", info.0.ip());
    }

    "ip:unknown".to_string()
}

// Layer implementation for tower
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: FixedWindowLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: FixedWindowLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: FixedWindowLimiter,
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
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = request.uri().path().to_string();
            if path.starts_with("/health") || path.starts_with("/api-docs") {
                return inner.call(request).await;
            }

            let key = extract_ip_key(&request);
            let decision = limiter.check(&key);

            if !decision.allowed {
                warn!(key = %key, path = %path, "rate limit exceeded");
                counter!("rate_limit_denied_total", 1, "path" => path.clone());

                let mut response = Response::new(axum::body::Body::from("Rate limit exceeded"));
                *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

                if limiter.config().enable_headers {
                    let headers = response.headers_mut();
                    headers.insert("X-RateLimit-Limit", num_to_header_value(decision.limit));
                    headers.insert("X-RateLimit-Remaining", num_to_header_value(0));
                    headers.insert(
                        "X-RateLimit-Reset",
                        num_to_header_value(decision.reset_after.as_secs()),
                    );
                    headers.insert(
                        "Retry-After",
                        num_to_header_value(decision.retry_after_secs()),
                    );
                }

                return Ok(response);
            }

            counter!("rate_limit_allowed_total", 1, "path" => path.clone());
            let mut response = inner.call(request).await?;

            if limiter.config().enable_headers {
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", num_to_header_value(decision.limit));
                headers.insert(
                    "X-RateLimit-Remaining",
                    num_to_header_value(decision.remaining),
                );
                headers.insert(
                    "X-RateLimit-Reset",
                    num_to_header_value(decision.reset_after.as_secs()),
                );
            }

            Ok(response)
        })
    }
}
