use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use greatkart_db::{AccountRow, SessionRow};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Header carrying the opaque session token in both directions.
pub const SESSION_HEADER: &str = "x-session-token";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The session (and its account, when signed in) resolved from
/// [`SESSION_HEADER`]. Absent from extensions for anonymous callers.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: SessionRow,
    pub account: Option<AccountRow>,
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

#[derive(Debug)]
struct RateLimitBuckets {
    windows: HashMap<String, RateLimitWindow>,
    swept_at: Instant,
}

/// Fixed-window limiter keyed by client address, shared by every API route
/// except health.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitBuckets>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitBuckets {
                windows: HashMap::new(),
                swept_at: Instant::now(),
            })),
        }
    }

    #[must_use]
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Counts one request from `client`. Returns `false` once the client has
    /// used up its window.
    async fn admit(&self, client: &str) -> bool {
        let mut buckets = self.state.lock().await;
        let now = Instant::now();

        // Drop finished windows once per window length.
        if now.duration_since(buckets.swept_at) >= self.window {
            let window = self.window;
            buckets
                .windows
                .retain(|_, w| now.duration_since(w.started_at) < window);
            buckets.swept_at = now;
        }

        let entry = buckets
            .windows
            .entry(client.to_owned())
            .or_insert(RateLimitWindow {
                started_at: now,
                count: 0,
            });
        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.state.lock().await.windows.len()
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn middleware_error(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
        }),
    )
        .into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolves [`SESSION_HEADER`] to a [`CurrentSession`] extension.
///
/// Unknown or expired tokens are treated as anonymous rather than rejected,
/// so a stale client token degrades to a fresh guest cart.
pub async fn resolve_session(State(pool): State<PgPool>, mut req: Request, next: Next) -> Response {
    let Some(token) = session_token(req.headers()) else {
        return next.run(req).await;
    };

    let session = match greatkart_db::find_session_by_token(&pool, &token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::warn!("unknown or expired session token");
            return next.run(req).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return middleware_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "session lookup failed",
            );
        }
    };

    let account = match session.account_id {
        Some(account_id) => match greatkart_db::get_account(&pool, account_id).await {
            Ok(account) => account.filter(|a| a.is_active),
            Err(e) => {
                tracing::error!(error = %e, account_id, "account lookup failed");
                return middleware_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "session lookup failed",
                );
            }
        },
        None => None,
    };

    req.extensions_mut()
        .insert(CurrentSession { session, account });
    next.run(req).await
}

/// Middleware enforcing a fixed request-per-window limit per client address.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_ip(req.headers(), req.extensions());

    if !rate_limit.admit(&client).await {
        tracing::warn!(client = %client, "rate limit exceeded");
        return middleware_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }

    next.run(req).await
}

/// Caller address: the first `x-forwarded-for` entry, else the socket peer,
/// else an empty string.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  abc123 "));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn blank_session_token_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("   "));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.7 , 172.16.0.1"));
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 2], 4000))));

        assert_eq!(client_ip(&headers, &extensions), "10.0.0.7");
        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "192.168.1.2");
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), "");
    }

    #[tokio::test]
    async fn rate_limit_windows_are_per_client() {
        let limiter = RateLimitState::per_minute(1);

        assert!(limiter.admit("10.0.0.1").await);
        assert!(!limiter.admit("10.0.0.1").await);
        assert!(limiter.admit("10.0.0.2").await);
    }

    #[tokio::test]
    async fn finished_windows_are_evicted() {
        let limiter = RateLimitState::new(1, Duration::from_millis(20));

        assert!(limiter.admit("10.0.0.1").await);
        assert!(limiter.admit("10.0.0.2").await);
        assert_eq!(limiter.tracked_clients().await, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.admit("10.0.0.3").await);
        assert_eq!(limiter.tracked_clients().await, 1);
        assert!(limiter.admit("10.0.0.1").await);
    }
}
