mod accounts;
mod admin;
mod cart;
mod catalog;
mod orders;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use greatkart_core::{AppConfig, FieldError, ValidationErrors};
use greatkart_db::{AccountRow, CartOwner, DbError, SessionRow};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::middleware::{
    client_ip, enforce_rate_limit, request_id, resolve_session, CurrentSession, RateLimitState,
    RequestId, SESSION_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Per-field details for `validation_error`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                fields: Vec::new(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    pub fn validation(request_id: impl Into<String>, errors: ValidationErrors) -> Self {
        let mut api_error = Self::new(request_id, "validation_error", "invalid input");
        api_error.error.fields = errors.0;
        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "empty_cart" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: &str, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        DbError::EmptyCart => ApiError::new(request_id, "empty_cart", "cart is empty"),
        DbError::EmailTaken => {
            ApiError::validation(request_id, ValidationErrors::single("email", error.to_string()))
        }
        DbError::UsernameTaken => ApiError::validation(
            request_id,
            ValidationErrors::single("username", error.to_string()),
        ),
        DbError::InvalidOrderStatus(_) => ApiError::validation(
            request_id,
            ValidationErrors::single("status", error.to_string()),
        ),
        DbError::Password(_)
        | DbError::PasswordTask(_)
        | DbError::Sqlx(_)
        | DbError::Migration(_) => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

/// Response headers handing a freshly issued session token to the client.
pub(super) fn session_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = token.and_then(|t| HeaderValue::from_str(t).ok()) {
        headers.insert(SESSION_HEADER, value);
    }
    headers
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Everything a handler needs to know about the caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub session: Option<SessionRow>,
    /// Set only for an active account behind a signed-in session.
    pub account: Option<AccountRow>,
    pub client_ip: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map_or_else(|| Uuid::new_v4().to_string(), |id| id.0.clone());
        let (session, account) = match parts.extensions.get::<CurrentSession>() {
            Some(current) => (Some(current.session.clone()), current.account.clone()),
            None => (None, None),
        };

        Ok(Self {
            request_id,
            session,
            account,
            client_ip: client_ip(&parts.headers, &parts.extensions),
        })
    }
}

impl RequestContext {
    pub(super) fn respond<T: Serialize>(&self, data: T) -> Json<ApiResponse<T>> {
        Json(ApiResponse {
            data,
            meta: ResponseMeta::new(self.request_id.clone()),
        })
    }

    pub(super) fn error(&self, code: &str, message: impl Into<String>) -> ApiError {
        ApiError::new(self.request_id.clone(), code, message)
    }

    pub(super) fn invalid(&self, errors: ValidationErrors) -> ApiError {
        ApiError::validation(self.request_id.clone(), errors)
    }

    pub(super) fn db_error(&self, error: &DbError) -> ApiError {
        map_db_error(&self.request_id, error)
    }

    pub(super) fn require_session(&self) -> Result<&SessionRow, ApiError> {
        self.session
            .as_ref()
            .ok_or_else(|| self.error("unauthorized", "a session is required"))
    }

    pub(super) fn require_account(&self) -> Result<&AccountRow, ApiError> {
        self.account
            .as_ref()
            .ok_or_else(|| self.error("unauthorized", "login required"))
    }

    pub(super) fn require_staff(&self) -> Result<&AccountRow, ApiError> {
        let account = self.require_account()?;
        if account.is_staff || account.is_superuser {
            Ok(account)
        } else {
            Err(self.error("forbidden", "staff access required"))
        }
    }

    /// The cart this caller reads and writes, if they have one.
    pub(super) fn cart_owner(&self) -> Option<CartOwner> {
        match (&self.account, &self.session) {
            (Some(account), _) => Some(CartOwner::Account(account.id)),
            (None, Some(session)) => Some(CartOwner::Guest(session.cart_key())),
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

fn build_cors() -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let request_id_header = HeaderName::from_static("x-request-id");

    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            request_id_header.clone(),
            session_header.clone(),
        ])
        .expose_headers([request_id_header, session_header])
}

fn storefront_router(state: &AppState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/home", get(catalog::home))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/store", get(catalog::store))
        .route(
            "/api/v1/store/category/{category_slug}",
            get(catalog::store_by_category),
        )
        .route(
            "/api/v1/store/category/{category_slug}/{product_slug}",
            get(catalog::product_detail),
        )
        .route("/api/v1/store/search", get(catalog::search))
        .route(
            "/api/v1/store/products/{product_id}/reviews",
            post(catalog::submit_review),
        )
        .route("/api/v1/accounts/registration", post(accounts::register))
        .route("/api/v1/accounts/login", post(accounts::login))
        .route("/api/v1/accounts/logout", post(accounts::logout))
        .route("/api/v1/accounts/dashboard", get(accounts::dashboard))
        .route("/api/v1/accounts/my_orders", get(accounts::my_orders))
        .route(
            "/api/v1/accounts/order_detail/{order_number}",
            get(accounts::order_detail),
        )
        .route("/api/v1/cart", get(cart::view_cart))
        .route("/api/v1/cart/checkout", get(cart::checkout))
        .route("/api/v1/cart/add/{product_id}", post(cart::add))
        .route(
            "/api/v1/cart/remove/{product_id}/{item_id}",
            post(cart::remove),
        )
        .route(
            "/api/v1/cart/remove_item/{product_id}/{item_id}",
            delete(cart::remove_item),
        )
        .route("/api/v1/orders/place_order", post(orders::place_order))
        .route("/api/v1/orders/payments", post(orders::payments))
        .route("/api/v1/orders/order_complete", get(orders::order_complete))
        .route(
            "/api/v1/admin/orders/{order_number}/status",
            patch(admin::set_order_status),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.pool.clone(),
                    resolve_session,
                )),
        )
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(storefront_router(&state, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match greatkart_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}
