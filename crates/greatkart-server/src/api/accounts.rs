//! Registration, login/logout and the signed-in account's order history.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use greatkart_core::accounts::{safe_next_path, Registration};
use greatkart_db::AccountRole;
use serde::{Deserialize, Serialize};

use super::orders::{OrderDetail, OrderItem};
use super::{session_headers, ApiError, ApiResponse, AppState, RequestContext};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginQuery {
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct RegisteredAccount {
    id: i64,
    username: String,
    email: String,
}

#[derive(Debug, Serialize)]
pub(super) struct MergedCart {
    absorbed: usize,
    reassigned: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct LoggedIn {
    session_token: String,
    redirect: String,
    merged: MergedCart,
}

#[derive(Debug, Serialize)]
pub(super) struct LoggedOut {
    logged_out: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct Dashboard {
    username: String,
    email: String,
    orders_count: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/accounts/registration
pub(super) async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredAccount>>), ApiError> {
    let registration = body.validate().map_err(|e| ctx.invalid(e))?;

    let account = greatkart_db::create_account(&state.pool, &registration, AccountRole::Customer)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    tracing::info!(account_id = account.id, "account registered");

    Ok((
        StatusCode::CREATED,
        ctx.respond(RegisteredAccount {
            id: account.id,
            username: account.username,
            email: account.email,
        }),
    ))
}

/// POST /api/v1/accounts/login?next=
///
/// Folds the caller's guest cart into the account and swaps the guest
/// session for an account session.
pub(super) async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<LoginQuery>,
    Json(body): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<ApiResponse<LoggedIn>>), ApiError> {
    let Some(account) = greatkart_db::authenticate(&state.pool, &body.email, &body.password)
        .await
        .map_err(|e| ctx.db_error(&e))?
    else {
        tracing::warn!("failed login attempt");
        return Err(ctx.error("unauthorized", "invalid login credentials"));
    };

    let outcome = greatkart_db::login(
        &state.pool,
        account.id,
        ctx.session.as_ref(),
        state.config.session_ttl(),
    )
    .await
    .map_err(|e| ctx.db_error(&e))?;

    let token = outcome.issued.token;
    Ok((
        session_headers(Some(&token)),
        ctx.respond(LoggedIn {
            session_token: token.clone(),
            redirect: safe_next_path(query.next.as_deref()),
            merged: MergedCart {
                absorbed: outcome.merge.absorbed,
                reassigned: outcome.merge.reassigned,
            },
        }),
    ))
}

/// POST /api/v1/accounts/logout
pub(super) async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<LoggedOut>>, ApiError> {
    let session = ctx.require_session()?;

    greatkart_db::delete_session(&state.pool, session.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(LoggedOut { logged_out: true }))
}

/// GET /api/v1/accounts/dashboard
pub(super) async fn dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Dashboard>>, ApiError> {
    let account = ctx.require_account()?;

    let orders_count = greatkart_db::count_completed_orders(&state.pool, account.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(Dashboard {
        username: account.username.clone(),
        email: account.email.clone(),
        orders_count,
    }))
}

/// GET /api/v1/accounts/my_orders: paid orders, newest first.
pub(super) async fn my_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<OrderItem>>>, ApiError> {
    let account = ctx.require_account()?;

    let rows = greatkart_db::list_completed_orders(&state.pool, account.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(rows.into_iter().map(OrderItem::from).collect()))
}

/// GET /api/v1/accounts/order_detail/{order_number}
pub(super) async fn order_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let account = ctx.require_account()?;

    let order = greatkart_db::get_order_for_account(&state.pool, account.id, &order_number)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .ok_or_else(|| ctx.error("not_found", "order not found"))?;
    let lines = greatkart_db::list_order_products(&state.pool, order.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(OrderDetail::new(order, lines)))
}
