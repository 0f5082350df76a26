//! Cart routes. Anonymous callers get a guest session on their first add.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use greatkart_core::{CartTotals, ValidationErrors};
use greatkart_db::{CartLineRow, CartOwner, VariationLabel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{session_headers, ApiError, ApiResponse, AppState, RequestContext};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(super) struct AddToCartRequest {
    /// Variation category → value, e.g. `{"color": "Blue", "size": "M"}`.
    #[serde(default)]
    pub variations: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CartLineItem {
    id: i64,
    product_id: i64,
    product_title: String,
    product_slug: String,
    category_slug: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
    variations: Vec<VariationLabel>,
}

impl From<CartLineRow> for CartLineItem {
    fn from(row: CartLineRow) -> Self {
        let line_total = row.line_total();
        Self {
            id: row.id,
            product_id: row.product_id,
            product_title: row.product_title,
            product_slug: row.product_slug,
            category_slug: row.category_slug,
            unit_price: row.unit_price,
            quantity: row.quantity,
            line_total,
            variations: row.variations.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CartView {
    pub(super) lines: Vec<CartLineItem>,
    pub(super) totals: CartTotals,
}

impl CartView {
    pub(super) fn from_rows(rows: Vec<CartLineRow>) -> Self {
        let totals = greatkart_db::cart_totals(&rows);
        Self {
            lines: rows.into_iter().map(CartLineItem::from).collect(),
            totals,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AddedToCart {
    line_id: i64,
    quantity: i32,
    created: bool,
    /// Present only when this request opened a guest session.
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct LineChange {
    line_id: i64,
    /// `None` once the line is gone.
    quantity: Option<i32>,
    deleted: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/cart/add/{product_id}
///
/// The body is optional; unknown variation pairs are ignored.
pub(super) async fn add(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<i64>,
    body: Bytes,
) -> Result<(StatusCode, HeaderMap, Json<ApiResponse<AddedToCart>>), ApiError> {
    let request: AddToCartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AddToCartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ctx.invalid(ValidationErrors::single("variations", e.to_string())))?
    };

    // An unknown product must not open a guest session.
    greatkart_db::get_product(&state.pool, product_id)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .ok_or_else(|| ctx.error("not_found", "product not found"))?;

    let (owner, issued_token) = match ctx.cart_owner() {
        Some(owner) => (owner, None),
        None => {
            let issued =
                greatkart_db::create_session(&state.pool, None, state.config.session_ttl())
                    .await
                    .map_err(|e| ctx.db_error(&e))?;
            tracing::info!(public_id = %issued.session.public_id, "guest session opened");
            (CartOwner::Guest(issued.session.cart_key()), Some(issued.token))
        }
    };

    let selection: Vec<(String, String)> = request.variations.into_iter().collect();
    let outcome = greatkart_db::add_to_cart(&state.pool, &owner, product_id, &selection)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        session_headers(issued_token.as_deref()),
        ctx.respond(AddedToCart {
            line_id: outcome.line_id,
            quantity: outcome.quantity,
            created: outcome.created,
            session_token: issued_token,
        }),
    ))
}

/// POST /api/v1/cart/remove/{product_id}/{item_id}: take one unit off a line.
pub(super) async fn remove(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((product_id, item_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<LineChange>>, ApiError> {
    let owner = owner_of(&ctx)?;

    let quantity = greatkart_db::remove_one(&state.pool, &owner, product_id, item_id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(LineChange {
        line_id: item_id,
        quantity,
        deleted: quantity.is_none(),
    }))
}

/// DELETE /api/v1/cart/remove_item/{product_id}/{item_id}
pub(super) async fn remove_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((product_id, item_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<LineChange>>, ApiError> {
    let owner = owner_of(&ctx)?;

    greatkart_db::delete_line(&state.pool, &owner, product_id, item_id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(LineChange {
        line_id: item_id,
        quantity: None,
        deleted: true,
    }))
}

/// GET /api/v1/cart: active lines and totals; empty for anonymous callers.
pub(super) async fn view_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let view = match ctx.cart_owner() {
        Some(owner) => load_cart(&state, &ctx, &owner).await?,
        None => CartView {
            lines: Vec::new(),
            totals: CartTotals::EMPTY,
        },
    };
    Ok(ctx.respond(view))
}

/// GET /api/v1/cart/checkout
pub(super) async fn checkout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let account = ctx.require_account()?;
    let view = load_cart(&state, &ctx, &CartOwner::Account(account.id)).await?;
    Ok(ctx.respond(view))
}

async fn load_cart(
    state: &AppState,
    ctx: &RequestContext,
    owner: &CartOwner,
) -> Result<CartView, ApiError> {
    let rows = greatkart_db::list_cart_lines(&state.pool, owner)
        .await
        .map_err(|e| ctx.db_error(&e))?;
    Ok(CartView::from_rows(rows))
}

fn owner_of(ctx: &RequestContext) -> Result<CartOwner, ApiError> {
    ctx.cart_owner()
        .ok_or_else(|| ctx.error("unauthorized", "a session is required"))
}
