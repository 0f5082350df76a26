//! Checkout: order placement, payment callback and receipt.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use greatkart_core::{BillingInfo, CartTotals};
use greatkart_db::{CartOwner, DbError, OrderProductRow, OrderRow, VariationLabel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::{CartLineItem, CartView};
use super::{ApiError, ApiResponse, AppState, RequestContext};

// ---------------------------------------------------------------------------
// Shared order bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct OrderItem {
    order_number: String,
    full_name: String,
    email: String,
    phone: String,
    city: String,
    address: String,
    comment: String,
    order_total: Decimal,
    tax: Decimal,
    status: String,
    is_ordered: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for OrderItem {
    fn from(row: OrderRow) -> Self {
        Self {
            full_name: row.full_name(),
            order_number: row.order_number,
            email: row.email,
            phone: row.phone,
            city: row.city,
            address: row.address,
            comment: row.comment,
            order_total: row.order_total,
            tax: row.tax,
            status: row.status,
            is_ordered: row.is_ordered,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct OrderLineItem {
    product_id: i64,
    product_title: String,
    quantity: i32,
    product_price: Decimal,
    line_total: Decimal,
    variations: Vec<VariationLabel>,
}

impl From<OrderProductRow> for OrderLineItem {
    fn from(row: OrderProductRow) -> Self {
        Self {
            line_total: row.product_price * Decimal::from(row.quantity),
            product_id: row.product_id,
            product_title: row.product_title,
            quantity: row.quantity,
            product_price: row.product_price,
            variations: row.variations.0,
        }
    }
}

/// An order with its frozen lines.
#[derive(Debug, Serialize)]
pub(super) struct OrderDetail {
    order: OrderItem,
    lines: Vec<OrderLineItem>,
    subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<PaymentItem>,
}

impl OrderDetail {
    pub(super) fn new(order: OrderRow, lines: Vec<OrderProductRow>) -> Self {
        Self {
            order: order.into(),
            subtotal: OrderProductRow::subtotal(&lines),
            lines: lines.into_iter().map(OrderLineItem::from).collect(),
            payment: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PaymentItem {
    payment_id: String,
    payment_method: String,
    amount_paid: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct PlacedOrderView {
    order: OrderItem,
    lines: Vec<CartLineItem>,
    totals: CartTotals,
}

#[derive(Debug, Deserialize)]
pub(super) struct PaymentRequest {
    #[serde(rename = "orderID")]
    pub order_id: String,
    #[serde(rename = "paymentMethod")]
    pub payment_method: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct PaymentResult {
    order_number: String,
    #[serde(rename = "transID")]
    trans_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OrderCompleteQuery {
    pub order_number: Option<String>,
    pub payment_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/orders/place_order: submit billing details for the cart.
pub(super) async fn place_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<BillingInfo>,
) -> Result<(StatusCode, Json<ApiResponse<PlacedOrderView>>), ApiError> {
    let account = ctx.require_account()?;

    // An empty cart ends checkout before the billing form is looked at.
    let cart = greatkart_db::list_cart_lines(&state.pool, &CartOwner::Account(account.id))
        .await
        .map_err(|e| ctx.db_error(&e))?;
    if cart.is_empty() {
        return Err(ctx.db_error(&DbError::EmptyCart));
    }

    let billing = body.validate().map_err(|e| ctx.invalid(e))?;

    let placed = greatkart_db::place_order(&state.pool, account.id, &billing, &ctx.client_ip)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    let cart = CartView::from_rows(placed.lines);
    Ok((
        StatusCode::CREATED,
        ctx.respond(PlacedOrderView {
            order: placed.order.into(),
            lines: cart.lines,
            totals: placed.totals,
        }),
    ))
}

/// POST /api/v1/orders/payments: payment callback.
///
/// The body is trusted as-is; there is no gateway verification.
pub(super) async fn payments(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResult>>, ApiError> {
    let account = ctx.require_account()?;

    let receipt = greatkart_db::record_payment(
        &state.pool,
        account.id,
        &body.order_id,
        &body.payment_method,
        &body.status,
    )
    .await
    .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(PaymentResult {
        order_number: receipt.order_number,
        trans_id: receipt.payment.payment_id,
    }))
}

/// GET /api/v1/orders/order_complete?order_number=&payment_id=
pub(super) async fn order_complete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<OrderCompleteQuery>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let not_found = || ctx.error("not_found", "order not found");
    let (Some(order_number), Some(payment_id)) = (query.order_number, query.payment_id) else {
        return Err(not_found());
    };

    let order = greatkart_db::get_completed_order(&state.pool, &order_number)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .ok_or_else(not_found)?;
    let payment = greatkart_db::get_payment_by_payment_id(&state.pool, &payment_id)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .filter(|p| order.payment_id == Some(p.id))
        .ok_or_else(not_found)?;
    let lines = greatkart_db::list_order_products(&state.pool, order.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    let mut detail = OrderDetail::new(order, lines);
    detail.payment = Some(PaymentItem {
        payment_id: payment.payment_id,
        payment_method: payment.payment_method,
        amount_paid: payment.amount_paid,
        status: payment.status,
        created_at: payment.created_at,
    });
    Ok(ctx.respond(detail))
}
