use axum::{
    extract::{Path, State},
    Json,
};
use greatkart_core::{OrderStatus, ValidationErrors};
use serde::Deserialize;

use super::orders::OrderItem;
use super::{ApiError, ApiResponse, AppState, RequestContext};

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    pub status: String,
}

/// PATCH /api/v1/admin/orders/{order_number}/status: staff only.
pub(super) async fn set_order_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_number): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<ApiResponse<OrderItem>>, ApiError> {
    let staff = ctx.require_staff()?;
    let status: OrderStatus = body
        .status
        .parse()
        .map_err(|e: String| ctx.invalid(ValidationErrors::single("status", e)))?;

    let order = greatkart_db::update_order_status(&state.pool, &order_number, status)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    tracing::info!(
        order_number = %order.order_number,
        status = %status,
        staff_id = staff.id,
        "order status changed"
    );

    Ok(ctx.respond(OrderItem::from(order)))
}
