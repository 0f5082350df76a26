//! Database operations for `orders` and `order_products`.

use chrono::{DateTime, Utc};
use greatkart_core::orders::order_number;
use greatkart_core::pricing::order_subtotal;
use greatkart_core::{BillingInfo, CartTotals, OrderStatus};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::carts::{cart_totals, load_lines, CartLineRow, OwnerIds, VariationLabel};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `orders` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub account_id: i64,
    /// Set once the order is paid.
    pub payment_id: Option<i64>,
    pub order_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub address: String,
    pub comment: String,
    /// Grand total: line total plus tax.
    pub order_total: Decimal,
    pub tax: Decimal,
    pub status: String,
    pub ip: String,
    pub is_ordered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An order line joined with the product title and its variation snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderProductRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_title: String,
    pub quantity: i32,
    /// Unit price frozen when the order was paid.
    pub product_price: Decimal,
    pub ordered: bool,
    pub variations: Json<Vec<VariationLabel>>,
    pub created_at: DateTime<Utc>,
}

impl OrderProductRow {
    /// Sum of `quantity × frozen price` over `lines`.
    #[must_use]
    pub fn subtotal(lines: &[Self]) -> Decimal {
        order_subtotal(lines.iter().map(|line| (line.quantity, line.product_price)))
    }
}

/// A freshly submitted order with the cart it was priced from.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderRow,
    pub lines: Vec<CartLineRow>,
    pub totals: CartTotals,
}

const ORDER_COLUMNS: &str = "\
    id, account_id, payment_id, order_number, first_name, last_name, email, phone, city, \
    address, comment, order_total, tax, status, ip, is_ordered, created_at, updated_at";

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Creates an unpaid order from `account_id`'s cart.
///
/// Totals are computed from the current cart at current prices. The order
/// number needs the row id, so it is written by a second statement in the
/// same transaction.
///
/// # Errors
///
/// Returns [`DbError::EmptyCart`] if the account's cart has no lines, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn place_order(
    pool: &PgPool,
    account_id: i64,
    billing: &BillingInfo,
    ip: &str,
) -> Result<PlacedOrder, DbError> {
    let mut tx = pool.begin().await?;

    let owner = OwnerIds {
        cart_id: None,
        account_id: Some(account_id),
    };
    let lines = load_lines(&mut *tx, owner, false).await?;
    if lines.is_empty() {
        return Err(DbError::EmptyCart);
    }
    let totals = cart_totals(&lines);

    let (order_id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
        "INSERT INTO orders \
             (account_id, first_name, last_name, email, phone, city, address, comment, \
              order_total, tax, ip) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING id, created_at",
    )
    .bind(account_id)
    .bind(&billing.first_name)
    .bind(&billing.last_name)
    .bind(&billing.email)
    .bind(&billing.phone)
    .bind(&billing.city)
    .bind(&billing.address)
    .bind(&billing.comment)
    .bind(totals.grand_total)
    .bind(totals.tax)
    .bind(ip)
    .fetch_one(&mut *tx)
    .await?;

    let number = order_number(created_at.date_naive(), order_id);
    let sql = format!(
        "UPDATE orders SET order_number = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_id)
        .bind(&number)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        account_id,
        grand_total = %totals.grand_total,
        "order placed"
    );

    Ok(PlacedOrder {
        order,
        lines,
        totals,
    })
}

/// Sets the fulfilment status of an order. Payment state is untouched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no order has `order_number`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_order_status(
    pool: &PgPool,
    order_number: &str,
    status: OrderStatus,
) -> Result<OrderRow, DbError> {
    let sql = format!(
        "UPDATE orders SET status = $2, updated_at = NOW() \
         WHERE order_number = $1 \
         RETURNING {ORDER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_number)
        .bind(status.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    tracing::info!(order_number, status = %status, "order status changed");
    Ok(row)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Number of paid orders placed by an account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_completed_orders(pool: &PgPool, account_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders WHERE account_id = $1 AND is_ordered = true",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Paid orders of an account, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_completed_orders(
    pool: &PgPool,
    account_id: i64,
) -> Result<Vec<OrderRow>, DbError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE account_id = $1 AND is_ordered = true \
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(account_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// The most recent orders across all accounts, for operators.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_orders(pool: &PgPool, limit: i64) -> Result<Vec<OrderRow>, DbError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns the order with `order_number` if it belongs to `account_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_order_for_account(
    pool: &PgPool,
    account_id: i64,
    order_number: &str,
) -> Result<Option<OrderRow>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 AND order_number = $2");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(account_id)
        .bind(order_number)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns a paid order by number, or `None` if it does not exist or is
/// still unpaid.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_completed_order(
    pool: &PgPool,
    order_number: &str,
) -> Result<Option<OrderRow>, DbError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1 AND is_ordered = true");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_number)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Lines of an order in the order they were written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_products(
    pool: &PgPool,
    order_id: i64,
) -> Result<Vec<OrderProductRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderProductRow>(
        "SELECT op.id, op.order_id, op.product_id, p.title AS product_title, op.quantity, \
                op.product_price, op.ordered, \
                COALESCE( \
                    JSONB_AGG( \
                        JSONB_BUILD_OBJECT('id', v.id, 'category', v.category, 'value', v.value) \
                        ORDER BY v.category, v.id \
                    ) FILTER (WHERE v.id IS NOT NULL), \
                    '[]'::jsonb \
                ) AS variations, \
                op.created_at \
         FROM order_products op \
         JOIN products p ON p.id = op.product_id \
         LEFT JOIN order_product_variations opv ON opv.order_product_id = op.id \
         LEFT JOIN variations v ON v.id = opv.variation_id \
         WHERE op.order_id = $1 \
         GROUP BY op.id, p.id \
         ORDER BY op.id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
