//! Database operations for `payments`, and the payment step that finalises
//! an order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::carts::{load_lines, OwnerIds};
use crate::DbError;

/// A row from the `payments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: i64,
    /// Public transaction id handed back to the client.
    pub payment_id: String,
    pub account_id: i64,
    pub payment_method: String,
    pub amount_paid: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// What [`record_payment`] did.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub order_number: String,
    pub payment: PaymentRow,
    pub lines_moved: usize,
}

/// Records a payment for one of `account_id`'s unpaid orders and finalises it.
///
/// Everything happens in one transaction with the order row locked, so a
/// concurrent second callback for the same order waits and then finds the
/// order already paid:
///
/// 1. insert the payment, for the order's stored total;
/// 2. mark the order paid and link the payment;
/// 3. copy every cart line of the account into `order_products` with its
///    variations and the product's current price, and take the quantity off
///    the product's stock;
/// 4. empty the account's cart.
///
/// Stock is not floored at zero; a line that oversells is logged.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the account has no unpaid order with
/// `order_number`, or [`DbError::Sqlx`] if any statement fails. On error
/// nothing is written.
pub async fn record_payment(
    pool: &PgPool,
    account_id: i64,
    order_number: &str,
    payment_method: &str,
    status: &str,
) -> Result<PaymentReceipt, DbError> {
    let mut tx = pool.begin().await?;

    let (order_id, order_total) = sqlx::query_as::<_, (i64, Decimal)>(
        "SELECT id, order_total FROM orders \
         WHERE account_id = $1 AND order_number = $2 AND is_ordered = false \
         FOR UPDATE",
    )
    .bind(account_id)
    .bind(order_number)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    let payment = sqlx::query_as::<_, PaymentRow>(
        "INSERT INTO payments (payment_id, account_id, payment_method, amount_paid, status) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, payment_id, account_id, payment_method, amount_paid, status, created_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(account_id)
    .bind(payment_method)
    .bind(order_total)
    .bind(status)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE orders SET payment_id = $2, is_ordered = true, updated_at = NOW() WHERE id = $1",
    )
    .bind(order_id)
    .bind(payment.id)
    .execute(&mut *tx)
    .await?;

    let owner = OwnerIds {
        cart_id: None,
        account_id: Some(account_id),
    };
    let lines = load_lines(&mut *tx, owner, false).await?;

    for line in &lines {
        let order_product_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO order_products \
                 (order_id, payment_id, account_id, product_id, quantity, product_price, ordered) \
             VALUES ($1, $2, $3, $4, $5, $6, true) \
             RETURNING id",
        )
        .bind(order_id)
        .bind(payment.id)
        .bind(account_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO order_product_variations (order_product_id, variation_id) \
             SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(order_product_id)
        .bind(line.variation_set().to_vec())
        .execute(&mut *tx)
        .await?;

        let stock = sqlx::query_scalar::<_, i32>(
            "UPDATE products SET stock = stock - $2, modified_at = NOW() \
             WHERE id = $1 \
             RETURNING stock",
        )
        .bind(line.product_id)
        .bind(line.quantity)
        .fetch_one(&mut *tx)
        .await?;

        if stock < 0 {
            tracing::warn!(
                product_id = line.product_id,
                stock,
                order_number,
                "product oversold; stock is negative"
            );
        }
    }

    sqlx::query("DELETE FROM cart_items WHERE account_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        order_number,
        payment_id = %payment.payment_id,
        lines = lines.len(),
        "payment recorded"
    );

    Ok(PaymentReceipt {
        order_number: order_number.to_string(),
        payment,
        lines_moved: lines.len(),
    })
}

/// Returns a payment by its public transaction id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_payment_by_payment_id(
    pool: &PgPool,
    payment_id: &str,
) -> Result<Option<PaymentRow>, DbError> {
    let row = sqlx::query_as::<_, PaymentRow>(
        "SELECT id, payment_id, account_id, payment_method, amount_paid, status, created_at \
         FROM payments WHERE payment_id = $1",
    )
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
