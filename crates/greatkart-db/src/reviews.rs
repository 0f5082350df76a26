//! Database operations for the `review_ratings` table.

use chrono::{DateTime, Utc};
use greatkart_core::ReviewInput;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A review joined with its author's username.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub product_id: i64,
    pub account_id: i64,
    pub username: String,
    pub subject: String,
    pub review: String,
    pub rating: Decimal,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Average rating and number of approved reviews for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct ReviewSummary {
    /// `None` when the product has no approved reviews.
    pub average: Option<Decimal>,
    pub count: i64,
}

/// Creates or updates `account_id`'s review of `product_id`.
///
/// Returns the review id and `true` if a new review was created, `false` if
/// an existing one was updated.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the write fails.
pub async fn upsert_review(
    pool: &PgPool,
    product_id: i64,
    account_id: i64,
    input: &ReviewInput,
    ip: &str,
) -> Result<(i64, bool), DbError> {
    let product_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(pool)
            .await?;
    if !product_exists {
        return Err(DbError::NotFound);
    }

    // xmax is zero only for a freshly inserted tuple.
    let (id, created) = sqlx::query_as::<_, (i64, bool)>(
        "INSERT INTO review_ratings (product_id, account_id, subject, review, rating, ip) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (account_id, product_id) DO UPDATE SET \
             subject    = EXCLUDED.subject, \
             review     = EXCLUDED.review, \
             rating     = EXCLUDED.rating, \
             ip         = EXCLUDED.ip, \
             updated_at = NOW() \
         RETURNING id, (xmax = 0) AS created",
    )
    .bind(product_id)
    .bind(account_id)
    .bind(&input.subject)
    .bind(&input.review)
    .bind(input.rating)
    .bind(ip)
    .fetch_one(pool)
    .await?;

    Ok((id, created))
}

/// Approved reviews of a product, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_reviews(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ReviewRow>, DbError> {
    let rows = sqlx::query_as::<_, ReviewRow>(
        "SELECT r.id, r.product_id, r.account_id, a.username, r.subject, r.review, r.rating, \
                r.status, r.created_at, r.updated_at \
         FROM review_ratings r \
         JOIN accounts a ON a.id = r.account_id \
         WHERE r.product_id = $1 AND r.status = true \
         ORDER BY r.updated_at DESC, r.id DESC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Average rating (two decimal places) and count of approved reviews.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn review_summary(pool: &PgPool, product_id: i64) -> Result<ReviewSummary, DbError> {
    let summary = sqlx::query_as::<_, ReviewSummary>(
        "SELECT ROUND(AVG(rating), 2) AS average, COUNT(*) AS count \
         FROM review_ratings \
         WHERE product_id = $1 AND status = true",
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(summary)
}
