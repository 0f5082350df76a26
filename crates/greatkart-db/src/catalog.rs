//! Database operations for `categories`, `products`, and `variations`.

use chrono::{DateTime, Utc};
use greatkart_core::SearchFilter;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `categories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
}

/// A product joined with the slug and title of its category.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub category_id: i64,
    pub category_slug: String,
    pub category_title: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<String>,
    /// May be negative after overselling.
    pub stock: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A row from the `variations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariationRow {
    pub id: i64,
    pub product_id: i64,
    /// `"color"` or `"size"`.
    pub category: String,
    pub value: String,
    pub is_active: bool,
}

const PRODUCT_SELECT: &str = "\
    SELECT p.id, p.category_id, c.slug AS category_slug, c.title AS category_title, \
           p.title, p.slug, p.description, p.price, p.image, p.stock, p.is_available, \
           p.created_at, p.modified_at \
    FROM products p \
    JOIN categories c ON c.id = p.category_id";

// Backslash is Postgres' default LIKE escape, matching SearchFilter::like_pattern.
const SEARCH_PREDICATE: &str = "\
    p.is_available = true \
    AND p.price BETWEEN $2 AND $3 \
    AND (p.title ILIKE $1 OR p.description ILIKE $1 OR c.title ILIKE $1)";

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Returns every category in creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, title, slug, description, image FROM categories ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a category by slug, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, title, slug, description, image FROM categories WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Returns every available product for the home page, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_available_products(pool: &PgPool) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.is_available = true ORDER BY p.created_at, p.id");
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Counts available products, optionally restricted to one category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_store_products(
    pool: &PgPool,
    category_id: Option<i64>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products \
         WHERE is_available = true \
           AND ($1::bigint IS NULL OR category_id = $1)",
    )
    .bind(category_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Returns one page of available products ordered by id, optionally
/// restricted to one category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_store_products(
    pool: &PgPool,
    category_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} \
         WHERE p.is_available = true \
           AND ($1::bigint IS NULL OR p.category_id = $1) \
         ORDER BY p.id \
         LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(category_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Highest price over all products, available or not. `None` when the
/// catalog is empty.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn max_product_price(pool: &PgPool) -> Result<Option<Decimal>, DbError> {
    let max = sqlx::query_scalar::<_, Option<Decimal>>("SELECT MAX(price) FROM products")
        .fetch_one(pool)
        .await?;

    Ok(max)
}

/// Returns a product by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, product_id: i64) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.id = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Returns the product with `product_slug` in the category with
/// `category_slug`, or `None` if either does not match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slugs(
    pool: &PgPool,
    category_slug: &str,
    product_slug: &str,
) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_SELECT} WHERE c.slug = $1 AND p.slug = $2");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(category_slug)
        .bind(product_slug)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Active variations of a product, colours before sizes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_variations(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<VariationRow>, DbError> {
    let rows = sqlx::query_as::<_, VariationRow>(
        "SELECT id, product_id, category, value, is_active \
         FROM variations \
         WHERE product_id = $1 AND is_active = true \
         ORDER BY category, id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Counts the products matching `filter`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_search_results(pool: &PgPool, filter: &SearchFilter) -> Result<i64, DbError> {
    let sql = format!(
        "SELECT COUNT(*) FROM products p \
         JOIN categories c ON c.id = p.category_id \
         WHERE {SEARCH_PREDICATE}"
    );
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(filter.like_pattern())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Returns one page of products matching `filter`, newest first.
///
/// The keyword is a case-insensitive substring of the title, description or
/// category title; the price range is inclusive on both ends.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn search_products(
    pool: &PgPool,
    filter: &SearchFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_SELECT} \
         WHERE {SEARCH_PREDICATE} \
         ORDER BY p.created_at DESC, p.id DESC \
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(filter.like_pattern())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
