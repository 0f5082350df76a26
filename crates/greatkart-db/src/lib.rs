//! Postgres persistence for the GreatKart storefront.
//!
//! One module per entity. Functions take a `&PgPool` and open their own
//! transaction whenever they write more than one statement.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

use greatkart_core::accounts::PasswordError;
use greatkart_core::AppConfig;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/greatkart-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("cart is empty")]
    EmptyCart,
    #[error("email address is already registered")]
    EmailTaken,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("invalid order status: {0}")]
    InvalidOrderStatus(String),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("password task failed: {0}")]
    PasswordTask(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // _sqlx_migrations does not exist on a fresh database; treat that as zero.
    let applied_before = count_applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = count_applied_migrations(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn count_applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

/// Name of the unique constraint a failed statement violated, if any.
pub(crate) fn unique_violation(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn unique_violation_ignores_other_errors() {
        assert!(unique_violation(&sqlx::Error::RowNotFound).is_none());
    }
}

pub mod accounts;
pub mod carts;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod seed;
pub mod sessions;

pub use accounts::{
    authenticate, create_account, get_account, get_account_by_email, AccountRole, AccountRow,
};
pub use carts::{
    add_to_cart, cart_totals, delete_line, list_cart_lines, product_in_cart, remove_one,
    AddOutcome, CartLineRow, CartOwner, MergeSummary, VariationLabel,
};
pub use catalog::{
    count_search_results, count_store_products, get_category_by_slug, get_product,
    get_product_by_slugs, list_active_variations, list_available_products, list_categories,
    list_store_products, max_product_price, search_products, CategoryRow, ProductRow,
    VariationRow,
};
pub use orders::{
    count_completed_orders, get_completed_order, get_order_for_account, list_completed_orders,
    list_order_products, list_recent_orders, place_order, update_order_status, OrderProductRow,
    OrderRow, PlacedOrder,
};
pub use payments::{get_payment_by_payment_id, record_payment, PaymentReceipt, PaymentRow};
pub use reviews::{list_product_reviews, review_summary, upsert_review, ReviewRow, ReviewSummary};
pub use seed::{seed_catalog, SeedSummary};
pub use sessions::{
    create_session, delete_session, find_session_by_token, hash_token, login,
    purge_expired_sessions, IssuedSession, LoginOutcome, SessionRow,
};
