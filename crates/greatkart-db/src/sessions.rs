//! Database operations for the `sessions` table, including login.
//!
//! A session is identified to clients by an opaque bearer token. Only the
//! token's sha256 digest is stored. The session's `public_id` doubles as the
//! key of its guest cart.

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::carts::{merge_guest_cart, MergeSummary};
use crate::DbError;

/// A row from the `sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub account_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRow {
    /// Key of the guest cart owned by this session.
    #[must_use]
    pub fn cart_key(&self) -> String {
        self.public_id.to_string()
    }
}

/// A newly created session together with its raw token. The token is not
/// recoverable once this value is dropped.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: SessionRow,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub issued: IssuedSession,
    pub merge: MergeSummary,
}

/// Hex sha256 digest of a bearer token, as stored in `sessions.token_hash`.
#[must_use]
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Creates a session that expires after `ttl`, optionally bound to an account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_session(
    pool: &PgPool,
    account_id: Option<i64>,
    ttl: TimeDelta,
) -> Result<IssuedSession, DbError> {
    let mut conn = pool.acquire().await?;
    insert_session(&mut *conn, account_id, ttl).await
}

/// Resolves a bearer token to its unexpired session.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_session_by_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<SessionRow>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT id, public_id, account_id, created_at, expires_at \
         FROM sessions \
         WHERE token_hash = $1 AND expires_at > NOW()",
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Deletes a session. Deleting a session that is already gone is not an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_session(pool: &PgPool, session_id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes every expired session and returns how many were removed.
///
/// Guest carts keyed by those sessions are left in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Signs `account_id` in.
///
/// In one transaction: merges the guest cart of `current` (when it is a
/// guest session) into the account, deletes `current`, issues a new account
/// session and stamps `last_login`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed in
/// that case.
pub async fn login(
    pool: &PgPool,
    account_id: i64,
    current: Option<&SessionRow>,
    ttl: TimeDelta,
) -> Result<LoginOutcome, DbError> {
    let mut tx = pool.begin().await?;
    let mut merge = MergeSummary::default();

    if let Some(session) = current {
        if session.account_id.is_none() {
            merge = merge_guest_cart(&mut *tx, &session.cart_key(), account_id).await?;
        }
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session.id)
            .execute(&mut *tx)
            .await?;
    }

    let issued = insert_session(&mut *tx, Some(account_id), ttl).await?;

    sqlx::query("UPDATE accounts SET last_login = NOW() WHERE id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if merge != MergeSummary::default() {
        tracing::info!(
            account_id,
            absorbed = merge.absorbed,
            reassigned = merge.reassigned,
            "merged guest cart into account"
        );
    }

    Ok(LoginOutcome { issued, merge })
}

async fn insert_session(
    conn: &mut PgConnection,
    account_id: Option<i64>,
    ttl: TimeDelta,
) -> Result<IssuedSession, DbError> {
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + ttl;

    let session = sqlx::query_as::<_, SessionRow>(
        "INSERT INTO sessions (public_id, token_hash, account_id, expires_at) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, public_id, account_id, created_at, expires_at",
    )
    .bind(Uuid::new_v4())
    .bind(hash_token(&token))
    .bind(account_id)
    .bind(expires_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(IssuedSession { token, session })
}
