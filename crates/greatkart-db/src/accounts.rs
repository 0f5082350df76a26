//! Database operations for the `accounts` table.

use chrono::{DateTime, Utc};
use greatkart_core::accounts::{hash_password, normalize_email, verify_password, ValidRegistration};
use sqlx::PgPool;

use crate::{unique_violation, DbError};

/// A row from the `accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// argon2 PHC string.
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Privileges granted to a new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Customer,
    Superuser,
}

/// Creates an active account with a freshly hashed password.
///
/// # Errors
///
/// Returns [`DbError::EmailTaken`] or [`DbError::UsernameTaken`] on a
/// duplicate, [`DbError::Password`] if hashing fails, or [`DbError::Sqlx`]
/// if the insert fails for another reason.
pub async fn create_account(
    pool: &PgPool,
    registration: &ValidRegistration,
    role: AccountRole,
) -> Result<AccountRow, DbError> {
    // argon2 is CPU-bound; keep it off the async workers.
    let password = registration.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let privileged = role == AccountRole::Superuser;

    let result = sqlx::query_as::<_, AccountRow>(
        "INSERT INTO accounts (username, email, password_hash, is_active, is_staff, is_superuser) \
         VALUES ($1, $2, $3, true, $4, $4) \
         RETURNING id, username, email, password_hash, is_active, is_staff, is_superuser, \
                   date_joined, last_login",
    )
    .bind(&registration.username)
    .bind(&registration.email)
    .bind(&password_hash)
    .bind(privileged)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(e) => match unique_violation(&e) {
            Some("accounts_email_key") => Err(DbError::EmailTaken),
            Some("accounts_username_key") => Err(DbError::UsernameTaken),
            _ => Err(DbError::Sqlx(e)),
        },
    }
}

/// Returns an account by id, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account(pool: &PgPool, account_id: i64) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, username, email, password_hash, is_active, is_staff, is_superuser, \
                date_joined, last_login \
         FROM accounts WHERE id = $1",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the account registered under `email` after normalisation, or
/// `None` if there is none.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, username, email, password_hash, is_active, is_staff, is_superuser, \
                date_joined, last_login \
         FROM accounts WHERE email = $1",
    )
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Checks a login attempt. Returns the account when the email exists, the
/// password verifies and the account is active; `None` otherwise.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the lookup fails.
pub async fn authenticate(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<Option<AccountRow>, DbError> {
    let Some(account) = get_account_by_email(pool, email).await? else {
        return Ok(None);
    };

    if !account.is_active {
        return Ok(None);
    }

    let password = password.to_owned();
    let stored_hash = account.password_hash.clone();
    let verified =
        tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await?;
    if !verified {
        return Ok(None);
    }

    Ok(Some(account))
}
