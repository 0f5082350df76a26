//! Database operations for `carts`, `cart_items`, and `cart_item_variations`.
//!
//! Cart lines are owned either by a guest cart, keyed by the session's
//! public id, or directly by an account. Line identity and merge decisions
//! come from [`greatkart_core::cart`]; this module only applies them.

use greatkart_core::cart::{decrement, find_matching_line, plan_merge, Decrement};
use greatkart_core::{CartLine, CartTotals, MergeAction, VariationSet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whose cart an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    /// Anonymous cart identified by its cart key.
    Guest(String),
    Account(i64),
}

/// Variation attached to a cart or order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationLabel {
    pub id: i64,
    pub category: String,
    pub value: String,
}

/// A cart line with the product fields shown on the cart page.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineRow {
    pub id: i64,
    pub product_id: i64,
    pub product_title: String,
    pub product_slug: String,
    pub category_slug: String,
    pub unit_price: Decimal,
    pub stock: i32,
    pub quantity: i32,
    pub is_active: bool,
    pub variations: Json<Vec<VariationLabel>>,
}

impl CartLineRow {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    #[must_use]
    pub fn variation_set(&self) -> VariationSet {
        self.variations.iter().map(|v| v.id).collect()
    }
}

/// Result of adding one unit to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub line_id: i64,
    pub quantity: i32,
    /// `false` when an existing line was bumped.
    pub created: bool,
}

/// What a login-time merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub absorbed: usize,
    pub reassigned: usize,
}

/// The identity columns of a line, enough for matching.
#[derive(Debug, sqlx::FromRow)]
struct LineKeyRow {
    id: i64,
    product_id: i64,
    quantity: i32,
    variation_ids: Vec<i64>,
}

impl From<LineKeyRow> for CartLine {
    fn from(row: LineKeyRow) -> Self {
        CartLine {
            id: row.id,
            product_id: row.product_id,
            variations: row.variation_ids.into(),
            quantity: row.quantity,
        }
    }
}

/// Owner resolved to column values. Exactly one is set for an existing cart;
/// both are `None` for a guest cart that was never created.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OwnerIds {
    pub(crate) cart_id: Option<i64>,
    pub(crate) account_id: Option<i64>,
}

impl OwnerIds {
    fn is_empty(self) -> bool {
        self.cart_id.is_none() && self.account_id.is_none()
    }
}

/// Computes cart page totals from loaded lines.
#[must_use]
pub fn cart_totals(lines: &[CartLineRow]) -> CartTotals {
    CartTotals::from_lines(lines.iter().map(|line| (line.quantity, line.unit_price)))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Active lines in `owner`'s cart, oldest first.
///
/// A guest key with no cart yet yields an empty list.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cart_lines(pool: &PgPool, owner: &CartOwner) -> Result<Vec<CartLineRow>, DbError> {
    let mut conn = pool.acquire().await?;
    let ids = resolve_owner(&mut *conn, owner, false).await?;
    load_lines(&mut *conn, ids, true).await
}

/// Returns `true` if `owner` has any line for `product_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn product_in_cart(
    pool: &PgPool,
    owner: &CartOwner,
    product_id: i64,
) -> Result<bool, DbError> {
    let mut conn = pool.acquire().await?;
    let ids = resolve_owner(&mut *conn, owner, false).await?;
    if ids.is_empty() {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS ( \
             SELECT 1 FROM cart_items \
             WHERE (cart_id = $1 OR account_id = $2) AND product_id = $3 \
         )",
    )
    .bind(ids.cart_id)
    .bind(ids.account_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Adds one unit of `product_id` with the selected variations to `owner`'s
/// cart, creating a guest cart on first use.
///
/// `selections` are `(category, value)` pairs matched case-insensitively
/// against the product's active variations; pairs that match nothing are
/// ignored. If a line with the same product and exactly the same variation
/// set exists its quantity is bumped, otherwise a new line is created.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product or the owning account does
/// not exist, or [`DbError::Sqlx`] if any statement fails.
pub async fn add_to_cart(
    pool: &PgPool,
    owner: &CartOwner,
    product_id: i64,
    selections: &[(String, String)],
) -> Result<AddOutcome, DbError> {
    let mut tx = pool.begin().await?;

    let product_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
    if !product_exists {
        return Err(DbError::NotFound);
    }

    let (categories, values): (Vec<String>, Vec<String>) = selections.iter().cloned().unzip();
    let variation_ids = sqlx::query_scalar::<_, i64>(
        "SELECT v.id FROM variations v \
         JOIN UNNEST($2::text[], $3::text[]) AS s(category, value) \
           ON LOWER(v.category) = LOWER(s.category) AND LOWER(v.value) = LOWER(s.value) \
         WHERE v.product_id = $1 AND v.is_active = true",
    )
    .bind(product_id)
    .bind(&categories)
    .bind(&values)
    .fetch_all(&mut *tx)
    .await?;
    let variations: VariationSet = variation_ids.into();

    let ids = resolve_owner(&mut *tx, owner, true).await?;
    let existing = load_line_keys(&mut *tx, ids, Some(product_id)).await?;

    let outcome = if let Some(line_id) = find_matching_line(&existing, product_id, &variations) {
        let quantity = sqlx::query_scalar::<_, i32>(
            "UPDATE cart_items SET quantity = quantity + 1 WHERE id = $1 RETURNING quantity",
        )
        .bind(line_id)
        .fetch_one(&mut *tx)
        .await?;

        AddOutcome {
            line_id,
            quantity,
            created: false,
        }
    } else {
        let line_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO cart_items (cart_id, account_id, product_id, quantity, is_active) \
             VALUES ($1, $2, $3, 1, true) \
             RETURNING id",
        )
        .bind(ids.cart_id)
        .bind(ids.account_id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO cart_item_variations (cart_item_id, variation_id) \
             SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(line_id)
        .bind(variations.to_vec())
        .execute(&mut *tx)
        .await?;

        AddOutcome {
            line_id,
            quantity: 1,
            created: true,
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Removes one unit from a line, deleting the line when its last unit goes.
///
/// Returns the remaining quantity, or `None` if the line was deleted.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if `line_id` is not a line for
/// `product_id` in `owner`'s cart, or [`DbError::Sqlx`] on failure.
pub async fn remove_one(
    pool: &PgPool,
    owner: &CartOwner,
    product_id: i64,
    line_id: i64,
) -> Result<Option<i32>, DbError> {
    let mut tx = pool.begin().await?;
    let ids = resolve_owner(&mut *tx, owner, false).await?;

    let quantity = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM cart_items \
         WHERE id = $1 AND product_id = $2 AND (cart_id = $3 OR account_id = $4) \
         FOR UPDATE",
    )
    .bind(line_id)
    .bind(product_id)
    .bind(ids.cart_id)
    .bind(ids.account_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    let remaining = match decrement(quantity) {
        Decrement::Reduced(quantity) => {
            sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
                .bind(line_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
            Some(quantity)
        }
        Decrement::Delete => {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(line_id)
                .execute(&mut *tx)
                .await?;
            None
        }
    };

    tx.commit().await?;
    Ok(remaining)
}

/// Deletes a line regardless of its quantity.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if `line_id` is not a line for
/// `product_id` in `owner`'s cart, or [`DbError::Sqlx`] on failure.
pub async fn delete_line(
    pool: &PgPool,
    owner: &CartOwner,
    product_id: i64,
    line_id: i64,
) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;
    let ids = resolve_owner(&mut *conn, owner, false).await?;

    let result = sqlx::query(
        "DELETE FROM cart_items \
         WHERE id = $1 AND product_id = $2 AND (cart_id = $3 OR account_id = $4)",
    )
    .bind(line_id)
    .bind(product_id)
    .bind(ids.cart_id)
    .bind(ids.account_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Moves the guest cart `cart_key` into `account_id`'s cart on the caller's
/// connection, following [`plan_merge`].
pub(crate) async fn merge_guest_cart(
    conn: &mut PgConnection,
    cart_key: &str,
    account_id: i64,
) -> Result<MergeSummary, DbError> {
    let guest_ids = resolve_owner(conn, &CartOwner::Guest(cart_key.to_string()), false).await?;
    if guest_ids.is_empty() {
        return Ok(MergeSummary::default());
    }

    let guest = load_line_keys(conn, guest_ids, None).await?;
    let account_ids = resolve_owner(conn, &CartOwner::Account(account_id), true).await?;
    let account = load_line_keys(conn, account_ids, None).await?;

    let mut summary = MergeSummary::default();
    for action in plan_merge(&guest, &account) {
        match action {
            MergeAction::Absorb {
                guest_line_id,
                into_line_id,
                quantity,
            } => {
                sqlx::query("UPDATE cart_items SET quantity = quantity + $2 WHERE id = $1")
                    .bind(into_line_id)
                    .bind(quantity)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("DELETE FROM cart_items WHERE id = $1")
                    .bind(guest_line_id)
                    .execute(&mut *conn)
                    .await?;
                summary.absorbed += 1;
            }
            MergeAction::Reassign { guest_line_id } => {
                sqlx::query(
                    "UPDATE cart_items SET cart_id = NULL, account_id = $2 WHERE id = $1",
                )
                .bind(guest_line_id)
                .bind(account_id)
                .execute(&mut *conn)
                .await?;
                summary.reassigned += 1;
            }
        }
    }

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolves `owner` to column values. With `create`, a guest cart is made on
/// first use and an account row is locked for the rest of the transaction.
async fn resolve_owner(
    conn: &mut PgConnection,
    owner: &CartOwner,
    create: bool,
) -> Result<OwnerIds, DbError> {
    match owner {
        CartOwner::Account(account_id) => {
            if create {
                // Row lock on the account serialises writers to its cart.
                sqlx::query_scalar::<_, i64>("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                    .bind(account_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(DbError::NotFound)?;
            }
            Ok(OwnerIds {
                cart_id: None,
                account_id: Some(*account_id),
            })
        }
        CartOwner::Guest(cart_key) => {
            let cart_id = if create {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO carts (cart_key) VALUES ($1) \
                     ON CONFLICT (cart_key) DO UPDATE SET cart_key = EXCLUDED.cart_key \
                     RETURNING id",
                )
                .bind(cart_key)
                .fetch_one(&mut *conn)
                .await?;
                Some(id)
            } else {
                sqlx::query_scalar::<_, i64>("SELECT id FROM carts WHERE cart_key = $1")
                    .bind(cart_key)
                    .fetch_optional(&mut *conn)
                    .await?
            };

            Ok(OwnerIds {
                cart_id,
                account_id: None,
            })
        }
    }
}

async fn load_line_keys(
    conn: &mut PgConnection,
    ids: OwnerIds,
    product_id: Option<i64>,
) -> Result<Vec<CartLine>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, LineKeyRow>(
        "SELECT ci.id, ci.product_id, ci.quantity, \
                COALESCE( \
                    ARRAY_AGG(civ.variation_id ORDER BY civ.variation_id) \
                        FILTER (WHERE civ.variation_id IS NOT NULL), \
                    '{}'::bigint[] \
                ) AS variation_ids \
         FROM cart_items ci \
         LEFT JOIN cart_item_variations civ ON civ.cart_item_id = ci.id \
         WHERE (ci.cart_id = $1 OR ci.account_id = $2) \
           AND ($3::bigint IS NULL OR ci.product_id = $3) \
         GROUP BY ci.id \
         ORDER BY ci.id",
    )
    .bind(ids.cart_id)
    .bind(ids.account_id)
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(CartLine::from).collect())
}

/// Loads full lines for an owner. `active_only` restricts to lines shown on
/// the cart page; payment moves every line.
pub(crate) async fn load_lines(
    conn: &mut PgConnection,
    ids: OwnerIds,
    active_only: bool,
) -> Result<Vec<CartLineRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, CartLineRow>(
        "SELECT ci.id, ci.product_id, p.title AS product_title, p.slug AS product_slug, \
                c.slug AS category_slug, p.price AS unit_price, p.stock, ci.quantity, ci.is_active, \
                COALESCE( \
                    JSONB_AGG( \
                        JSONB_BUILD_OBJECT('id', v.id, 'category', v.category, 'value', v.value) \
                        ORDER BY v.category, v.id \
                    ) FILTER (WHERE v.id IS NOT NULL), \
                    '[]'::jsonb \
                ) AS variations \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         JOIN categories c ON c.id = p.category_id \
         LEFT JOIN cart_item_variations civ ON civ.cart_item_id = ci.id \
         LEFT JOIN variations v ON v.id = civ.variation_id \
         WHERE (ci.cart_id = $1 OR ci.account_id = $2) \
           AND ($3 = false OR ci.is_active = true) \
         GROUP BY ci.id, p.id, c.id \
         ORDER BY ci.id",
    )
    .bind(ids.cart_id)
    .bind(ids.account_id)
    .bind(active_only)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(quantity: i32, unit_price: Decimal) -> CartLineRow {
        CartLineRow {
            id: 1,
            product_id: 1,
            product_title: "Denim Shirt".to_string(),
            product_slug: "denim-shirt".to_string(),
            category_slug: "shirts".to_string(),
            unit_price,
            stock: 10,
            quantity,
            is_active: true,
            variations: Json(vec![
                VariationLabel {
                    id: 7,
                    category: "size".to_string(),
                    value: "M".to_string(),
                },
                VariationLabel {
                    id: 3,
                    category: "color".to_string(),
                    value: "Blue".to_string(),
                },
            ]),
        }
    }

    #[test]
    fn line_total_multiplies_quantity() {
        assert_eq!(row(3, Decimal::new(1250, 2)).line_total(), Decimal::new(3750, 2));
    }

    #[test]
    fn variation_set_uses_ids() {
        assert_eq!(row(1, Decimal::ONE).variation_set().to_vec(), vec![3, 7]);
    }

    #[test]
    fn cart_totals_apply_tax() {
        let totals = cart_totals(&[row(2, Decimal::new(5000, 2))]);
        assert_eq!(totals.total, Decimal::new(10000, 2));
        assert_eq!(totals.tax, Decimal::new(200, 2));
        assert_eq!(totals.grand_total, Decimal::new(10200, 2));
    }

    #[test]
    fn line_key_row_converts_to_cart_line() {
        let line = CartLine::from(LineKeyRow {
            id: 4,
            product_id: 9,
            quantity: 2,
            variation_ids: vec![5, 1],
        });
        assert_eq!(line.variations.to_vec(), vec![1, 5]);
        assert_eq!(line.quantity, 2);
    }
}
