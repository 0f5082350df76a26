use greatkart_core::CatalogFile;
use sqlx::PgPool;

use crate::DbError;

/// Row counts written by [`seed_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub products: usize,
    pub variations: usize,
}

/// Upsert categories, products and variations from a catalog file.
///
/// Categories and products are matched by slug, variations by product,
/// category and value. Stock and availability are overwritten with the
/// file's values. All upserts run inside a single transaction; if any
/// operation fails the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool, catalog: &CatalogFile) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    for category in &catalog.categories {
        let category_id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (title, slug, description, image) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (slug) DO UPDATE SET \
                 title = EXCLUDED.title, \
                 description = EXCLUDED.description, \
                 image = EXCLUDED.image, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&category.title)
        .bind(category.slug())
        .bind(&category.description)
        .bind(&category.image)
        .fetch_one(&mut *tx)
        .await?;
        summary.categories += 1;

        for product in &category.products {
            let product_id: i64 = sqlx::query_scalar(
                "INSERT INTO products \
                     (category_id, title, slug, description, price, image, stock, is_available) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (slug) DO UPDATE SET \
                     category_id = EXCLUDED.category_id, \
                     title = EXCLUDED.title, \
                     description = EXCLUDED.description, \
                     price = EXCLUDED.price, \
                     image = EXCLUDED.image, \
                     stock = EXCLUDED.stock, \
                     is_available = EXCLUDED.is_available, \
                     modified_at = NOW() \
                 RETURNING id",
            )
            .bind(category_id)
            .bind(&product.title)
            .bind(product.slug())
            .bind(&product.description)
            .bind(product.price)
            .bind(&product.image)
            .bind(product.stock)
            .bind(product.is_available)
            .fetch_one(&mut *tx)
            .await?;
            summary.products += 1;

            for variation in &product.variations {
                sqlx::query(
                    "INSERT INTO variations (product_id, category, value, is_active) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (product_id, category, value) DO UPDATE \
                     SET is_active = EXCLUDED.is_active",
                )
                .bind(product_id)
                .bind(variation.category.as_str())
                .bind(&variation.value)
                .bind(variation.is_active)
                .execute(&mut *tx)
                .await?;
                summary.variations += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(summary)
}
