//! Database maintenance commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Load the catalog seed file (categories, products, variations)
    Seed {
        /// Seed file to load; defaults to `GREATKART_CATALOG_PATH`
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub(crate) async fn run_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    greatkart_db::ping(pool).await?;
    println!("database ok");
    Ok(())
}

pub(crate) async fn run_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = greatkart_db::run_migrations(pool).await?;
    println!("migrations up to date ({applied} applied)");
    Ok(())
}

/// Validate and upsert the catalog at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, or if
/// the database write fails. Nothing is written in either case.
pub(crate) async fn run_seed(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let catalog = greatkart_core::catalog::load_catalog(path)?;
    let summary = greatkart_db::seed_catalog(pool, &catalog).await?;

    tracing::info!(
        path = %path.display(),
        categories = summary.categories,
        products = summary.products,
        variations = summary.variations,
        "catalog seeded"
    );
    println!(
        "seeded {} categories, {} products, {} variations from {}",
        summary.categories,
        summary.products,
        summary.variations,
        path.display()
    );
    Ok(())
}
