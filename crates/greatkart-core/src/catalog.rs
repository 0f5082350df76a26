//! Catalog seed file, store paging and search filters.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ConfigError;

/// Products shown per store or search page.
pub const PRODUCTS_PER_PAGE: i64 = 10;

/// Width of one price-filter bucket.
pub const PRICE_BUCKET_STEP: i64 = 100;

/// The two kinds of variation a product can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationCategory {
    Color,
    Size,
}

impl VariationCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VariationCategory::Color => "color",
            VariationCategory::Size => "size",
        }
    }
}

impl std::fmt::Display for VariationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Seed file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationConfig {
    pub category: VariationCategory,
    pub value: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub variations: Vec<VariationConfig>,
}

impl ProductConfig {
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

impl CategoryConfig {
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    pub categories: Vec<CategoryConfig>,
}

fn default_true() -> bool {
    true
}

/// Generate a URL-safe slug from a title.
#[must_use]
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c == ' ' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Load and validate the catalog seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_catalog(&content)
}

/// Parse and validate catalog YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_catalog(content: &str) -> Result<CatalogFile, ConfigError> {
    let catalog: CatalogFile = serde_yaml::from_str(content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let mut category_slugs = HashSet::new();
    let mut product_titles = HashSet::new();
    let mut product_slugs = HashSet::new();

    for category in &catalog.categories {
        if category.title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category title must be non-empty".to_string(),
            ));
        }
        let slug = category.slug();
        if slug.is_empty() || !category_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate or empty category slug '{slug}' (from '{}')",
                category.title
            )));
        }

        for product in &category.products {
            if product.title.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "product in category '{}' has an empty title",
                    category.title
                )));
            }
            if !product_titles.insert(product.title.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate product title: '{}'",
                    product.title
                )));
            }
            let slug = product.slug();
            if slug.is_empty() || !product_slugs.insert(slug.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate or empty product slug '{slug}' (from '{}')",
                    product.title
                )));
            }
            if product.price.is_sign_negative() {
                return Err(ConfigError::Validation(format!(
                    "product '{}' has a negative price",
                    product.title
                )));
            }
            if product.stock < 0 {
                return Err(ConfigError::Validation(format!(
                    "product '{}' has negative stock",
                    product.title
                )));
            }

            let mut seen = HashSet::new();
            for variation in &product.variations {
                let key = (variation.category, variation.value.to_lowercase());
                if !seen.insert(key) {
                    return Err(ConfigError::Validation(format!(
                        "product '{}' repeats {} variation '{}'",
                        product.title, variation.category, variation.value
                    )));
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// A resolved page of a listing with `total_count` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page: i64,
    pub num_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    #[serde(skip)]
    pub offset: i64,
    #[serde(skip)]
    pub limit: i64,
}

impl PageWindow {
    /// Resolves a requested page number the forgiving way: missing or
    /// unparsable input is page 1, and anything past the end is the last page.
    #[must_use]
    pub fn resolve(requested: Option<&str>, total_count: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total_count = total_count.max(0);
        let num_pages = ((total_count + per_page - 1) / per_page).max(1);
        let page = requested
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, num_pages);

        Self {
            page,
            num_pages,
            total_count,
            has_next: page < num_pages,
            has_previous: page > 1,
            offset: (page - 1) * per_page,
            limit: per_page,
        }
    }
}

// ---------------------------------------------------------------------------
// Price filter
// ---------------------------------------------------------------------------

/// Upper bound for the price filter: the highest price truncated to whole
/// units plus one bucket. With no products the bound is one bucket.
#[must_use]
pub fn price_ceiling(max_price: Option<Decimal>) -> i64 {
    let whole = max_price
        .map(|p| p.trunc().to_i64().unwrap_or(0))
        .unwrap_or(0);
    whole.max(0) + PRICE_BUCKET_STEP
}

/// Bucket boundaries `0, 100, …` strictly below `ceiling`.
#[must_use]
pub fn price_buckets(ceiling: i64) -> Vec<i64> {
    (0..ceiling.max(0))
        .step_by(usize::try_from(PRICE_BUCKET_STEP).unwrap_or(100))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("min price should be less than max price (got {min} > {max})")]
    InvertedPriceRange { min: Decimal, max: Decimal },
    #[error("invalid {field}: '{value}' is not a number")]
    InvalidPrice { field: &'static str, value: String },
}

/// Validated catalog search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub keyword: String,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl SearchFilter {
    /// Builds a filter from raw query values.
    ///
    /// Each bound defaults on its own: `min_price` to zero and `max_price` to
    /// `ceiling`. An empty string counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidPrice`] for a non-numeric bound and
    /// [`SearchError::InvertedPriceRange`] when `min_price > max_price`.
    pub fn new(
        keyword: Option<&str>,
        min_price: Option<&str>,
        max_price: Option<&str>,
        ceiling: i64,
    ) -> Result<Self, SearchError> {
        let min_price = parse_bound("min_price", min_price)?.unwrap_or(Decimal::ZERO);
        let max_price = parse_bound("max_price", max_price)?.unwrap_or(Decimal::from(ceiling));

        if min_price > max_price {
            return Err(SearchError::InvertedPriceRange {
                min: min_price,
                max: max_price,
            });
        }

        Ok(Self {
            keyword: keyword.map(str::trim).unwrap_or_default().to_string(),
            min_price,
            max_price,
        })
    }

    /// The keyword as a `LIKE` pattern, with `%`, `_` and `\` escaped.
    #[must_use]
    pub fn like_pattern(&self) -> String {
        let mut escaped = String::with_capacity(self.keyword.len() + 2);
        escaped.push('%');
        for c in self.keyword.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

fn parse_bound(field: &'static str, raw: Option<&str>) -> Result<Option<Decimal>, SearchError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| SearchError::InvalidPrice {
                field,
                value: value.to_string(),
            }),
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
