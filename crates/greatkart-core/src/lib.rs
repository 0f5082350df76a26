//! Storage-independent domain logic for the GreatKart storefront.
//!
//! Everything here is pure: validation, cart line matching, login-time cart
//! merge planning, totals and tax, order numbers, catalog paging and review limits. The
//! `greatkart-db` crate applies these decisions to Postgres.

pub mod accounts;
pub mod app_config;
pub mod cart;
pub mod catalog;
mod config;
pub mod orders;
pub mod pricing;
pub mod reviews;
pub mod validation;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use cart::{find_matching_line, plan_merge, CartLine, MergeAction, VariationSet};
pub use catalog::{CatalogFile, PageWindow, SearchFilter, PRODUCTS_PER_PAGE};
pub use config::{load_app_config, load_app_config_from_env};
pub use orders::{BillingInfo, OrderStatus};
pub use pricing::{CartTotals, TAX_PERCENT};
pub use reviews::ReviewInput;
pub use validation::{FieldError, ValidationErrors};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),
    #[error("catalog validation failed: {0}")]
    Validation(String),
}
