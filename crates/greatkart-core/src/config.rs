use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("GREATKART_ENV", "development"))?;

    let bind_addr: SocketAddr = parse_as(
        "GREATKART_BIND_ADDR",
        &or_default("GREATKART_BIND_ADDR", "0.0.0.0:8000"),
    )?;
    let log_level = or_default("GREATKART_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default(
        "GREATKART_CATALOG_PATH",
        "./config/catalog.yaml",
    ));

    let db_max_connections: u32 = parse_as(
        "GREATKART_DB_MAX_CONNECTIONS",
        &or_default("GREATKART_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "GREATKART_DB_MIN_CONNECTIONS",
        &or_default("GREATKART_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "GREATKART_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("GREATKART_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let session_ttl_hours: u32 = parse_as(
        "GREATKART_SESSION_TTL_HOURS",
        &or_default("GREATKART_SESSION_TTL_HOURS", "336"),
    )?;
    if session_ttl_hours == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "GREATKART_SESSION_TTL_HOURS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let rate_limit_per_minute: usize = parse_as(
        "GREATKART_RATE_LIMIT_PER_MINUTE",
        &or_default("GREATKART_RATE_LIMIT_PER_MINUTE", "120"),
    )?;
    let session_sweep_cron = or_default("GREATKART_SESSION_SWEEP_CRON", "0 0 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        session_ttl_hours,
        rate_limit_per_minute,
        session_sweep_cron,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "GREATKART_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
