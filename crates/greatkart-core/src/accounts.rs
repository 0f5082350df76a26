//! Account registration rules, password hashing and login redirects.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use thiserror::Error;

use crate::validation::{is_valid_email, ValidationErrors};

pub const MIN_USERNAME_CHARS: usize = 4;
pub const MAX_USERNAME_CHARS: usize = 50;
pub const MIN_PASSWORD_CHARS: usize = 4;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

/// Raw registration form input.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Registration input that passed every offline check. Email uniqueness is
/// checked against storage separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    /// Applies the registration rules, reporting every failing field.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] when any field is rejected.
    pub fn validate(self) -> Result<ValidRegistration, ValidationErrors> {
        let username = self.username.trim().to_string();
        let email = normalize_email(&self.email);
        let mut errors = ValidationErrors::new();

        let username_len = username.chars().count();
        if username_len < MIN_USERNAME_CHARS {
            errors.push("username", "Username must be at least 4 characters long.");
        } else if username_len > MAX_USERNAME_CHARS {
            errors.push("username", "Username must be at most 50 characters long.");
        }
        if !is_valid_email(&email) {
            errors.push("email", "Invalid email address");
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            errors.push("password", "Password must be at least 4 characters long.");
        }
        if self.password != self.confirm_password {
            errors.push("confirm_password", "Password does not match.");
        }

        errors.into_result(ValidRegistration {
            username,
            email,
            password: self.password,
        })
    }
}

/// Trims the address and lower-cases its domain part; the local part keeps
/// its case.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => trimmed.to_string(),
    }
}

/// Hashes a password into an argon2 PHC string.
///
/// # Errors
///
/// Returns [`PasswordError`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

/// Checks `password` against a stored PHC hash. A malformed hash never verifies.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Resolves the post-login redirect target.
///
/// Only same-site relative paths are honoured; anything else, including
/// protocol-relative `//host` URLs, falls back to `/`.
#[must_use]
pub fn safe_next_path(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, email: &str, password: &str, confirm: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn valid_registration_normalizes_email() {
        let valid = registration("janed", "Jane@Example.COM", "secret", "secret")
            .validate()
            .expect("valid registration");
        assert_eq!(valid.email, "Jane@example.com");
        assert_eq!(valid.username, "janed");
    }

    #[test]
    fn short_username_and_password_are_rejected() {
        let errors = registration("abc", "a@example.com", "abc", "abc")
            .validate()
            .unwrap_err();
        let fields: Vec<&str> = errors.fields().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "password"]);
    }

    #[test]
    fn mismatched_confirmation_is_rejected() {
        let errors = registration("janed", "a@example.com", "secret", "secrat")
            .validate()
            .unwrap_err();
        assert_eq!(errors.fields()[0].field, "confirm_password");
        assert_eq!(errors.fields()[0].message, "Password does not match.");
    }

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn next_path_accepts_relative_paths_only() {
        assert_eq!(safe_next_path(Some("/cart/checkout")), "/cart/checkout");
        assert_eq!(safe_next_path(Some("//evil.example")), "/");
        assert_eq!(safe_next_path(Some("https://evil.example")), "/");
        assert_eq!(safe_next_path(Some("/\\evil.example")), "/");
        assert_eq!(safe_next_path(None), "/");
    }
}
