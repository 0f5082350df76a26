//! Product review input rules.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::validation::ValidationErrors;

pub const MAX_SUBJECT_CHARS: usize = 100;
pub const MAX_REVIEW_CHARS: usize = 500;
pub const MAX_RATING: u32 = 5;

/// A review as submitted by a signed-in customer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub review: String,
    pub rating: Decimal,
}

impl ReviewInput {
    /// Trims the text fields, rounds the rating to one decimal place and
    /// checks the length and range limits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing each rejected field.
    pub fn validate(self) -> Result<Self, ValidationErrors> {
        let cleaned = Self {
            subject: self.subject.trim().to_string(),
            review: self.review.trim().to_string(),
            rating: self.rating.round_dp(1),
        };
        let mut errors = ValidationErrors::new();

        if cleaned.subject.chars().count() > MAX_SUBJECT_CHARS {
            errors.push("subject", "Subject must be at most 100 characters long.");
        }
        if cleaned.review.chars().count() > MAX_REVIEW_CHARS {
            errors.push("review", "Review must be at most 500 characters long.");
        }
        if cleaned.rating.is_sign_negative() || cleaned.rating > Decimal::from(MAX_RATING) {
            errors.push("rating", "Rating must be between 0 and 5.");
        }

        errors.into_result(cleaned)
    }
}
