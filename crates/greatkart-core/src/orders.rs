//! Order lifecycle vocabulary and checkout form validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::validation::{is_alphabetic, is_valid_email, phone_digit_count, ValidationErrors};

pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_COMMENT_CHARS: usize = 200;
const MAX_NAME_CHARS: usize = 50;

/// Fulfilment status of an order. Independent of whether it has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Accepted,
    Completed,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(OrderStatus::New),
            "Accepted" => Ok(OrderStatus::Accepted),
            "Completed" => Ok(OrderStatus::Completed),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!(
                "unknown order status '{other}'; expected New, Accepted, Completed or Cancelled"
            )),
        }
    }
}

/// Builds the human-readable order number: `YYYYMMDD` followed by the row id.
#[must_use]
pub fn order_number(placed_on: NaiveDate, order_id: i64) -> String {
    format!("{}{order_id}", placed_on.format("%Y%m%d"))
}

/// Returns `true` for strings shaped like an order number (8-digit date prefix
/// plus at least one id digit).
#[must_use]
pub fn is_order_number(value: &str) -> bool {
    value.len() > 8
        && value.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(&value[..8], "%Y%m%d").is_ok()
}

/// Billing details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub comment: String,
}

impl BillingInfo {
    /// Trims every field and checks the checkout rules, reporting all failures.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing each rejected field.
    pub fn validate(self) -> Result<Self, ValidationErrors> {
        let cleaned = Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            city: self.city.trim().to_string(),
            address: self.address.trim().to_string(),
            comment: self.comment.trim().to_string(),
        };
        let mut errors = ValidationErrors::new();

        if !is_alphabetic(&cleaned.first_name) {
            errors.push("first_name", "First name should only contain letters");
        } else if cleaned.first_name.chars().count() > MAX_NAME_CHARS {
            errors.push("first_name", "First name is too long");
        }
        if !is_alphabetic(&cleaned.last_name) {
            errors.push("last_name", "Last name should only contain letters");
        } else if cleaned.last_name.chars().count() > MAX_NAME_CHARS {
            errors.push("last_name", "Last name is too long");
        }
        if !is_valid_email(&cleaned.email) {
            errors.push("email", "Invalid email address");
        }
        if phone_digit_count(&cleaned.phone) < MIN_PHONE_DIGITS {
            errors.push("phone", "Phone number must be at least 10 digits");
        }
        if !is_alphabetic(&cleaned.city) {
            errors.push("city", "City name should only contain letters");
        }
        if cleaned.address.is_empty() {
            errors.push("address", "Address is required");
        }
        if cleaned.comment.chars().count() > MAX_COMMENT_CHARS {
            errors.push("comment", "Comment should be less than 200 characters");
        }

        errors.into_result(cleaned)
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_billing() -> BillingInfo {
        BillingInfo {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: "5550102030".to_string(),
            city: "Lisbon".to_string(),
            address: "Rua Augusta 1".to_string(),
            comment: String::new(),
        }
    }

    fn failed_fields(result: Result<BillingInfo, ValidationErrors>) -> Vec<String> {
        result
            .expect_err("expected validation failure")
            .fields()
            .iter()
            .map(|e| e.field.clone())
            .collect()
    }

    #[test]
    fn order_number_is_date_prefix_plus_id() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(order_number(date, 42), "2026030742");
        assert!(is_order_number(&order_number(date, 1)));
    }

    #[test]
    fn is_order_number_rejects_bad_shapes() {
        assert!(!is_order_number("20260307"));
        assert!(!is_order_number("2026130712"));
        assert!(!is_order_number("20260307ab"));
        assert!(!is_order_number(""));
    }

    #[test]
    fn order_status_round_trips_through_strings() {
        for status in [
            OrderStatus::New,
            OrderStatus::Accepted,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn valid_billing_passes_and_is_trimmed() {
        let mut input = valid_billing();
        input.first_name = "  Jane ".to_string();
        let cleaned = input.validate().expect("valid billing");
        assert_eq!(cleaned.first_name, "Jane");
        assert_eq!(cleaned.full_name(), "Jane Doe");
    }

    #[test]
    fn names_and_city_must_be_alphabetic() {
        let mut input = valid_billing();
        input.first_name = "Jane2".to_string();
        input.last_name = "O'Neil".to_string();
        input.city = "San Jose".to_string();
        assert_eq!(
            failed_fields(input.validate()),
            vec!["first_name", "last_name", "city"]
        );
    }

    #[test]
    fn short_phone_is_rejected() {
        let mut input = valid_billing();
        input.phone = "555-0102".to_string();
        assert_eq!(failed_fields(input.validate()), vec!["phone"]);
    }

    #[test]
    fn bad_email_is_rejected() {
        let mut input = valid_billing();
        input.email = "jane.example.com".to_string();
        assert_eq!(failed_fields(input.validate()), vec!["email"]);
    }

    #[test]
    fn long_comment_is_rejected() {
        let mut input = valid_billing();
        input.comment = "x".repeat(201);
        assert_eq!(failed_fields(input.validate()), vec!["comment"]);

        let mut input = valid_billing();
        input.comment = "x".repeat(200);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn missing_address_is_rejected() {
        let mut input = valid_billing();
        input.address = "   ".to_string();
        assert_eq!(failed_fields(input.validate()), vec!["address"]);
    }
}
