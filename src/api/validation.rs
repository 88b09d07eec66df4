//! Input validation for API requests.
//!
//! This module provides validation functions for API request data,
//! ensuring all inputs meet the required format and constraints.
//!
//! For collecting multiple validation errors and returning them as an ApiError,
//! use the `ValidationErrorBuilder` from the `error` module.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

/// Message used for any missing required field
pub const REQUIRED: &str = "This field is required.";

/// Prices are `DECIMAL(10, 2)`
const PRICE_MAX_DIGITS: u32 = 10;
const PRICE_DECIMAL_PLACES: u32 = 2;

/// Largest value a positive integer column accepts
pub const POSITIVE_INTEGER_MAX: i64 = 2_147_483_647;

/// Naive datetime layouts accepted by filters, read as UTC
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

lazy_static! {
    /// Letters, digits and @/./+/-/_ only
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();

    /// Loose email shape check
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();
}

/// Validate a product price and convert it to cents
pub fn validate_price(price: Decimal) -> Result<i64, String> {
    if price <= Decimal::ZERO {
        return Err("Price must be greater than zero.".to_string());
    }

    let normalized = price.normalize();
    if normalized.scale() > PRICE_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {} decimal places.",
            PRICE_DECIMAL_PLACES
        ));
    }

    let whole_digits_limit = PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES;
    if normalized.trunc() >= Decimal::from(10_i64.pow(whole_digits_limit)) {
        return Err(format!(
            "Ensure that there are no more than {} digits in total.",
            PRICE_MAX_DIGITS
        ));
    }

    let mut cents = normalized;
    cents.rescale(PRICE_DECIMAL_PLACES);
    i64::try_from(cents.mantissa()).map_err(|_| "Price is out of range.".to_string())
}

fn check_upper_bound(value: i64) -> Result<(), String> {
    if value > POSITIVE_INTEGER_MAX {
        return Err(format!(
            "Ensure this value is less than or equal to {}.",
            POSITIVE_INTEGER_MAX
        ));
    }
    Ok(())
}

/// Validate a stock level
pub fn validate_stock(stock: i64) -> Result<(), String> {
    if stock < 0 {
        return Err("Ensure this value is greater than or equal to 0.".to_string());
    }
    check_upper_bound(stock)
}

/// Validate an order item quantity
pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if quantity < 1 {
        return Err("Ensure this value is greater than or equal to 1.".to_string());
    }
    check_upper_bound(quantity)
}

/// Validate a product name
pub fn validate_product_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("This field may not be blank.".to_string());
    }

    if name.chars().count() > 200 {
        return Err("Ensure this field has no more than 200 characters.".to_string());
    }

    Ok(())
}

/// Validate a product description
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("This field may not be blank.".to_string());
    }
    Ok(())
}

/// Validate an optional product image path
pub fn validate_image(image: &Option<String>) -> Result<(), String> {
    if let Some(path) = image {
        if path.len() > 100 {
            return Err("Ensure this field has no more than 100 characters.".to_string());
        }
        if path.contains("..") {
            return Err("Image path must not contain '..'".to_string());
        }
    }
    Ok(())
}

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("This field may not be blank.".to_string());
    }

    if username.chars().count() > 150 {
        return Err("Ensure this field has no more than 150 characters.".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }

    Ok(())
}

/// Validate an optional email address (empty is allowed)
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() || EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err("Enter a valid email address.".to_string())
    }
}

/// Parse a `YYYY-MM-DD` date filter value
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| "Enter a valid date.".to_string())
}

/// Parse a datetime filter value. Accepts RFC 3339, a naive datetime
/// (taken as UTC) or a bare date meaning midnight UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| "Enter a valid date/time.".to_string())
}

/// Parse a decimal filter value and convert it to cents
pub fn parse_price_filter(value: &str) -> Result<i64, String> {
    let price: Decimal = value
        .trim()
        .parse()
        .map_err(|_| "Enter a number.".to_string())?;
    let mut cents = price.round_dp(PRICE_DECIMAL_PLACES);
    cents.rescale(PRICE_DECIMAL_PLACES);
    i64::try_from(cents.mantissa()).map_err(|_| "Enter a number.".to_string())
}
