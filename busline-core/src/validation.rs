use std::sync::OnceLock;
use regex::Regex;
use crate::{CoreError, CoreResult};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?\d{10,14}$").expect("valid phone pattern"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Local or international digits, optional leading `+`.
pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone)
}

pub fn require_email(email: &str) -> CoreResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(CoreError::validation("Invalid email format"))
    }
}

pub fn require_phone(phone: &str) -> CoreResult<()> {
    if is_valid_phone(phone) {
        Ok(())
    } else {
        Err(CoreError::validation("Invalid phone format"))
    }
}

/// Fails with the list of blank fields, e.g. `Missing required fields: from, to`.
pub fn require_present(fields: &[(&str, &str)]) -> CoreResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Missing required fields: {}", missing.join(", "))))
    }
}

pub fn require_price_floor(price: i64, floor: i64) -> CoreResult<()> {
    if price < floor {
        return Err(CoreError::Validation(format!("Price must be at least {}", floor)));
    }
    Ok(())
}

pub fn require_seat_count(seats: i32) -> CoreResult<()> {
    if seats < 1 {
        return Err(CoreError::validation("Invalid seat count"));
    }
    Ok(())
}

pub fn require_rating(rating: f32) -> CoreResult<()> {
    if !(0.0..=5.0).contains(&rating) {
        return Err(CoreError::validation("Rating must be between 0 and 5"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("ada@travelease.ng"));
        assert!(!is_valid_email("ada@travelease"));
        assert!(!is_valid_email("ada lovelace@x.com"));
    }

    #[test]
    fn test_phone_format() {
        assert!(is_valid_phone("+2348012345678"));
        assert!(is_valid_phone("08012345678"));
        assert!(!is_valid_phone("0801-234-5678"));
        assert!(!is_valid_phone("12345"));
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = require_present(&[("from", "Lagos"), ("to", " "), ("date", "")]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: to, date");
    }

    #[test]
    fn test_price_floor() {
        assert!(require_price_floor(500, 500).is_ok());
        assert!(require_price_floor(499, 500).is_err());
    }
}
