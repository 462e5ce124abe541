use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation;
use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

impl User {
    /// Applies an admin edit. Blank names are ignored; phone must be valid.
    pub fn apply(&mut self, patch: UserPatch) -> CoreResult<()> {
        if let Some(first_name) = patch.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.first_name = first_name.to_string();
        }
        if let Some(last_name) = patch.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.last_name = last_name.to_string();
        }
        if let Some(phone) = patch.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            validation::require_phone(phone)?;
            self.phone = phone.to_string();
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            email: "ada@example.com".into(),
            phone: "08012345678".into(),
            role: "CUSTOMER".into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_patch() {
        let mut u = user();
        u.apply(UserPatch { first_name: Some("  ".into()), is_active: Some(false), ..Default::default() })
            .unwrap();
        assert_eq!(u.first_name, "Ada");
        assert!(!u.is_active);

        let err = u.apply(UserPatch { phone: Some("12".into()), ..Default::default() }).unwrap_err();
        assert_eq!(err.to_string(), "Invalid phone format");
    }
}
