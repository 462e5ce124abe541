use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps customer contact data so it never lands in logs verbatim.
///
/// `Debug`/`Display` render a partial mask (`j***@example.com`, `*********678`);
/// serialization passes the real value through because API responses need it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn masked(&self) -> String {
        let raw = self.0.as_ref();
        if let Some((local, domain)) = raw.split_once('@') {
            let first: String = local.chars().take(1).collect();
            return format!("{}***@{}", first, domain);
        }
        let len = raw.chars().count();
        if len <= 3 {
            return "*".repeat(len);
        }
        let tail: String = raw.chars().skip(len - 3).collect();
        format!("{}{}", "*".repeat(len - 3), tail)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_mask_keeps_domain() {
        let email = Masked("jane@example.com".to_string());
        assert_eq!(format!("{}", email), "j***@example.com");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"jane@example.com\"");
    }

    #[test]
    fn test_phone_mask_keeps_tail() {
        let phone = Masked("+2348012345678");
        assert_eq!(format!("{:?}", phone), "***********678");
    }
}
