use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;

use crate::CoreResult;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the gateway's HMAC of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Amounts go to the gateway in the minor unit (kobo).
pub const MINOR_UNITS: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInit {
    pub email: String,
    /// Minor units.
    pub amount: i64,
    pub reference: String,
    pub metadata: Value,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerification {
    /// Gateway transaction status, `success` when settled.
    pub status: String,
    pub reference: String,
    pub amount: i64,
    pub paid_at: Option<String>,
    pub metadata: Option<Value>,
}

impl PaymentVerification {
    pub fn is_successful(&self) -> bool {
        self.status == "success"
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout for the transaction
    async fn initialize(&self, init: &PaymentInit) -> CoreResult<PaymentSession>;

    /// Looks up the settled state of a transaction
    async fn verify(&self, reference: &str) -> CoreResult<PaymentVerification>;
}

/// Hex HMAC-SHA512 of `body` keyed with the gateway secret.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature header. The header must be
/// the exact lower-case hex digest.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if signature.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Fields that are absent or falsy (`null`, `""`, `0`, `false`) in `value`.
pub fn missing_fields<'a>(value: &Value, fields: &[&'a str]) -> Vec<&'a str> {
    fields
        .iter()
        .copied()
        .filter(|field| is_blank(value.get(*field)))
        .collect()
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"event":"charge.success"}"#;
        let sig = sign("sk_test_secret", body);
        assert_eq!(sig.len(), 128);
        assert!(verify_signature("sk_test_secret", body, &sig));
        assert!(!verify_signature("sk_other", body, &sig));
        assert!(!verify_signature("sk_test_secret", b"{}", &sig));
        assert!(!verify_signature("sk_test_secret", body, "not-hex"));
    }

    #[test]
    fn test_signature_must_match_digest_exactly() {
        let body = br#"{"event":"charge.success"}"#;
        let sig = sign("sk_test_secret", body);
        assert!(!verify_signature("sk_test_secret", body, &sig.to_uppercase()));
        assert!(!verify_signature("sk_test_secret", body, &format!(" {}\n", sig)));
    }

    #[test]
    fn test_missing_fields_treats_falsy_as_missing() {
        let metadata = json!({
            "customer": {"email": "a@b.co"},
            "passengers": [],
            "trip_id": "",
            "total_amount": 0
        });
        let missing = missing_fields(&metadata, &["customer", "passengers", "trip_id", "total_amount", "booking_reference"]);
        assert_eq!(missing, vec!["trip_id", "total_amount", "booking_reference"]);
    }
}
