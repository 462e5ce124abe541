use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use busline_core::payment::{PaymentGateway, PaymentInit, PaymentSession, PaymentVerification};
use busline_core::{CoreError, CoreResult};

/// Paystack REST client, authenticated with the account's secret key.
#[derive(Clone)]
pub struct PaystackClient {
    http: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl PaystackClient {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response, action: &str) -> CoreResult<T> {
        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| CoreError::Payment(format!("{}: unreadable response ({})", action, e)))?;

        if !status.is_success() || !envelope.status {
            warn!("Paystack {} failed ({}): {}", action, status, envelope.message);
            return Err(CoreError::Payment(format!("{}: {}", action, envelope.message)));
        }
        envelope
            .data
            .ok_or_else(|| CoreError::Payment(format!("{}: empty response", action)))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, init: &PaymentInit) -> CoreResult<PaymentSession> {
        let mut body = json!({
            "email": init.email,
            "amount": init.amount,
            "reference": init.reference,
            "metadata": init.metadata,
        });
        if let Some(callback) = &init.callback_url {
            body["callback_url"] = json!(callback);
        }

        debug!("Initializing Paystack transaction {}", init.reference);
        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Payment(format!("Payment initialization failed: {}", e)))?;

        Self::read(response, "Payment initialization failed").await
    }

    async fn verify(&self, reference: &str) -> CoreResult<PaymentVerification> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| CoreError::Payment(format!("Payment verification failed: {}", e)))?;

        Self::read(response, "Payment verification failed").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn init() -> PaymentInit {
        PaymentInit {
            email: "ada@example.com".into(),
            amount: 120_000,
            reference: "TE12345678".into(),
            metadata: json!({"trip_id": "abc"}),
            callback_url: Some("https://busline.test/done".into()),
        }
    }

    #[tokio::test]
    async fn test_initialize_sends_bearer_and_parses_session() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transaction/initialize")
                .header("Authorization", "Bearer sk_test_x")
                .json_body_partial(r#"{"amount": 120000, "reference": "TE12345678"}"#);
            then.status(200).json_body(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": "TE12345678"
                }
            }));
        });

        let client = PaystackClient::new(server.base_url(), "sk_test_x");
        let session = client.initialize(&init()).await.unwrap();

        mock.assert();
        assert_eq!(session.access_code, "abc");
        assert_eq!(session.reference, "TE12345678");
    }

    #[tokio::test]
    async fn test_verify_parses_transaction() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/pay_1");
            then.status(200).json_body(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": "success",
                    "reference": "pay_1",
                    "amount": 120000,
                    "paid_at": "2025-01-01T10:00:00.000Z",
                    "metadata": {"trip_id": "abc"}
                }
            }));
        });

        let client = PaystackClient::new(server.base_url(), "sk_test_x");
        let verification = client.verify("pay_1").await.unwrap();
        assert!(verification.is_successful());
        assert_eq!(verification.amount, 120_000);
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_payment_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/missing");
            then.status(400).json_body(json!({
                "status": false,
                "message": "Transaction reference not found"
            }));
        });

        let client = PaystackClient::new(server.base_url(), "sk_test_x");
        let err = client.verify("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::Payment(ref msg) if msg.contains("Transaction reference not found")));
    }
}
