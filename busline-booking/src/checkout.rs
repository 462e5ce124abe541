use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use busline_core::booking::{BookingInput, PassengerInput};
use busline_core::payment::{self, PaymentGateway, PaymentInit, PaymentSession, PaymentVerification, MINOR_UNITS};
use busline_core::{CoreError, CoreResult};
use busline_shared::pii::Masked;

use crate::bookings::BookingService;

const INIT_METADATA_FIELDS: [&str; 5] = ["customer", "passengers", "trip_id", "total_amount", "booking_reference"];
const WEBHOOK_METADATA_FIELDS: [&str; 4] = ["customer", "passengers", "trip_id", "total_amount"];
const CUSTOMER_FIELDS: [&str; 2] = ["email", "phone"];

#[derive(Debug, Clone, Deserialize)]
pub struct InitializePayment {
    pub email: Option<String>,
    /// Minor units.
    pub amount: Option<i64>,
    pub reference: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub status: bool,
    pub data: PaymentVerification,
    pub booking_reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    BookingCreated(String),
    AlreadyProcessed(String),
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    amount: i64,
    status: String,
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    email: String,
    phone: String,
}

/// Booking intent carried through the gateway as transaction metadata.
#[derive(Debug, Deserialize)]
struct CheckoutMetadata {
    customer: Customer,
    passengers: Vec<PassengerInput>,
    trip_id: Uuid,
    total_amount: f64,
    booking_reference: Option<String>,
    hold_token: Option<String>,
}

/// Payment round trip: open checkout, verify, and turn the gateway's
/// `charge.success` webhook into a booking.
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<BookingService>,
    webhook_secret: String,
    callback_url: Option<String>,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<BookingService>,
        webhook_secret: String,
        callback_url: Option<String>,
    ) -> Self {
        Self { gateway, bookings, webhook_secret, callback_url }
    }

    pub async fn initialize(&self, req: InitializePayment) -> CoreResult<PaymentSession> {
        let (Some(email), Some(amount), Some(metadata)) = (
            req.email.filter(|e| !e.is_empty()),
            req.amount.filter(|a| *a > 0),
            req.metadata,
        ) else {
            return Err(CoreError::validation("Missing required fields"));
        };

        let missing = payment::missing_fields(&metadata, &INIT_METADATA_FIELDS);
        if !missing.is_empty() {
            return Err(CoreError::Validation(format!("Missing metadata fields: {}", missing.join(", "))));
        }
        if let Some(total) = metadata.get("total_amount").and_then(Value::as_f64) {
            if to_minor(total) != amount {
                return Err(CoreError::validation("Amount mismatch"));
            }
        }

        let reference = req
            .reference
            .filter(|r| !r.is_empty())
            .or_else(|| metadata.get("booking_reference").and_then(Value::as_str).map(String::from))
            .ok_or_else(|| CoreError::validation("Missing metadata fields: booking_reference"))?;

        info!("Initializing payment {} for {} ({} minor units)", reference, Masked(email.as_str()), amount);
        self.gateway
            .initialize(&PaymentInit {
                email,
                amount,
                reference,
                metadata,
                callback_url: self.callback_url.clone(),
            })
            .await
    }

    pub async fn verify(&self, reference: Option<String>) -> CoreResult<VerifiedPayment> {
        let reference = reference
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CoreError::validation("Reference is required"))?;

        let verification = self.gateway.verify(&reference).await?;
        if !verification.is_successful() {
            warn!("Payment {} not successful: {}", reference, verification.status);
            return Err(CoreError::Payment("Payment verification failed".to_string()));
        }

        // The webhook may not have landed yet; fall back to the payment reference.
        let booking_reference = match self.bookings.find_by_payment_reference(&reference).await {
            Ok(Some(booking)) => booking.reference,
            Ok(None) => reference.clone(),
            Err(e) => {
                error!("Booking lookup for payment {} failed: {}", reference, e);
                reference.clone()
            }
        };

        Ok(VerifiedPayment { status: true, data: verification, booking_reference })
    }

    /// Authenticates and applies a gateway webhook delivery.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> CoreResult<WebhookOutcome> {
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::validation("Missing signature"))?;
        if !payment::verify_signature(&self.webhook_secret, raw_body, signature) {
            warn!("Rejected webhook with invalid signature");
            return Err(CoreError::validation("Invalid signature"));
        }

        let event: WebhookEvent = serde_json::from_slice(raw_body)
            .map_err(|e| CoreError::Validation(format!("Webhook error: {}", e)))?;
        if event.event != "charge.success" {
            info!("Webhook event not handled: {}", event.event);
            return Ok(WebhookOutcome::Ignored(event.event));
        }

        let input = charge_to_booking(event.data)?;
        let payment_reference = input.payment_reference.clone().unwrap_or_default();
        let created = self.bookings.create(input).await?;
        let reference = created.booking.booking.reference;

        if created.created {
            info!("Booking {} created from payment {}", reference, payment_reference);
            Ok(WebhookOutcome::BookingCreated(reference))
        } else {
            Ok(WebhookOutcome::AlreadyProcessed(reference))
        }
    }
}

fn charge_to_booking(data: Value) -> CoreResult<BookingInput> {
    let charge: ChargeData = serde_json::from_value(data)
        .map_err(|e| CoreError::Validation(format!("Malformed charge data: {}", e)))?;

    if charge.status != "success" {
        return Err(CoreError::validation("Payment not successful"));
    }
    let metadata = charge
        .metadata
        .filter(|m| !m.is_null())
        .ok_or_else(|| CoreError::validation("No metadata"))?;

    let missing = payment::missing_fields(&metadata, &WEBHOOK_METADATA_FIELDS);
    if !missing.is_empty() {
        return Err(CoreError::Validation(format!("Missing metadata fields: {}", missing.join(", "))));
    }
    let missing = payment::missing_fields(&metadata["customer"], &CUSTOMER_FIELDS);
    if !missing.is_empty() {
        return Err(CoreError::Validation(format!("Missing customer fields: {}", missing.join(", "))));
    }
    if !metadata["passengers"].as_array().is_some_and(|p| !p.is_empty()) {
        return Err(CoreError::validation("Invalid passengers array"));
    }

    let metadata: CheckoutMetadata = serde_json::from_value(metadata)
        .map_err(|e| CoreError::Validation(format!("Malformed metadata: {}", e)))?;
    if to_minor(metadata.total_amount) != charge.amount {
        return Err(CoreError::validation("Amount mismatch"));
    }

    Ok(BookingInput {
        trip_id: metadata.trip_id,
        email: metadata.customer.email,
        phone: metadata.customer.phone,
        passengers: metadata.passengers,
        payment_reference: Some(charge.reference),
        reference: metadata.booking_reference,
        hold_token: metadata.hold_token,
        amount_paid: Some(charge.amount),
    })
}

fn to_minor(major: f64) -> i64 {
    (major * MINOR_UNITS as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn charge(amount: i64, total: f64) -> Value {
        json!({
            "reference": "pay_123",
            "amount": amount,
            "status": "success",
            "metadata": {
                "customer": {"email": "ada@example.com", "phone": "+2348012345678"},
                "passengers": [{"name": "Ada", "seat": "01A"}],
                "trip_id": Uuid::nil(),
                "total_amount": total,
                "booking_reference": "TE00000001"
            }
        })
    }

    #[test]
    fn test_charge_maps_to_booking_input() {
        let input = charge_to_booking(charge(120_000, 1200.0)).unwrap();
        assert_eq!(input.payment_reference.as_deref(), Some("pay_123"));
        assert_eq!(input.reference.as_deref(), Some("TE00000001"));
        assert_eq!(input.amount_paid, Some(120_000));
        assert_eq!(input.passengers.len(), 1);
    }

    #[test]
    fn test_charge_amount_mismatch() {
        let err = charge_to_booking(charge(100_000, 1200.0)).unwrap_err();
        assert_eq!(err.to_string(), "Amount mismatch");
    }

    #[test]
    fn test_charge_requires_customer_phone() {
        let mut data = charge(120_000, 1200.0);
        data["metadata"]["customer"]["phone"] = json!("");
        let err = charge_to_booking(data).unwrap_err();
        assert_eq!(err.to_string(), "Missing customer fields: phone");
    }

    #[test]
    fn test_charge_requires_passengers() {
        let mut data = charge(120_000, 1200.0);
        data["metadata"]["passengers"] = json!([]);
        let err = charge_to_booking(data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid passengers array");
    }

    #[test]
    fn test_failed_charge_rejected() {
        let mut data = charge(120_000, 1200.0);
        data["status"] = json!("failed");
        assert!(charge_to_booking(data).is_err());
    }

    mod webhook {
        use super::*;
        use crate::test_support::{Harness, WEBHOOK_SECRET};

        fn success_body(trip_id: Uuid, seat: &str, paid: i64) -> Vec<u8> {
            serde_json::to_vec(&json!({
                "event": "charge.success",
                "data": {
                    "reference": "pay_abc",
                    "amount": paid,
                    "status": "success",
                    "metadata": {
                        "customer": {"email": "ada@example.com", "phone": "+2348012345678"},
                        "passengers": [{"name": "Ada", "seat": seat}],
                        "trip_id": trip_id,
                        "total_amount": paid as f64 / 100.0,
                        "booking_reference": "TE10000001"
                    }
                }
            }))
            .unwrap()
        }

        #[tokio::test]
        async fn test_signed_charge_creates_booking_once() {
            let h = Harness::new();
            let trip = h.seed_trip().await.trip;
            let body = success_body(trip.id, "01A", 500_000);
            let signature = payment::sign(WEBHOOK_SECRET, &body);

            let outcome = h.checkout.handle_webhook(&body, Some(&signature)).await.unwrap();
            assert_eq!(outcome, WebhookOutcome::BookingCreated("TE10000001".into()));

            let replay = h.checkout.handle_webhook(&body, Some(&signature)).await.unwrap();
            assert_eq!(replay, WebhookOutcome::AlreadyProcessed("TE10000001".into()));

            let booking = h.bookings.get("TE10000001").await.unwrap();
            assert_eq!(booking.booking.payment_reference.as_deref(), Some("pay_abc"));
        }

        #[tokio::test]
        async fn test_bad_signature_rejected() {
            let h = Harness::new();
            let trip = h.seed_trip().await.trip;
            let body = success_body(trip.id, "01A", 500_000);

            let err = h.checkout.handle_webhook(&body, Some("deadbeef")).await.unwrap_err();
            assert_eq!(err.to_string(), "Invalid signature");
            let err = h.checkout.handle_webhook(&body, None).await.unwrap_err();
            assert_eq!(err.to_string(), "Missing signature");
            assert!(h.bookings.get("TE10000001").await.is_err());
        }

        #[tokio::test]
        async fn test_underpaid_charge_rejected() {
            let h = Harness::new();
            let trip = h.seed_trip().await.trip;
            // 40.00 paid for a 5000 seat.
            let body = success_body(trip.id, "01A", 4_000);
            let signature = payment::sign(WEBHOOK_SECRET, &body);

            let err = h.checkout.handle_webhook(&body, Some(&signature)).await.unwrap_err();
            assert_eq!(err.to_string(), "Amount mismatch");
        }

        #[tokio::test]
        async fn test_other_events_ignored() {
            let h = Harness::new();
            let body = br#"{"event":"transfer.success","data":{}}"#.to_vec();
            let signature = payment::sign(WEBHOOK_SECRET, &body);

            let outcome = h.checkout.handle_webhook(&body, Some(&signature)).await.unwrap();
            assert_eq!(outcome, WebhookOutcome::Ignored("transfer.success".into()));
        }

        #[tokio::test]
        async fn test_initialize_checks_amount() {
            let h = Harness::new();
            let req = InitializePayment {
                email: Some("ada@example.com".into()),
                amount: Some(500_000),
                reference: None,
                metadata: Some(json!({
                    "customer": {"email": "ada@example.com", "phone": "+2348012345678"},
                    "passengers": [{"name": "Ada", "seat": "01A"}],
                    "trip_id": Uuid::nil(),
                    "total_amount": 5000,
                    "booking_reference": "TE10000002"
                })),
            };
            let session = h.checkout.initialize(req.clone()).await.unwrap();
            assert_eq!(session.reference, "TE10000002");

            let mut short = req;
            short.amount = Some(1);
            assert_eq!(h.checkout.initialize(short).await.unwrap_err().to_string(), "Amount mismatch");
        }

        #[tokio::test]
        async fn test_verify_requires_success() {
            let h = Harness::with_gateway_status("abandoned");
            let err = h.checkout.verify(Some("pay_x".into())).await.unwrap_err();
            assert!(matches!(err, CoreError::Payment(_)));

            let err = h.checkout.verify(None).await.unwrap_err();
            assert_eq!(err.to_string(), "Reference is required");
        }
    }
}
