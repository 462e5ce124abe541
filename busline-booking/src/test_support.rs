use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use busline_core::booking::{BookingInput, PassengerInput};
use busline_core::payment::{PaymentGateway, PaymentInit, PaymentSession, PaymentVerification};
use busline_core::rules::BusinessRules;
use busline_core::schedule::TripDetails;
use busline_core::CoreResult;
use busline_store::InMemoryStore;

use crate::bookings::BookingService;
use crate::checkout::CheckoutService;
use crate::fleet::{BusInput, BusTypeInput, FleetService, TripInput};
use crate::holds::SeatHoldService;

pub(crate) const WEBHOOK_SECRET: &str = "sk_test_webhook";
pub(crate) const ADMIN: &str = "admin@busline.test";

/// Gateway double that settles every transaction with `status`.
pub(crate) struct StubGateway {
    pub status: String,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, init: &PaymentInit) -> CoreResult<PaymentSession> {
        Ok(PaymentSession {
            authorization_url: format!("https://checkout.test/{}", init.reference),
            access_code: "access".to_string(),
            reference: init.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> CoreResult<PaymentVerification> {
        Ok(PaymentVerification {
            status: self.status.clone(),
            reference: reference.to_string(),
            amount: 0,
            paid_at: None,
            metadata: Some(Value::Null),
        })
    }
}

pub(crate) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub fleet: FleetService,
    pub holds: Arc<SeatHoldService>,
    pub bookings: Arc<BookingService>,
    pub checkout: CheckoutService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway_status("success")
    }

    pub fn with_gateway_status(status: &str) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let rules = BusinessRules::default();

        let fleet = FleetService::new(store.clone(), store.clone(), store.clone(), store.clone(), rules.clone());
        let holds = Arc::new(SeatHoldService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            rules.seat_hold_seconds,
        ));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            holds.clone(),
            store.clone(),
            rules,
        ));
        let checkout = CheckoutService::new(
            Arc::new(StubGateway { status: status.to_string() }),
            bookings.clone(),
            WEBHOOK_SECRET.to_string(),
            None,
        );

        Self { store, fleet, holds, bookings, checkout }
    }

    /// A 48-seat standard bus on a Lagos -> Abuja trip priced at 5000.
    pub async fn seed_trip(&self) -> TripDetails {
        if self.fleet.list_bus_types().await.unwrap().is_empty() {
            self.fleet
                .create_bus_type(BusTypeInput { name: "Standard".into(), seats: 48 }, ADMIN)
                .await
                .unwrap();
        }
        let bus = self
            .fleet
            .create_bus(BusInput {
                operator: "Sunline Express".into(),
                bus_type: "Standard".into(),
                amenities: vec!["AC".into()],
                rating: 4.5,
            })
            .await
            .unwrap();
        self.fleet
            .create_trip(trip_input(bus.id, "2030-06-01", "08:00", "14:00"), ADMIN)
            .await
            .unwrap()
    }
}

pub(crate) fn trip_input(bus_id: Uuid, date: &str, departure: &str, arrival: &str) -> TripInput {
    TripInput {
        bus_id,
        from: "Lagos".into(),
        to: "Abuja".into(),
        date: date.into(),
        departure_time: departure.into(),
        arrival_time: arrival.into(),
        price: 5000,
        is_available: None,
    }
}

pub(crate) fn booking_input(trip_id: Uuid, seats: &[&str]) -> BookingInput {
    BookingInput {
        trip_id,
        email: "ada@example.com".into(),
        phone: "+2348012345678".into(),
        passengers: seats
            .iter()
            .enumerate()
            .map(|(i, seat)| PassengerInput { name: format!("Passenger {}", i + 1), seat: seat.to_string() })
            .collect(),
        payment_reference: None,
        reference: None,
        hold_token: None,
        amount_paid: None,
    }
}
