use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use busline_core::booking::{
    generate_reference, Booking, BookingDetails, BookingInput, BookingPatch, BookingStatus, Passenger,
};
use busline_core::events::{publish_json, EventPublisher};
use busline_core::payment::MINOR_UNITS;
use busline_core::repository::{BookingRepository, BusRepository, TripRepository};
use busline_core::rules::BusinessRules;
use busline_core::schedule::TripDetails;
use busline_core::search::{BookingFilter, Page};
use busline_core::validation;
use busline_core::{CoreError, CoreResult};
use busline_shared::models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, SeatEvent, SeatReleasedEvent, TOPIC_BOOKING_CANCELLED,
    TOPIC_BOOKING_CONFIRMED,
};
use busline_shared::pii::Masked;

use crate::holds::SeatHoldService;

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    #[serde(flatten)]
    pub booking: BookingDetails,
    /// `false` when the payment reference was already booked.
    pub created: bool,
}

pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    trips: Arc<dyn TripRepository>,
    buses: Arc<dyn BusRepository>,
    holds: Arc<SeatHoldService>,
    events: Arc<dyn EventPublisher>,
    rules: BusinessRules,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        trips: Arc<dyn TripRepository>,
        buses: Arc<dyn BusRepository>,
        holds: Arc<SeatHoldService>,
        events: Arc<dyn EventPublisher>,
        rules: BusinessRules,
    ) -> Self {
        Self { bookings, trips, buses, holds, events, rules }
    }

    /// Books seats on a trip.
    ///
    /// Replays with a payment reference that is already recorded return the
    /// existing booking instead of failing, so gateway retries are harmless.
    pub async fn create(&self, input: BookingInput) -> CoreResult<CreatedBooking> {
        validation::require_email(input.email.trim())?;
        validation::require_phone(input.phone.trim())?;
        let passengers = normalize_passengers(&input)?;

        if let Some(existing) = self.existing_for_payment(input.payment_reference.as_deref()).await? {
            return Ok(existing);
        }

        let trip = self
            .trips
            .get_trip(input.trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Trip not found"))?;
        if !trip.is_available {
            return Err(CoreError::conflict("Trip is not available for booking"));
        }
        let bus = self
            .buses
            .get_bus(trip.bus_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Bus not found"))?;

        let seat_numbers: Vec<String> = passengers.iter().map(|p| p.seat.clone()).collect();
        let mut total_amount = 0;
        for number in &seat_numbers {
            let seat = bus
                .seat(number)
                .filter(|s| s.is_bookable())
                .ok_or_else(|| CoreError::Validation(format!("Seat {} does not exist on this bus", number)))?;
            total_amount += seat.fare(trip.price);
        }

        let booked = self.bookings.booked_seats(trip.id).await?;
        if let Some(taken) = seat_numbers.iter().find(|s| booked.contains(*s)) {
            return Err(CoreError::Conflict(format!("Seat {} is already booked", taken)));
        }
        self.holds
            .ensure_not_held_by_others(trip.id, &seat_numbers, input.hold_token.as_deref())
            .await?;

        if let Some(paid) = input.amount_paid {
            if paid != total_amount * MINOR_UNITS {
                warn!("Amount mismatch for trip {}: paid {} minor, due {}", trip.id, paid, total_amount);
                return Err(CoreError::validation("Amount mismatch"));
            }
        }

        let now = Utc::now();
        let booking = Booking {
            reference: input
                .reference
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| generate_reference(&self.rules.reference_prefix)),
            status: BookingStatus::Confirmed,
            trip_id: trip.id,
            bus_id: bus.id,
            from: trip.from.clone(),
            to: trip.to.clone(),
            date: trip.date.to_string(),
            time: trip.departure_time.format("%H:%M").to_string(),
            operator: bus.operator.clone(),
            passengers,
            email: input.email.trim().to_string(),
            phone: input.phone.trim().to_string(),
            total_amount,
            booking_date: now.date_naive().to_string(),
            created_at: now,
            payment_reference: input.payment_reference.clone(),
            modified_by: None,
        };

        if let Err(err) = self.bookings.insert_booking(&booking).await {
            // A concurrent delivery of the same payment may have won the race.
            if let CoreError::Conflict(_) = err {
                if let Some(existing) = self.existing_for_payment(input.payment_reference.as_deref()).await? {
                    return Ok(existing);
                }
            }
            return Err(err);
        }

        self.holds.clear(trip.id, &seat_numbers).await?;

        let event = BookingConfirmedEvent {
            reference: booking.reference.clone(),
            trip_id: trip.id,
            seat_numbers,
            total_amount,
            payment_reference: booking.payment_reference.clone(),
            timestamp: now.timestamp(),
        };
        publish_json(self.events.as_ref(), TOPIC_BOOKING_CONFIRMED, &booking.reference, &event).await;

        info!(
            "Booking {} confirmed for {} ({} seat(s), total {})",
            booking.reference,
            Masked(booking.email.as_str()),
            booking.passengers.len(),
            booking.total_amount
        );

        Ok(CreatedBooking {
            booking: BookingDetails { booking, trip: TripDetails { trip, bus } },
            created: true,
        })
    }

    pub async fn get(&self, reference: &str) -> CoreResult<BookingDetails> {
        let booking = self.require(reference).await?;
        self.details(booking).await
    }

    pub async fn find_by_payment_reference(&self, payment_reference: &str) -> CoreResult<Option<Booking>> {
        self.bookings.find_by_payment_reference(payment_reference).await
    }

    pub async fn list(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>> {
        if let Some(status) = &filter.status {
            status.parse::<BookingStatus>()?;
        }
        self.bookings.list_bookings(filter).await
    }

    /// Back-office edit of status, contact details or payment reference.
    pub async fn update(&self, reference: &str, patch: BookingPatch, actor: &str) -> CoreResult<BookingDetails> {
        let mut booking = self.require(reference).await?;
        let previous = booking.status;

        if let Some(status) = patch.status.as_deref().filter(|s| !s.is_empty()) {
            booking.status = status.parse()?;
        }
        if let Some(email) = patch.email.as_deref().filter(|s| !s.is_empty()) {
            validation::require_email(email)?;
            booking.email = email.to_string();
        }
        if let Some(phone) = patch.phone.as_deref().filter(|s| !s.is_empty()) {
            validation::require_phone(phone)?;
            booking.phone = phone.to_string();
        }
        if let Some(payment_reference) = patch.payment_reference.filter(|s| !s.is_empty()) {
            if let Some(other) = self.bookings.find_by_payment_reference(&payment_reference).await? {
                if other.reference != booking.reference {
                    return Err(CoreError::validation("Payment reference already used"));
                }
            }
            booking.payment_reference = Some(payment_reference);
        }
        booking.modified_by = Some(actor.to_string());

        self.bookings.update_booking(&booking).await?;
        if previous.holds_seats() && !booking.status.holds_seats() {
            self.announce_release(&booking, false).await;
        }
        info!("Booking {} updated by {} ({} -> {})", booking.reference, actor, previous, booking.status);
        self.details(booking).await
    }

    /// Customer-initiated cancellation; the email must match the booking.
    pub async fn cancel(&self, reference: &str, email: &str) -> CoreResult<BookingDetails> {
        let mut booking = self.require(reference).await?;
        if !booking.email.eq_ignore_ascii_case(email.trim()) {
            return Err(CoreError::Forbidden("Email does not match this booking".to_string()));
        }
        match booking.status {
            BookingStatus::Completed => return Err(CoreError::conflict("Cannot cancel completed booking")),
            BookingStatus::Cancelled => return self.details(booking).await,
            BookingStatus::Confirmed => {}
        }

        booking.status = BookingStatus::Cancelled;
        self.bookings.update_booking(&booking).await?;
        self.announce_release(&booking, false).await;
        info!("Booking {} cancelled by customer", booking.reference);
        self.details(booking).await
    }

    /// Removes a booking outright, freeing its seats.
    pub async fn delete(&self, reference: &str) -> CoreResult<()> {
        let booking = self.require(reference).await?;
        if booking.status == BookingStatus::Completed {
            return Err(CoreError::conflict("Cannot delete completed booking"));
        }

        self.bookings.delete_booking(reference).await?;
        if booking.status.holds_seats() {
            self.announce_release(&booking, true).await;
        }
        info!("Booking {} deleted", reference);
        Ok(())
    }

    async fn require(&self, reference: &str) -> CoreResult<Booking> {
        self.bookings
            .get_booking(reference)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking not found"))
    }

    async fn details(&self, booking: Booking) -> CoreResult<BookingDetails> {
        let trip = self
            .trips
            .get_trip(booking.trip_id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("Booking {} references missing trip", booking.reference)))?;
        let bus = self
            .buses
            .get_bus(trip.bus_id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("Trip {} references missing bus", trip.id)))?;
        Ok(BookingDetails { booking, trip: TripDetails { trip, bus } })
    }

    async fn existing_for_payment(&self, payment_reference: Option<&str>) -> CoreResult<Option<CreatedBooking>> {
        let Some(payment_reference) = payment_reference.filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        match self.bookings.find_by_payment_reference(payment_reference).await? {
            Some(existing) => {
                info!("Payment {} already booked as {}", payment_reference, existing.reference);
                Ok(Some(CreatedBooking { booking: self.details(existing).await?, created: false }))
            }
            None => Ok(None),
        }
    }

    async fn announce_release(&self, booking: &Booking, deleted: bool) {
        let event = BookingCancelledEvent {
            reference: booking.reference.clone(),
            trip_id: booking.trip_id,
            released_seats: booking.seat_numbers(),
            deleted,
            timestamp: Utc::now().timestamp(),
        };
        publish_json(self.events.as_ref(), TOPIC_BOOKING_CANCELLED, &booking.reference, &event).await;

        for seat_number in event.released_seats {
            self.holds.notify(SeatEvent::Released(SeatReleasedEvent {
                trip_id: booking.trip_id,
                seat_number,
                released_at: event.timestamp,
            }));
        }
    }
}

fn normalize_passengers(input: &BookingInput) -> CoreResult<Vec<Passenger>> {
    if input.passengers.is_empty() {
        return Err(CoreError::validation("At least one passenger is required"));
    }

    let mut seen = HashSet::new();
    let mut passengers = Vec::with_capacity(input.passengers.len());
    for p in &input.passengers {
        let name = p.name.trim();
        let seat = p.seat.trim().to_uppercase();
        if name.is_empty() || seat.is_empty() {
            return Err(CoreError::validation("Each passenger needs a name and a seat"));
        }
        if !seen.insert(seat.clone()) {
            return Err(CoreError::Validation(format!("Seat {} is assigned to more than one passenger", seat)));
        }
        passengers.push(Passenger { id: Uuid::new_v4(), name: name.to_string(), seat });
    }
    Ok(passengers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{booking_input, Harness, ADMIN};

    #[tokio::test]
    async fn test_create_prices_seats_and_publishes() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let created = h.bookings.create(booking_input(trip.id, &["01a", "01B"])).await.unwrap();
        let booking = &created.booking.booking;

        assert!(created.created);
        assert!(booking.reference.starts_with("TE"));
        assert_eq!(booking.reference.len(), 10);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.total_amount, 10_000);
        assert_eq!(booking.seat_numbers(), vec!["01A".to_string(), "01B".to_string()]);
        assert_eq!(booking.time, "08:00");
        assert_eq!(h.store.published_to(TOPIC_BOOKING_CONFIRMED), 1);
    }

    #[tokio::test]
    async fn test_booked_seat_is_conflict() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        h.bookings.create(booking_input(trip.id, &["02A"])).await.unwrap();

        let err = h.bookings.create(booking_input(trip.id, &["02B", "02A"])).await.unwrap_err();
        assert_eq!(err.to_string(), "Seat 02A is already booked");
    }

    #[tokio::test]
    async fn test_rejects_bad_contact_and_passengers() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let mut input = booking_input(trip.id, &["03A"]);
        input.email = "not-an-email".into();
        assert_eq!(h.bookings.create(input).await.unwrap_err().to_string(), "Invalid email format");

        let input = booking_input(trip.id, &["03A", "03a"]);
        assert!(matches!(h.bookings.create(input).await.unwrap_err(), CoreError::Validation(_)));

        let input = booking_input(trip.id, &[]);
        assert!(matches!(h.bookings.create(input).await.unwrap_err(), CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_trip_is_not_found() {
        let h = Harness::new();
        let err = h.bookings.create(booking_input(Uuid::new_v4(), &["01A"])).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_payment_reference_is_idempotent() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let mut input = booking_input(trip.id, &["04A"]);
        input.payment_reference = Some("pay_1".into());
        let first = h.bookings.create(input.clone()).await.unwrap();
        let second = h.bookings.create(input).await.unwrap();

        assert!(!second.created);
        assert_eq!(first.booking.booking.reference, second.booking.booking.reference);
        assert_eq!(h.store.published_to(TOPIC_BOOKING_CONFIRMED), 1);
    }

    #[tokio::test]
    async fn test_held_seat_needs_matching_token() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let hold = h.holds.hold(trip.id, vec!["05A".into()], None).await.unwrap();

        let err = h.bookings.create(booking_input(trip.id, &["05A"])).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let mut input = booking_input(trip.id, &["05A"]);
        input.hold_token = Some(hold.hold_token);
        h.bookings.create(input).await.unwrap();
        // The lease is gone once the seat is sold.
        let map = h.holds.seat_map(trip.id).await.unwrap();
        assert!(map.seats.iter().any(|s| s.number == "05A" && s.status == crate::SeatStatus::Booked));
    }

    #[tokio::test]
    async fn test_amount_paid_must_match() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let mut input = booking_input(trip.id, &["06A"]);
        input.amount_paid = Some(400_000);

        let err = h.bookings.create(input).await.unwrap_err();
        assert_eq!(err.to_string(), "Amount mismatch");

        // Fifty kobo over is still a mismatch.
        let mut input = booking_input(trip.id, &["06A"]);
        input.amount_paid = Some(500_050);
        let err = h.bookings.create(input).await.unwrap_err();
        assert_eq!(err.to_string(), "Amount mismatch");

        let mut input = booking_input(trip.id, &["06A"]);
        input.amount_paid = Some(500_000);
        assert!(h.bookings.create(input).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_frees_seats_and_is_idempotent() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let created = h.bookings.create(booking_input(trip.id, &["07A"])).await.unwrap();
        let reference = created.booking.booking.reference;

        let err = h.bookings.cancel(&reference, "mallory@example.com").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let cancelled = h.bookings.cancel(&reference, "ADA@example.com").await.unwrap();
        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
        let again = h.bookings.cancel(&reference, "ada@example.com").await.unwrap();
        assert_eq!(again.booking.status, BookingStatus::Cancelled);
        assert_eq!(h.store.published_to(TOPIC_BOOKING_CANCELLED), 1);

        // Seat is bookable again.
        h.bookings.create(booking_input(trip.id, &["07A"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_and_delete_notify_seat_watchers() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let first = h.bookings.create(booking_input(trip.id, &["07B", "07C"])).await.unwrap();
        let second = h.bookings.create(booking_input(trip.id, &["07D"])).await.unwrap();
        let mut rx = h.holds.subscribe();

        h.bookings.cancel(&first.booking.booking.reference, "ada@example.com").await.unwrap();
        h.bookings.delete(&second.booking.booking.reference).await.unwrap();

        let mut released = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                SeatEvent::Released(e) => {
                    assert_eq!(e.trip_id, trip.id);
                    released.push(e.seat_number);
                }
                other => panic!("unexpected seat event {:?}", other),
            }
        }
        assert_eq!(released, vec!["07B", "07C", "07D"]);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_for_one_seat() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let (a, b) = tokio::join!(
            h.bookings.create(booking_input(trip.id, &["11A"])),
            h.bookings.create(booking_input(trip.id, &["11A"])),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(err, CoreError::Conflict(_)));

        let page = h.bookings.list(&BookingFilter { trip_id: Some(trip.id), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_store_rejects_seat_taken_after_checks() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let first = h.bookings.create(booking_input(trip.id, &["12A"])).await.unwrap();

        // A second row for the same seat that skipped the service-level checks.
        let mut duplicate = first.booking.booking.clone();
        duplicate.reference = "TE99999999".into();
        duplicate.payment_reference = None;
        let err = BookingRepository::insert_booking(h.store.as_ref(), &duplicate).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reconfirm_fails_when_seat_resold() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let reference = h.bookings.create(booking_input(trip.id, &["08A"])).await.unwrap().booking.booking.reference;
        h.bookings.cancel(&reference, "ada@example.com").await.unwrap();
        h.bookings.create(booking_input(trip.id, &["08A"])).await.unwrap();

        let patch = BookingPatch { status: Some("confirmed".into()), ..Default::default() };
        let err = h.bookings.update(&reference, patch, ADMIN).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_validates_status_and_records_actor() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let reference = h.bookings.create(booking_input(trip.id, &["09A"])).await.unwrap().booking.booking.reference;

        let bad = BookingPatch { status: Some("lost".into()), ..Default::default() };
        let err = h.bookings.update(&reference, bad, ADMIN).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid status. Must be confirmed, cancelled, or completed");

        let patch = BookingPatch { status: Some("completed".into()), ..Default::default() };
        let updated = h.bookings.update(&reference, patch, ADMIN).await.unwrap();
        assert_eq!(updated.booking.status, BookingStatus::Completed);
        assert_eq!(updated.booking.modified_by.as_deref(), Some(ADMIN));
    }

    #[tokio::test]
    async fn test_delete_releases_seats_but_not_completed() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let reference = h.bookings.create(booking_input(trip.id, &["10A"])).await.unwrap().booking.booking.reference;

        h.bookings.delete(&reference).await.unwrap();
        assert!(matches!(h.bookings.get(&reference).await.unwrap_err(), CoreError::NotFound(_)));
        let rebooked = h.bookings.create(booking_input(trip.id, &["10A"])).await.unwrap();

        let done = BookingPatch { status: Some("completed".into()), ..Default::default() };
        let reference = rebooked.booking.booking.reference;
        h.bookings.update(&reference, done, ADMIN).await.unwrap();
        let err = h.bookings.delete(&reference).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete completed booking");
    }
}
