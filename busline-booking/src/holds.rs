use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use busline_core::events::{publish_json, EventPublisher};
use busline_core::fleet::{Bus, SeatClass};
use busline_core::hold::{Acquired, SeatHold, SeatHoldStore};
use busline_core::repository::{BookingRepository, BusRepository, TripRepository};
use busline_core::schedule::Trip;
use busline_core::{CoreError, CoreResult};
use busline_shared::models::events::{SeatEvent, SeatHeldEvent, SeatReleasedEvent, TOPIC_HOLDS_CREATED};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatState {
    pub number: String,
    pub class: SeatClass,
    pub fare: i64,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatMap {
    pub trip_id: Uuid,
    pub available: usize,
    pub seats: Vec<SeatState>,
}

/// Time-boxed seat reservations taken while a customer checks out.
pub struct SeatHoldService {
    store: Arc<dyn SeatHoldStore>,
    trips: Arc<dyn TripRepository>,
    buses: Arc<dyn BusRepository>,
    bookings: Arc<dyn BookingRepository>,
    events: Arc<dyn EventPublisher>,
    seat_tx: broadcast::Sender<SeatEvent>,
    ttl_seconds: u64,
}

impl SeatHoldService {
    pub fn new(
        store: Arc<dyn SeatHoldStore>,
        trips: Arc<dyn TripRepository>,
        buses: Arc<dyn BusRepository>,
        bookings: Arc<dyn BookingRepository>,
        events: Arc<dyn EventPublisher>,
        ttl_seconds: u64,
    ) -> Self {
        let (seat_tx, _) = broadcast::channel(256);
        Self { store, trips, buses, bookings, events, seat_tx, ttl_seconds }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatEvent> {
        self.seat_tx.subscribe()
    }

    pub(crate) fn notify(&self, event: SeatEvent) {
        // No receivers is fine.
        let _ = self.seat_tx.send(event);
    }

    /// Holds every requested seat or none of them.
    pub async fn hold(&self, trip_id: Uuid, seats: Vec<String>, token: Option<String>) -> CoreResult<SeatHold> {
        let seats = dedupe(seats)?;
        let (trip, bus) = self.load(trip_id).await?;
        if !trip.is_available {
            return Err(CoreError::conflict("Trip is not available for booking"));
        }

        let booked = self.bookings.booked_seats(trip_id).await?;
        for number in &seats {
            match bus.seat(number) {
                Some(seat) if seat.is_bookable() => {}
                _ => return Err(CoreError::Validation(format!("Seat {} does not exist on this bus", number))),
            }
            if booked.contains(number) {
                return Err(CoreError::Conflict(format!("Seat {} is already booked", number)));
            }
        }

        let token = token.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut fresh = Vec::with_capacity(seats.len());
        for number in &seats {
            match self.store.acquire(trip_id, number, &token, self.ttl_seconds).await? {
                Acquired::Fresh => {
                    fresh.push(number.clone());
                    continue;
                }
                Acquired::Refreshed => continue,
                Acquired::Taken => {}
            }
            // Roll back only the leases this call created; seats the token
            // already held stay held.
            for taken in &fresh {
                self.store.release(trip_id, taken, &token).await?;
            }
            debug!("Hold on trip {} failed at seat {}", trip_id, number);
            return Err(CoreError::Conflict(format!("Seat {} is already held", number)));
        }

        let expires_at = Utc::now() + Duration::seconds(self.ttl_seconds as i64);
        for number in &seats {
            let event = SeatHeldEvent {
                trip_id,
                seat_number: number.clone(),
                hold_token: token.clone(),
                expires_at: expires_at.timestamp(),
            };
            publish_json(self.events.as_ref(), TOPIC_HOLDS_CREATED, &trip_id.to_string(), &event).await;
            self.notify(SeatEvent::Held(event));
        }

        info!("Held {} seat(s) on trip {} until {}", seats.len(), trip_id, expires_at);
        Ok(SeatHold { hold_token: token, trip_id, seats, expires_at })
    }

    /// Releases the seats `token` holds; others' holds are left alone.
    pub async fn release(&self, trip_id: Uuid, seats: Vec<String>, token: &str) -> CoreResult<Vec<String>> {
        let mut released = Vec::new();
        for number in dedupe(seats)? {
            if self.store.release(trip_id, &number, token).await? {
                self.notify(SeatEvent::Released(SeatReleasedEvent {
                    trip_id,
                    seat_number: number.clone(),
                    released_at: Utc::now().timestamp(),
                }));
                released.push(number);
            }
        }
        Ok(released)
    }

    /// Fails if any seat is held under a token other than `token`.
    pub async fn ensure_not_held_by_others(&self, trip_id: Uuid, seats: &[String], token: Option<&str>) -> CoreResult<()> {
        for number in seats {
            if let Some(holder) = self.store.holder(trip_id, number).await? {
                if Some(holder.as_str()) != token {
                    return Err(CoreError::Conflict(format!("Seat {} is held by another customer", number)));
                }
            }
        }
        Ok(())
    }

    /// Drops leases on seats that have just been sold.
    pub async fn clear(&self, trip_id: Uuid, seats: &[String]) -> CoreResult<()> {
        for number in seats {
            self.store.clear(trip_id, number).await?;
        }
        self.notify(SeatEvent::Booked { trip_id, seat_numbers: seats.to_vec() });
        Ok(())
    }

    pub async fn seat_map(&self, trip_id: Uuid) -> CoreResult<SeatMap> {
        let (trip, bus) = self.load(trip_id).await?;
        let booked = self.bookings.booked_seats(trip_id).await?;

        let mut seats = Vec::with_capacity(bus.seats.len());
        for seat in &bus.seats {
            let status = if !seat.is_bookable() {
                SeatStatus::Unavailable
            } else if booked.contains(&seat.number) {
                SeatStatus::Booked
            } else if self.store.holder(trip_id, &seat.number).await?.is_some() {
                SeatStatus::Held
            } else {
                SeatStatus::Available
            };
            seats.push(SeatState {
                number: seat.number.clone(),
                class: seat.class,
                fare: seat.fare(trip.price),
                status,
            });
        }

        let available = seats.iter().filter(|s| s.status == SeatStatus::Available).count();
        Ok(SeatMap { trip_id, available, seats })
    }

    async fn load(&self, trip_id: Uuid) -> CoreResult<(Trip, Bus)> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Trip not found"))?;
        let bus = self
            .buses
            .get_bus(trip.bus_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Bus not found"))?;
        Ok((trip, bus))
    }
}

fn dedupe(seats: Vec<String>) -> CoreResult<Vec<String>> {
    let mut seen = HashSet::new();
    let seats: Vec<String> = seats
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if seats.is_empty() {
        return Err(CoreError::validation("At least one seat is required"));
    }
    Ok(seats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{booking_input, Harness};

    fn seats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_hold_blocks_other_customers() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let hold = h.holds.hold(trip.id, seats(&["01a", "01B"]), None).await.unwrap();
        assert_eq!(hold.seats, seats(&["01A", "01B"]));
        assert_eq!(h.store.published_to(TOPIC_HOLDS_CREATED), 2);

        let err = h.holds.hold(trip.id, seats(&["01C", "01B"]), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Seat 01B is already held");
        // The partial hold on 01C was rolled back.
        let retry = h.holds.hold(trip.id, seats(&["01C"]), None).await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_same_token_can_extend_hold() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let first = h.holds.hold(trip.id, seats(&["02A"]), None).await.unwrap();
        let again = h
            .holds
            .hold(trip.id, seats(&["02A", "02B"]), Some(first.hold_token.clone()))
            .await
            .unwrap();
        assert_eq!(again.hold_token, first.hold_token);
        assert_eq!(again.seats.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_extension_keeps_existing_hold() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let mine = h.holds.hold(trip.id, seats(&["02A"]), None).await.unwrap();
        h.holds.hold(trip.id, seats(&["02B"]), None).await.unwrap();

        let err = h
            .holds
            .hold(trip.id, seats(&["02A", "02C", "02B"]), Some(mine.hold_token.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Seat 02B is already held");

        assert_eq!(h.store.holder(trip.id, "02A").await.unwrap(), Some(mine.hold_token.clone()));
        // 02C was taken fresh by the failed call and is rolled back.
        assert_eq!(h.store.holder(trip.id, "02C").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_hold_frees_seat() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        h.holds.hold(trip.id, seats(&["03A"]), None).await.unwrap();
        h.store.expire_holds();

        assert!(h.holds.hold(trip.id, seats(&["03A"]), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_only_with_own_token() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let hold = h.holds.hold(trip.id, seats(&["04A"]), None).await.unwrap();

        let released = h.holds.release(trip.id, seats(&["04A"]), "someone-else").await.unwrap();
        assert!(released.is_empty());

        let released = h.holds.release(trip.id, seats(&["04A"]), &hold.hold_token).await.unwrap();
        assert_eq!(released, seats(&["04A"]));
    }

    #[tokio::test]
    async fn test_booked_seat_cannot_be_held() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        h.bookings.create(booking_input(trip.id, &["05A"])).await.unwrap();

        let err = h.holds.hold(trip.id, seats(&["05A"]), None).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_seat_rejected() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;

        let err = h.holds.hold(trip.id, seats(&["99Z"]), None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = h.holds.hold(trip.id, seats(&["  "]), None).await.unwrap_err();
        assert_eq!(err.to_string(), "At least one seat is required");
    }

    #[tokio::test]
    async fn test_seat_map_reflects_holds_and_bookings() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        h.bookings.create(booking_input(trip.id, &["01A"])).await.unwrap();
        h.holds.hold(trip.id, seats(&["01B"]), None).await.unwrap();

        let map = h.holds.seat_map(trip.id).await.unwrap();
        let status = |n: &str| map.seats.iter().find(|s| s.number == n).map(|s| s.status);
        assert_eq!(status("01A"), Some(SeatStatus::Booked));
        assert_eq!(status("01B"), Some(SeatStatus::Held));
        assert_eq!(status("01C"), Some(SeatStatus::Available));
        assert_eq!(map.available, 46);
    }

    #[tokio::test]
    async fn test_subscribers_see_seat_events() {
        let h = Harness::new();
        let trip = h.seed_trip().await.trip;
        let mut rx = h.holds.subscribe();

        h.holds.hold(trip.id, seats(&["06A"]), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.trip_id(), trip.id);
        assert_eq!(event.name(), "seat_held");
    }
}
