//! Process-local store implementing every repository seam. Used by the test
//! suites and handy for running the API without Postgres or Redis.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use busline_core::booking::Booking;
use busline_core::events::EventPublisher;
use busline_core::fleet::{Bus, BusType};
use busline_core::hold::{Acquired, SeatHoldStore};
use busline_core::repository::{
    BookingRepository, BusRepository, BusTypeRepository, RateLimiter, TripRepository, UserRepository,
};
use busline_core::schedule::Trip;
use busline_core::search::{BookingFilter, BusFilter, Page, Paging, TripFilter};
use busline_core::user::User;
use busline_core::{CoreError, CoreResult};

#[derive(Default)]
struct Tables {
    bus_types: HashMap<Uuid, BusType>,
    buses: HashMap<Uuid, Bus>,
    trips: HashMap<Uuid, Trip>,
    bookings: HashMap<String, Booking>,
    users: HashMap<Uuid, User>,
    holds: HashMap<(Uuid, String), (String, Instant)>,
    counters: HashMap<String, (i64, Instant)>,
    published: Vec<(String, String, String)>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(topic, key, payload)` of every event published so far.
    pub fn published(&self) -> Vec<(String, String, String)> {
        self.lock().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> usize {
        self.lock().published.iter().filter(|(t, _, _)| t == topic).count()
    }

    /// Forces every live hold to lapse, as if its TTL ran out.
    pub fn expire_holds(&self) {
        let now = Instant::now();
        for (_, expires) in self.lock().holds.values_mut() {
            *expires = now;
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn active_seats<'a>(tables: &'a Tables, trip_id: Uuid, except: Option<&'a str>) -> impl Iterator<Item = &'a str> {
    tables
        .bookings
        .values()
        .filter(move |b| b.trip_id == trip_id && b.status.holds_seats() && Some(b.reference.as_str()) != except)
        .flat_map(|b| b.passengers.iter().map(|p| p.seat.as_str()))
}

fn ensure_seats_free(tables: &Tables, booking: &Booking, except: Option<&str>) -> CoreResult<()> {
    let taken: Vec<&str> = active_seats(tables, booking.trip_id, except).collect();
    if booking.passengers.iter().any(|p| taken.contains(&p.seat.as_str())) {
        return Err(CoreError::conflict("Seat is already booked on this trip"));
    }
    Ok(())
}

#[async_trait]
impl BusTypeRepository for InMemoryStore {
    async fn list_bus_types(&self) -> CoreResult<Vec<BusType>> {
        let mut types: Vec<BusType> = self.lock().bus_types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn get_bus_type(&self, id: Uuid) -> CoreResult<Option<BusType>> {
        Ok(self.lock().bus_types.get(&id).cloned())
    }

    async fn find_bus_type_by_name(&self, name: &str) -> CoreResult<Option<BusType>> {
        Ok(self.lock().bus_types.values().find(|t| t.name == name).cloned())
    }

    async fn insert_bus_type(&self, bus_type: &BusType) -> CoreResult<()> {
        let mut tables = self.lock();
        if tables.bus_types.values().any(|t| t.name == bus_type.name) {
            return Err(CoreError::conflict("Bus type name already exists"));
        }
        tables.bus_types.insert(bus_type.id, bus_type.clone());
        Ok(())
    }

    async fn update_bus_type(&self, bus_type: &BusType) -> CoreResult<()> {
        let mut tables = self.lock();
        if tables.bus_types.values().any(|t| t.name == bus_type.name && t.id != bus_type.id) {
            return Err(CoreError::conflict("Bus type name already exists"));
        }
        // Renames cascade to the buses that reference the type by name.
        if let Some(old) = tables.bus_types.get(&bus_type.id).map(|t| t.name.clone()) {
            for bus in tables.buses.values_mut().filter(|b| b.bus_type == old) {
                bus.bus_type = bus_type.name.clone();
            }
        }
        tables.bus_types.insert(bus_type.id, bus_type.clone());
        Ok(())
    }

    async fn delete_bus_type(&self, id: Uuid) -> CoreResult<()> {
        self.lock().bus_types.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BusRepository for InMemoryStore {
    async fn list_buses(&self, filter: &BusFilter) -> CoreResult<Page<Bus>> {
        let mut buses: Vec<Bus> = self
            .lock()
            .buses
            .values()
            .filter(|b| filter.operator.as_deref().is_none_or(|o| contains_ci(&b.operator, o)))
            .filter(|b| filter.bus_type.as_deref().is_none_or(|t| b.bus_type == t))
            .cloned()
            .collect();
        buses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filter.paging.apply(buses))
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        Ok(self.lock().buses.get(&id).cloned())
    }

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        self.lock().buses.insert(bus.id, bus.clone());
        Ok(())
    }

    async fn update_bus(&self, bus: &Bus) -> CoreResult<()> {
        self.lock().buses.insert(bus.id, bus.clone());
        Ok(())
    }

    async fn delete_bus(&self, id: Uuid) -> CoreResult<()> {
        self.lock().buses.remove(&id);
        Ok(())
    }

    async fn count_buses_of_type(&self, bus_type: &str) -> CoreResult<i64> {
        Ok(self.lock().buses.values().filter(|b| b.bus_type == bus_type).count() as i64)
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn list_trips(&self, filter: &TripFilter) -> CoreResult<Page<Trip>> {
        let mut trips: Vec<Trip> = self
            .lock()
            .trips
            .values()
            .filter(|t| filter.from.as_deref().is_none_or(|f| t.from.eq_ignore_ascii_case(f)))
            .filter(|t| filter.to.as_deref().is_none_or(|to| t.to.eq_ignore_ascii_case(to)))
            .filter(|t| filter.date.is_none_or(|d| t.date == d))
            .filter(|t| filter.bus_id.is_none_or(|id| t.bus_id == id))
            .filter(|t| !filter.available_only || t.is_available)
            .cloned()
            .collect();
        trips.sort_by_key(|t| (t.date, t.departure_time));
        Ok(filter.paging.apply(trips))
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.lock().trips.get(&id).cloned())
    }

    async fn trips_for_bus(&self, bus_id: Uuid) -> CoreResult<Vec<Trip>> {
        let mut trips: Vec<Trip> = self.lock().trips.values().filter(|t| t.bus_id == bus_id).cloned().collect();
        trips.sort_by_key(|t| (t.date, t.departure_time));
        Ok(trips)
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        self.lock().trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn update_trip(&self, trip: &Trip) -> CoreResult<()> {
        self.lock().trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()> {
        let mut tables = self.lock();
        tables.trips.remove(&id);
        tables.bookings.retain(|_, b| b.trip_id != id);
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>> {
        let mut bookings: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| filter.email.as_deref().is_none_or(|e| b.email.eq_ignore_ascii_case(e)))
            .filter(|b| filter.status.as_deref().is_none_or(|s| b.status.as_str() == s))
            .filter(|b| filter.trip_id.is_none_or(|id| b.trip_id == id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filter.paging.apply(bookings))
    }

    async fn get_booking(&self, reference: &str) -> CoreResult<Option<Booking>> {
        Ok(self.lock().bookings.get(reference).cloned())
    }

    async fn find_by_payment_reference(&self, payment_reference: &str) -> CoreResult<Option<Booking>> {
        Ok(self
            .lock()
            .bookings
            .values()
            .find(|b| b.payment_reference.as_deref() == Some(payment_reference))
            .cloned())
    }

    async fn booked_seats(&self, trip_id: Uuid) -> CoreResult<Vec<String>> {
        let tables = self.lock();
        Ok(active_seats(&tables, trip_id, None).map(String::from).collect())
    }

    async fn count_active_bookings(&self, trip_id: Uuid) -> CoreResult<i64> {
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id && b.status.holds_seats())
            .count() as i64)
    }

    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut tables = self.lock();
        if tables.bookings.contains_key(&booking.reference) {
            return Err(CoreError::conflict("Booking reference already exists"));
        }
        if let Some(payment_reference) = &booking.payment_reference {
            if tables.bookings.values().any(|b| b.payment_reference.as_ref() == Some(payment_reference)) {
                return Err(CoreError::conflict("Payment reference already used"));
            }
        }
        if booking.status.holds_seats() {
            ensure_seats_free(&tables, booking, None)?;
        }
        tables.bookings.insert(booking.reference.clone(), booking.clone());
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut tables = self.lock();
        if !tables.bookings.contains_key(&booking.reference) {
            return Err(CoreError::not_found("Booking not found"));
        }
        if let Some(payment_reference) = &booking.payment_reference {
            let clash = tables
                .bookings
                .values()
                .any(|b| b.reference != booking.reference && b.payment_reference.as_ref() == Some(payment_reference));
            if clash {
                return Err(CoreError::conflict("Payment reference already used"));
            }
        }
        if booking.status.holds_seats() {
            ensure_seats_free(&tables, booking, Some(booking.reference.as_str()))?;
        }
        tables.bookings.insert(booking.reference.clone(), booking.clone());
        Ok(())
    }

    async fn delete_booking(&self, reference: &str) -> CoreResult<()> {
        self.lock().bookings.remove(reference);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn list_users(&self, paging: Paging) -> CoreResult<Page<User>> {
        let mut users: Vec<User> = self.lock().users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paging.apply(users))
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> CoreResult<()> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(CoreError::conflict("Email already registered"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        self.lock().users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> CoreResult<()> {
        self.lock().users.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl SeatHoldStore for InMemoryStore {
    async fn acquire(&self, trip_id: Uuid, seat: &str, token: &str, ttl_seconds: u64) -> CoreResult<Acquired> {
        let now = Instant::now();
        let mut tables = self.lock();
        let key = (trip_id, seat.to_string());
        let outcome = match tables.holds.get(&key) {
            Some((holder, expires)) if *expires > now && holder != token => return Ok(Acquired::Taken),
            Some((_, expires)) if *expires > now => Acquired::Refreshed,
            _ => Acquired::Fresh,
        };
        tables.holds.insert(key, (token.to_string(), now + Duration::from_secs(ttl_seconds)));
        Ok(outcome)
    }

    async fn release(&self, trip_id: Uuid, seat: &str, token: &str) -> CoreResult<bool> {
        let now = Instant::now();
        let mut tables = self.lock();
        let key = (trip_id, seat.to_string());
        match tables.holds.get(&key) {
            Some((holder, expires)) if holder == token && *expires > now => {
                tables.holds.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, trip_id: Uuid, seat: &str) -> CoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .holds
            .get(&(trip_id, seat.to_string()))
            .filter(|(_, expires)| *expires > now)
            .map(|(holder, _)| holder.clone()))
    }

    async fn clear(&self, trip_id: Uuid, seat: &str) -> CoreResult<()> {
        self.lock().holds.remove(&(trip_id, seat.to_string()));
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for InMemoryStore {
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> CoreResult<bool> {
        let now = Instant::now();
        let window = Duration::from_secs(window_seconds.max(0) as u64);
        let mut tables = self.lock();
        let entry = tables.counters.entry(key.to_string()).or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0 <= limit)
    }
}

#[async_trait]
impl EventPublisher for InMemoryStore {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()> {
        self.lock().published.push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hold_lease_lifecycle() {
        let store = InMemoryStore::new();
        let trip = Uuid::new_v4();

        assert_eq!(store.acquire(trip, "01A", "alice", 60).await.unwrap(), Acquired::Fresh);
        assert_eq!(store.acquire(trip, "01A", "bob", 60).await.unwrap(), Acquired::Taken);
        // Holder may refresh its own lease.
        assert_eq!(store.acquire(trip, "01A", "alice", 60).await.unwrap(), Acquired::Refreshed);

        assert!(!store.release(trip, "01A", "bob").await.unwrap());
        assert_eq!(store.holder(trip, "01A").await.unwrap().as_deref(), Some("alice"));

        store.expire_holds();
        assert_eq!(store.holder(trip, "01A").await.unwrap(), None);
        assert_eq!(store.acquire(trip, "01A", "bob", 60).await.unwrap(), Acquired::Fresh);
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let store = InMemoryStore::new();
        assert!(store.check_rate_limit("ip:1", 2, 60).await.unwrap());
        assert!(store.check_rate_limit("ip:1", 2, 60).await.unwrap());
        assert!(!store.check_rate_limit("ip:1", 2, 60).await.unwrap());
        assert!(store.check_rate_limit("ip:2", 2, 60).await.unwrap());
    }
}
