use async_trait::async_trait;
use uuid::Uuid;

use crate::booking::Booking;
use crate::fleet::{Bus, BusType};
use crate::schedule::Trip;
use crate::search::{BookingFilter, BusFilter, Page, Paging, TripFilter};
use crate::user::User;
use crate::CoreResult;

/// Repository trait for bus type templates
#[async_trait]
pub trait BusTypeRepository: Send + Sync {
    async fn list_bus_types(&self) -> CoreResult<Vec<BusType>>;

    async fn get_bus_type(&self, id: Uuid) -> CoreResult<Option<BusType>>;

    async fn find_bus_type_by_name(&self, name: &str) -> CoreResult<Option<BusType>>;

    /// Fails with `Conflict` when the name is taken.
    async fn insert_bus_type(&self, bus_type: &BusType) -> CoreResult<()>;

    async fn update_bus_type(&self, bus_type: &BusType) -> CoreResult<()>;

    async fn delete_bus_type(&self, id: Uuid) -> CoreResult<()>;
}

/// Repository trait for buses and their seats
#[async_trait]
pub trait BusRepository: Send + Sync {
    async fn list_buses(&self, filter: &BusFilter) -> CoreResult<Page<Bus>>;

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>>;

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()>;

    /// Replaces the bus row and its full seat list.
    async fn update_bus(&self, bus: &Bus) -> CoreResult<()>;

    async fn delete_bus(&self, id: Uuid) -> CoreResult<()>;

    async fn count_buses_of_type(&self, bus_type: &str) -> CoreResult<i64>;
}

/// Repository trait for scheduled trips
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn list_trips(&self, filter: &TripFilter) -> CoreResult<Page<Trip>>;

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>>;

    async fn trips_for_bus(&self, bus_id: Uuid) -> CoreResult<Vec<Trip>>;

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()>;

    async fn update_trip(&self, trip: &Trip) -> CoreResult<()>;

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()>;
}

/// Repository trait for bookings and their passengers
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>>;

    async fn get_booking(&self, reference: &str) -> CoreResult<Option<Booking>>;

    async fn find_by_payment_reference(&self, payment_reference: &str) -> CoreResult<Option<Booking>>;

    /// Seat numbers held by non-cancelled bookings on the trip.
    async fn booked_seats(&self, trip_id: Uuid) -> CoreResult<Vec<String>>;

    async fn count_active_bookings(&self, trip_id: Uuid) -> CoreResult<i64>;

    /// Inserts booking and passengers atomically. A seat already taken on
    /// the trip, or a duplicate reference / payment reference, is a `Conflict`.
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()>;

    /// Persists status and contact changes. Moving into or out of
    /// `cancelled` frees or re-claims the seats (`Conflict` if re-claim fails).
    async fn update_booking(&self, booking: &Booking) -> CoreResult<()>;

    /// Removes the booking and its passengers in one transaction.
    async fn delete_booking(&self, reference: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list_users(&self, paging: Paging) -> CoreResult<Page<User>>;

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn insert_user(&self, user: &User) -> CoreResult<()>;

    async fn update_user(&self, user: &User) -> CoreResult<()>;

    async fn delete_user(&self, id: Uuid) -> CoreResult<()>;
}

/// Fixed-window request counter keyed by caller.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `true` while the caller is within `limit` requests per window.
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> CoreResult<bool>;
}
