use std::sync::Arc;

use busline_booking::{BookingService, CheckoutService, FleetService, SeatHoldService};
use busline_core::events::EventPublisher;
use busline_core::hold::SeatHoldStore;
use busline_core::payment::PaymentGateway;
use busline_core::repository::{
    BookingRepository, BusRepository, BusTypeRepository, RateLimiter, TripRepository, UserRepository,
};
use busline_core::rules::BusinessRules;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Storage and integration backends the services are wired over.
pub struct Backends {
    pub bus_types: Arc<dyn BusTypeRepository>,
    pub buses: Arc<dyn BusRepository>,
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub users: Arc<dyn UserRepository>,
    pub holds: Arc<dyn SeatHoldStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub events: Arc<dyn EventPublisher>,
    pub gateway: Arc<dyn PaymentGateway>,
}

#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetService>,
    pub bookings: Arc<BookingService>,
    pub holds: Arc<SeatHoldService>,
    pub checkout: Arc<CheckoutService>,
    pub users: Arc<dyn UserRepository>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(
        backends: Backends,
        auth: AuthConfig,
        business_rules: BusinessRules,
        webhook_secret: String,
        callback_url: Option<String>,
    ) -> Self {
        let fleet = Arc::new(FleetService::new(
            backends.bus_types,
            backends.buses.clone(),
            backends.trips.clone(),
            backends.bookings.clone(),
            business_rules.clone(),
        ));
        let holds = Arc::new(SeatHoldService::new(
            backends.holds,
            backends.trips.clone(),
            backends.buses.clone(),
            backends.bookings.clone(),
            backends.events.clone(),
            business_rules.seat_hold_seconds,
        ));
        let bookings = Arc::new(BookingService::new(
            backends.bookings,
            backends.trips,
            backends.buses,
            holds.clone(),
            backends.events,
            business_rules.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            backends.gateway,
            bookings.clone(),
            webhook_secret,
            callback_url,
        ));

        Self {
            fleet,
            bookings,
            holds,
            checkout,
            users: backends.users,
            rate_limiter: backends.rate_limiter,
            auth,
            business_rules,
        }
    }
}
