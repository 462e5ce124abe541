pub mod bookings;
pub mod checkout;
pub mod fleet;
pub mod holds;

#[cfg(test)]
mod test_support;

pub use bookings::{BookingService, CreatedBooking};
pub use checkout::{CheckoutService, InitializePayment, VerifiedPayment, WebhookOutcome};
pub use fleet::FleetService;
pub use holds::{SeatHoldService, SeatMap, SeatStatus};
