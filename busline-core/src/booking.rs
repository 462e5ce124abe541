use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::TripDetails;
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Whether the booking still occupies its seats.
    pub fn holds_seats(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            _ => Err(CoreError::validation(
                "Invalid status. Must be confirmed, cancelled, or completed",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub id: Uuid,
    pub name: String,
    pub seat: String,
}

/// A confirmed purchase of one or more seats on a trip.
///
/// Route, date and operator are copied from the trip at booking time so the
/// ticket survives later edits to the trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub reference: String,
    pub status: BookingStatus,
    pub trip_id: Uuid,
    pub bus_id: Uuid,
    pub from: String,
    pub to: String,
    pub date: String,
    pub time: String,
    pub operator: String,
    pub passengers: Vec<Passenger>,
    pub email: String,
    pub phone: String,
    pub total_amount: i64,
    pub booking_date: String,
    pub created_at: DateTime<Utc>,
    pub payment_reference: Option<String>,
    pub modified_by: Option<String>,
}

impl Booking {
    pub fn seat_numbers(&self) -> Vec<String> {
        self.passengers.iter().map(|p| p.seat.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub trip: TripDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassengerInput {
    pub name: String,
    pub seat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingInput {
    pub trip_id: Uuid,
    pub email: String,
    pub phone: String,
    pub passengers: Vec<PassengerInput>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    /// Pre-allocated reference (the one quoted to the payment gateway).
    #[serde(default)]
    pub reference: Option<String>,
    /// Token of the seat hold taken during checkout, if any.
    #[serde(default)]
    pub hold_token: Option<String>,
    /// Amount actually paid, in minor units; must equal the computed total
    /// when present.
    #[serde(default)]
    pub amount_paid: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingPatch {
    pub status: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub payment_reference: Option<String>,
}

/// `TE` followed by eight digits.
pub fn generate_reference(prefix: &str) -> String {
    let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("{}{:08}", prefix, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shape() {
        let reference = generate_reference("TE");
        assert_eq!(reference.len(), 10);
        assert!(reference.starts_with("TE"));
        assert!(reference[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("cancelled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("pending".parse::<BookingStatus>().is_err());
        assert!(!BookingStatus::Cancelled.holds_seats());
        assert!(BookingStatus::Completed.holds_seats());
    }
}
