use uuid::Uuid;

pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const TOPIC_BOOKING_CANCELLED: &str = "booking.cancelled";
pub const TOPIC_HOLDS_CREATED: &str = "holds.created";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatHeldEvent {
    pub trip_id: Uuid,
    pub seat_number: String,
    pub hold_token: String,
    pub expires_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatReleasedEvent {
    pub trip_id: Uuid,
    pub seat_number: String,
    pub released_at: i64,
}

/// Seat state change pushed to clients watching a trip's seat map.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatEvent {
    Held(SeatHeldEvent),
    Released(SeatReleasedEvent),
    Booked { trip_id: Uuid, seat_numbers: Vec<String> },
}

impl SeatEvent {
    pub fn trip_id(&self) -> Uuid {
        match self {
            SeatEvent::Held(e) => e.trip_id,
            SeatEvent::Released(e) => e.trip_id,
            SeatEvent::Booked { trip_id, .. } => *trip_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SeatEvent::Held(_) => "seat_held",
            SeatEvent::Released(_) => "seat_released",
            SeatEvent::Booked { .. } => "seats_booked",
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub reference: String,
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub total_amount: i64,
    pub payment_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub reference: String,
    pub trip_id: Uuid,
    pub released_seats: Vec<String>,
    pub deleted: bool,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_event_is_tagged() {
        let trip_id = Uuid::new_v4();
        let event = SeatEvent::Booked { trip_id, seat_numbers: vec!["01A".to_string()] };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "booked");
        assert_eq!(event.trip_id(), trip_id);
        assert_eq!(event.name(), "seats_booked");
    }
}
