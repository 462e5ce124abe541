use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seat-count template that buses are built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusType {
    pub id: Uuid,
    pub name: String,
    pub seats: i32,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BusType {
    pub fn new(name: impl Into<String>, seats: i32, created_by: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            seats,
            created_by: created_by.clone(),
            modified_by: created_by,
            created_at: Utc::now(),
        }
    }

    pub fn is_luxury(&self) -> bool {
        is_luxury_type(&self.name)
    }
}

pub(crate) fn is_luxury_type(name: &str) -> bool {
    name.to_ascii_lowercase().contains("luxury")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatClass {
    Regular,
    Premium,
    Driver,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatClass::Regular => "regular",
            SeatClass::Premium => "premium",
            SeatClass::Driver => "driver",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(SeatClass::Regular),
            "premium" => Some(SeatClass::Premium),
            "driver" => Some(SeatClass::Driver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub number: String,
    pub class: SeatClass,
    /// Overrides the trip price when set.
    pub price: Option<i64>,
    /// Whether the seat is in service at all. Occupancy on a given trip
    /// comes from bookings, not from this flag.
    pub is_available: bool,
}

impl Seat {
    pub fn is_bookable(&self) -> bool {
        self.is_available && self.class != SeatClass::Driver
    }

    pub fn fare(&self, trip_price: i64) -> i64 {
        self.price.unwrap_or(trip_price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatLayout {
    pub rows: i32,
    pub columns: i32,
    /// Seat numbers row by row; a short final row is allowed.
    pub arrangement: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bus {
    pub id: Uuid,
    pub operator: String,
    pub bus_type: String,
    pub seat_layout: SeatLayout,
    pub seats: Vec<Seat>,
    pub amenities: Vec<String>,
    pub rating: f32,
    pub created_at: DateTime<Utc>,
}

impl Bus {
    pub fn seat(&self, number: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.number == number)
    }

    /// Replaces layout and seats for a (possibly new) bus type.
    pub fn refit(&mut self, bus_type: &BusType, premium_price: i64) {
        let (layout, seats) = generate_seats(self.id, bus_type, premium_price);
        self.bus_type = bus_type.name.clone();
        self.seat_layout = layout;
        self.seats = seats;
    }
}

const LUXURY_LETTERS: [&str; 4] = ["A", "B", "C", "D"];
const STANDARD_LETTERS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];
const PREMIUM_ROWS: i32 = 2;

/// Lays out exactly `bus_type.seats` seats numbered `01A`, `01B`, ...
///
/// Luxury types get a 2x2 cabin with the first two rows premium; all other
/// types get 2x3.
pub fn generate_seats(bus_id: Uuid, bus_type: &BusType, premium_price: i64) -> (SeatLayout, Vec<Seat>) {
    let luxury = bus_type.is_luxury();
    let letters: &[&str] = if luxury { &LUXURY_LETTERS } else { &STANDARD_LETTERS };
    let columns = letters.len() as i32;
    let total = bus_type.seats.max(0);
    let rows = (total + columns - 1) / columns;

    let mut seats = Vec::with_capacity(total as usize);
    let mut arrangement = Vec::with_capacity(rows as usize);

    for row in 1..=rows {
        let mut row_numbers = Vec::new();
        for letter in letters {
            if seats.len() as i32 == total {
                break;
            }
            let number = format!("{:02}{}", row, letter);
            let premium = luxury && row <= PREMIUM_ROWS;
            seats.push(Seat {
                id: Uuid::new_v4(),
                bus_id,
                number: number.clone(),
                class: if premium { SeatClass::Premium } else { SeatClass::Regular },
                price: premium.then_some(premium_price),
                is_available: true,
            });
            row_numbers.push(number);
        }
        arrangement.push(row_numbers);
    }

    (SeatLayout { rows, columns, arrangement }, seats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout() {
        let bus_type = BusType::new("Standard", 48, None);
        let (layout, seats) = generate_seats(Uuid::new_v4(), &bus_type, 1500);
        assert_eq!(seats.len(), 48);
        assert_eq!(layout.columns, 6);
        assert_eq!(layout.rows, 8);
        assert_eq!(seats[0].number, "01A");
        assert_eq!(seats[47].number, "08F");
        assert!(seats.iter().all(|s| s.class == SeatClass::Regular && s.price.is_none()));
    }

    #[test]
    fn test_luxury_layout_has_premium_front_rows() {
        let bus_type = BusType::new("Luxury Coach", 30, None);
        let (layout, seats) = generate_seats(Uuid::new_v4(), &bus_type, 1500);
        assert_eq!(seats.len(), 30);
        assert_eq!(layout.columns, 4);
        assert_eq!(layout.rows, 8);
        assert_eq!(layout.arrangement.last().unwrap().len(), 2);

        let premium: Vec<_> = seats.iter().filter(|s| s.class == SeatClass::Premium).collect();
        assert_eq!(premium.len(), 8);
        assert!(premium.iter().all(|s| s.price == Some(1500)));
        assert_eq!(seats.iter().find(|s| s.number == "03A").unwrap().fare(1200), 1200);
    }

    #[test]
    fn test_driver_seat_not_bookable() {
        let seat = Seat {
            id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            number: "00D".to_string(),
            class: SeatClass::Driver,
            price: None,
            is_available: true,
        };
        assert!(!seat.is_bookable());
    }
}
