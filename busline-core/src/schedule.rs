use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fleet::Bus;

/// A scheduled departure of one bus between two cities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub bus_id: Uuid,
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub departure_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub arrival_time: NaiveTime,
    pub duration: String,
    pub price: i64,
    pub is_available: bool,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn window(&self) -> TripWindow {
        TripWindow::new(self.date, self.departure_time, self.arrival_time)
    }
}

/// Trip joined with the bus that runs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: Trip,
    pub bus: Bus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TripWindow {
    /// An arrival earlier than the departure lands on the following day.
    pub fn new(date: NaiveDate, departure: NaiveTime, arrival: NaiveTime) -> Self {
        let start = date.and_time(departure);
        let mut end = date.and_time(arrival);
        if end < start {
            end += Duration::days(1);
        }
        Self { start, end }
    }

    /// Touching windows count as overlapping: a bus arriving at 15:00 cannot
    /// leave on another trip at 15:00.
    pub fn overlaps(&self, other: &TripWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// `"8h 15m"`, wrapping past midnight.
pub fn duration_label(departure: NaiveTime, arrival: NaiveTime) -> String {
    let minutes = TripWindow::new(NaiveDate::MIN, departure, arrival).minutes();
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// First trip in `existing` that would double-book the candidate's bus.
pub fn find_conflict<'a>(candidate: &Trip, existing: &'a [Trip]) -> Option<&'a Trip> {
    let window = candidate.window();
    existing
        .iter()
        .filter(|t| t.bus_id == candidate.bus_id && t.id != candidate.id)
        .find(|t| t.window().overlaps(&window))
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Times travel as `"HH:MM"` strings on the wire.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).ok_or_else(|| D::Error::custom(format!("invalid time: {}", raw)))
    }
}
