use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A slice of a listing plus the unpaged count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl Paging {
    /// No limit; for callers that filter before paging.
    pub fn all() -> Self {
        Self { limit: i64::MAX, offset: 0 }
    }

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }

    /// In-memory equivalent of `LIMIT/OFFSET`.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as i64;
        let data = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        Page { data, total }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BusFilter {
    pub operator: Option<String>,
    pub bus_type: Option<String>,
    pub paging: Paging,
}

#[derive(Debug, Clone, Default)]
pub struct TripFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<NaiveDate>,
    pub bus_id: Option<Uuid>,
    pub available_only: bool,
    pub paging: Paging,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub email: Option<String>,
    pub status: Option<String>,
    pub trip_id: Option<Uuid>,
    pub paging: Paging,
}

/// Search hit: a trip with the seats still open for sale.
#[derive(Debug, Clone, Serialize)]
pub struct TripSearchResult {
    #[serde(flatten)]
    pub trip: crate::schedule::TripDetails,
    pub available_seats: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_clamps() {
        let paging = Paging::new(Some(1000), Some(-5));
        assert_eq!(paging.limit, MAX_PAGE_SIZE);
        assert_eq!(paging.offset, 0);
    }

    #[test]
    fn test_apply_keeps_total() {
        let page = Paging::new(Some(2), Some(1)).apply(vec![1, 2, 3, 4]);
        assert_eq!(page.data, vec![2, 3]);
        assert_eq!(page.total, 4);
    }
}
