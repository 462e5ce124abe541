use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Seats reserved under one token while the customer pays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatHold {
    pub hold_token: String,
    pub trip_id: Uuid,
    pub seats: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a lease acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The seat was free and is now held by the caller.
    Fresh,
    /// The caller already held the seat; its TTL was extended.
    Refreshed,
    /// Someone else holds the seat.
    Taken,
}

/// Lease storage for seat holds. Expiry is the store's job.
#[async_trait]
pub trait SeatHoldStore: Send + Sync {
    /// Set-if-absent with TTL; re-acquiring with the holder's own token
    /// refreshes the TTL.
    async fn acquire(&self, trip_id: Uuid, seat: &str, token: &str, ttl_seconds: u64) -> CoreResult<Acquired>;

    /// Deletes the lease only if `token` holds it.
    async fn release(&self, trip_id: Uuid, seat: &str, token: &str) -> CoreResult<bool>;

    async fn holder(&self, trip_id: Uuid, seat: &str) -> CoreResult<Option<String>>;

    /// Drops the lease regardless of holder; used once a seat is sold.
    async fn clear(&self, trip_id: Uuid, seat: &str) -> CoreResult<()>;
}
