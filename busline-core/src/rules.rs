use serde::Deserialize;

/// Tunables that shape booking behaviour. Loaded from the `business_rules`
/// config section.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_seat_hold_seconds")]
    pub seat_hold_seconds: u64,
    #[serde(default = "default_min_trip_price")]
    pub min_trip_price: i64,
    #[serde(default = "default_premium_seat_price")]
    pub premium_seat_price: i64,
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_seat_hold_seconds() -> u64 { 600 }
fn default_min_trip_price() -> i64 { 500 }
fn default_premium_seat_price() -> i64 { 1500 }
fn default_reference_prefix() -> String { "TE".to_string() }
fn default_rate_limit() -> i64 { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_hold_seconds: default_seat_hold_seconds(),
            min_trip_price: default_min_trip_price(),
            premium_seat_price: default_premium_seat_price(),
            reference_prefix: default_reference_prefix(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}
