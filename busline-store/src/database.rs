use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use busline_core::CoreError;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps driver errors onto domain errors; unique violations become conflicts.
pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let what = match db.constraint() {
                Some("passengers_active_seat_idx") => "Seat is already booked on this trip",
                Some("bus_types_name_key") => "Bus type name already exists",
                Some("bookings_payment_reference_key") => "Payment reference already used",
                Some("bookings_pkey") => "Booking reference already exists",
                _ => "Duplicate record",
            };
            return CoreError::Conflict(what.to_string());
        }
    }
    CoreError::Storage(err.to_string())
}
