use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use busline_core::booking::{Booking, Passenger};
use busline_core::repository::BookingRepository;
use busline_core::search::{BookingFilter, Page};
use busline_core::{CoreError, CoreResult};

use crate::database::db_err;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_passengers(&self, references: &[String]) -> CoreResult<HashMap<String, Vec<Passenger>>> {
        let rows: Vec<PassengerRow> = sqlx::query_as(
            "SELECT id, booking_reference, name, seat FROM passengers WHERE booking_reference = ANY($1) ORDER BY seat",
        )
        .bind(references)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut by_booking: HashMap<String, Vec<Passenger>> = HashMap::new();
        for row in rows {
            by_booking.entry(row.booking_reference).or_default().push(Passenger {
                id: row.id,
                name: row.name,
                seat: row.seat,
            });
        }
        Ok(by_booking)
    }

    async fn hydrate(&self, rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
        let references: Vec<String> = rows.iter().map(|r| r.reference.clone()).collect();
        let mut passengers = self.load_passengers(&references).await?;
        rows.into_iter()
            .map(|row| {
                let list = passengers.remove(&row.reference).unwrap_or_default();
                row.into_booking(list)
            })
            .collect()
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE {} = $1", BOOKING_COLUMNS, clause))
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    reference: String,
    status: String,
    trip_id: Uuid,
    bus_id: Uuid,
    origin: String,
    destination: String,
    travel_date: String,
    departure: String,
    operator: String,
    email: String,
    phone: String,
    total_amount: i64,
    booking_date: String,
    payment_reference: Option<String>,
    modified_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self, passengers: Vec<Passenger>) -> CoreResult<Booking> {
        let status = self
            .status
            .parse()
            .map_err(|_| CoreError::Storage(format!("Unknown booking status '{}' on {}", self.status, self.reference)))?;
        Ok(Booking {
            reference: self.reference,
            status,
            trip_id: self.trip_id,
            bus_id: self.bus_id,
            from: self.origin,
            to: self.destination,
            date: self.travel_date,
            time: self.departure,
            operator: self.operator,
            passengers,
            email: self.email,
            phone: self.phone,
            total_amount: self.total_amount,
            booking_date: self.booking_date,
            created_at: self.created_at,
            payment_reference: self.payment_reference,
            modified_by: self.modified_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    booking_reference: String,
    name: String,
    seat: String,
}

const BOOKING_COLUMNS: &str = "reference, status, trip_id, bus_id, origin, destination, travel_date, departure, \
                               operator, email, phone, total_amount, booking_date, payment_reference, \
                               modified_by, created_at";

const BOOKING_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR LOWER(email) = LOWER($1))
      AND ($2::text IS NULL OR status = $2)
      AND ($3::uuid IS NULL OR trip_id = $3)
"#;

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            BOOKING_COLUMNS, BOOKING_FILTER
        ))
        .bind(&filter.email)
        .bind(&filter.status)
        .bind(filter.trip_id)
        .bind(filter.paging.limit)
        .bind(filter.paging.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM bookings {}", BOOKING_FILTER))
            .bind(&filter.email)
            .bind(&filter.status)
            .bind(filter.trip_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page { data: self.hydrate(rows).await?, total })
    }

    async fn get_booking(&self, reference: &str) -> CoreResult<Option<Booking>> {
        self.fetch_one_where("reference", reference).await
    }

    async fn find_by_payment_reference(&self, payment_reference: &str) -> CoreResult<Option<Booking>> {
        self.fetch_one_where("payment_reference", payment_reference).await
    }

    async fn booked_seats(&self, trip_id: Uuid) -> CoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT seat FROM passengers WHERE trip_id = $1 AND active")
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|(seat,)| seat).collect())
    }

    async fn count_active_bookings(&self, trip_id: Uuid) -> CoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE trip_id = $1 AND status <> 'cancelled'")
                .bind(trip_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count)
    }

    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO bookings (reference, status, trip_id, bus_id, origin, destination, travel_date, departure,
                                  operator, email, phone, total_amount, booking_date, payment_reference,
                                  modified_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&booking.reference)
        .bind(booking.status.as_str())
        .bind(booking.trip_id)
        .bind(booking.bus_id)
        .bind(&booking.from)
        .bind(&booking.to)
        .bind(&booking.date)
        .bind(&booking.time)
        .bind(&booking.operator)
        .bind(&booking.email)
        .bind(&booking.phone)
        .bind(booking.total_amount)
        .bind(&booking.booking_date)
        .bind(&booking.payment_reference)
        .bind(&booking.modified_by)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let active = booking.status.holds_seats();
        for passenger in &booking.passengers {
            sqlx::query(
                "INSERT INTO passengers (id, booking_reference, trip_id, name, seat, active) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(passenger.id)
            .bind(&booking.reference)
            .bind(booking.trip_id)
            .bind(&passenger.name)
            .bind(&passenger.seat)
            .bind(active)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            r#"
            UPDATE bookings SET status = $1, email = $2, phone = $3, payment_reference = $4, modified_by = $5
            WHERE reference = $6
            "#,
        )
        .bind(booking.status.as_str())
        .bind(&booking.email)
        .bind(&booking.phone)
        .bind(&booking.payment_reference)
        .bind(&booking.modified_by)
        .bind(&booking.reference)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Booking not found"));
        }

        // Re-activating seats trips the partial unique index if someone else took them.
        sqlx::query("UPDATE passengers SET active = $1 WHERE booking_reference = $2")
            .bind(booking.status.holds_seats())
            .bind(&booking.reference)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_booking(&self, reference: &str) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM passengers WHERE booking_reference = $1")
            .bind(reference)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM bookings WHERE reference = $1")
            .bind(reference)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
