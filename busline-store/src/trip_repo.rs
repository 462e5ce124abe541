use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use busline_core::repository::TripRepository;
use busline_core::schedule::Trip;
use busline_core::search::{Page, TripFilter};
use busline_core::CoreResult;

use crate::database::db_err;

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    bus_id: Uuid,
    origin: String,
    destination: String,
    trip_date: NaiveDate,
    departure_time: NaiveTime,
    arrival_time: NaiveTime,
    duration: String,
    price: i64,
    is_available: bool,
    created_by: Option<String>,
    modified_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            bus_id: row.bus_id,
            from: row.origin,
            to: row.destination,
            date: row.trip_date,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            duration: row.duration,
            price: row.price,
            is_available: row.is_available,
            created_by: row.created_by,
            modified_by: row.modified_by,
            created_at: row.created_at,
        }
    }
}

const TRIP_COLUMNS: &str = "id, bus_id, origin, destination, trip_date, departure_time, arrival_time, \
                            duration, price, is_available, created_by, modified_by, created_at";

const TRIP_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR LOWER(origin) = LOWER($1))
      AND ($2::text IS NULL OR LOWER(destination) = LOWER($2))
      AND ($3::date IS NULL OR trip_date = $3)
      AND ($4::uuid IS NULL OR bus_id = $4)
      AND (NOT $5 OR is_available)
"#;

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn list_trips(&self, filter: &TripFilter) -> CoreResult<Page<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trips {} ORDER BY trip_date, departure_time LIMIT $6 OFFSET $7",
            TRIP_COLUMNS, TRIP_FILTER
        ))
        .bind(&filter.from)
        .bind(&filter.to)
        .bind(filter.date)
        .bind(filter.bus_id)
        .bind(filter.available_only)
        .bind(filter.paging.limit)
        .bind(filter.paging.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM trips {}", TRIP_FILTER))
            .bind(&filter.from)
            .bind(&filter.to)
            .bind(filter.date)
            .bind(filter.bus_id)
            .bind(filter.available_only)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page { data: rows.into_iter().map(Into::into).collect(), total })
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn trips_for_bus(&self, bus_id: Uuid) -> CoreResult<Vec<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trips WHERE bus_id = $1 ORDER BY trip_date, departure_time",
            TRIP_COLUMNS
        ))
        .bind(bus_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, bus_id, origin, destination, trip_date, departure_time, arrival_time,
                               duration, price, is_available, created_by, modified_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(&trip.from)
        .bind(&trip.to)
        .bind(trip.date)
        .bind(trip.departure_time)
        .bind(trip.arrival_time)
        .bind(&trip.duration)
        .bind(trip.price)
        .bind(trip.is_available)
        .bind(&trip.created_by)
        .bind(&trip.modified_by)
        .bind(trip.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_trip(&self, trip: &Trip) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE trips SET bus_id = $1, origin = $2, destination = $3, trip_date = $4,
                             departure_time = $5, arrival_time = $6, duration = $7, price = $8,
                             is_available = $9, modified_by = $10
            WHERE id = $11
            "#,
        )
        .bind(trip.bus_id)
        .bind(&trip.from)
        .bind(&trip.to)
        .bind(trip.date)
        .bind(trip.departure_time)
        .bind(trip.arrival_time)
        .bind(&trip.duration)
        .bind(trip.price)
        .bind(trip.is_available)
        .bind(&trip.modified_by)
        .bind(trip.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
