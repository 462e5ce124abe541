use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use busline_core::fleet::{Bus, BusType, Seat, SeatClass, SeatLayout};
use busline_core::repository::{BusRepository, BusTypeRepository};
use busline_core::search::{BusFilter, Page};
use busline_core::CoreResult;

use crate::database::db_err;

pub struct PgBusRepository {
    pool: PgPool,
}

impl PgBusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_seats(&self, bus_ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<Seat>>> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, bus_id, number, class, price, is_available FROM seats WHERE bus_id = ANY($1) ORDER BY number",
        )
        .bind(bus_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut by_bus: HashMap<Uuid, Vec<Seat>> = HashMap::new();
        for row in rows {
            by_bus.entry(row.bus_id).or_default().push(row.into());
        }
        Ok(by_bus)
    }

    async fn insert_seats(tx: &mut Transaction<'_, Postgres>, bus: &Bus) -> CoreResult<()> {
        for seat in &bus.seats {
            sqlx::query(
                "INSERT INTO seats (id, bus_id, number, class, price, is_available) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(seat.id)
            .bind(bus.id)
            .bind(&seat.number)
            .bind(seat.class.as_str())
            .bind(seat.price)
            .bind(seat.is_available)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BusTypeRow {
    id: Uuid,
    name: String,
    seats: i32,
    created_by: Option<String>,
    modified_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<BusTypeRow> for BusType {
    fn from(row: BusTypeRow) -> Self {
        BusType {
            id: row.id,
            name: row.name,
            seats: row.seats,
            created_by: row.created_by,
            modified_by: row.modified_by,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    operator: String,
    bus_type: String,
    seat_layout: Json<SeatLayout>,
    amenities: Vec<String>,
    rating: f32,
    created_at: DateTime<Utc>,
}

impl BusRow {
    fn into_bus(self, seats: Vec<Seat>) -> Bus {
        Bus {
            id: self.id,
            operator: self.operator,
            bus_type: self.bus_type,
            seat_layout: self.seat_layout.0,
            seats,
            amenities: self.amenities,
            rating: self.rating,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    bus_id: Uuid,
    number: String,
    class: String,
    price: Option<i64>,
    is_available: bool,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            bus_id: row.bus_id,
            number: row.number,
            class: SeatClass::parse(&row.class).unwrap_or(SeatClass::Regular),
            price: row.price,
            is_available: row.is_available,
        }
    }
}

const BUS_TYPE_COLUMNS: &str = "id, name, seats, created_by, modified_by, created_at";
const BUS_COLUMNS: &str = "id, operator, bus_type, seat_layout, amenities, rating, created_at";

#[async_trait]
impl BusTypeRepository for PgBusRepository {
    async fn list_bus_types(&self) -> CoreResult<Vec<BusType>> {
        let rows: Vec<BusTypeRow> = sqlx::query_as(&format!("SELECT {} FROM bus_types ORDER BY name", BUS_TYPE_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_bus_type(&self, id: Uuid) -> CoreResult<Option<BusType>> {
        let row: Option<BusTypeRow> = sqlx::query_as(&format!("SELECT {} FROM bus_types WHERE id = $1", BUS_TYPE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_bus_type_by_name(&self, name: &str) -> CoreResult<Option<BusType>> {
        let row: Option<BusTypeRow> = sqlx::query_as(&format!("SELECT {} FROM bus_types WHERE name = $1", BUS_TYPE_COLUMNS))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn insert_bus_type(&self, bus_type: &BusType) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO bus_types (id, name, seats, created_by, modified_by, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(bus_type.id)
        .bind(&bus_type.name)
        .bind(bus_type.seats)
        .bind(&bus_type.created_by)
        .bind(&bus_type.modified_by)
        .bind(bus_type.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_bus_type(&self, bus_type: &BusType) -> CoreResult<()> {
        sqlx::query("UPDATE bus_types SET name = $1, seats = $2, modified_by = $3 WHERE id = $4")
            .bind(&bus_type.name)
            .bind(bus_type.seats)
            .bind(&bus_type.modified_by)
            .bind(bus_type.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_bus_type(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM bus_types WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl BusRepository for PgBusRepository {
    async fn list_buses(&self, filter: &BusFilter) -> CoreResult<Page<Bus>> {
        let operator = filter.operator.as_ref().map(|o| format!("%{}%", o));

        let rows: Vec<BusRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM buses
            WHERE ($1::text IS NULL OR operator ILIKE $1)
              AND ($2::text IS NULL OR bus_type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            BUS_COLUMNS
        ))
        .bind(&operator)
        .bind(&filter.bus_type)
        .bind(filter.paging.limit)
        .bind(filter.paging.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM buses
            WHERE ($1::text IS NULL OR operator ILIKE $1)
              AND ($2::text IS NULL OR bus_type = $2)
            "#,
        )
        .bind(&operator)
        .bind(&filter.bus_type)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut seats = self.load_seats(&ids).await?;
        let data = rows
            .into_iter()
            .map(|row| {
                let bus_seats = seats.remove(&row.id).unwrap_or_default();
                row.into_bus(bus_seats)
            })
            .collect();

        Ok(Page { data, total })
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        let row: Option<BusRow> = sqlx::query_as(&format!("SELECT {} FROM buses WHERE id = $1", BUS_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let seats = self.load_seats(&[id]).await?.remove(&id).unwrap_or_default();
                Ok(Some(row.into_bus(seats)))
            }
            None => Ok(None),
        }
    }

    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO buses (id, operator, bus_type, seat_layout, amenities, rating, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(bus.id)
        .bind(&bus.operator)
        .bind(&bus.bus_type)
        .bind(Json(&bus.seat_layout))
        .bind(&bus.amenities)
        .bind(bus.rating)
        .bind(bus.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        Self::insert_seats(&mut tx, bus).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn update_bus(&self, bus: &Bus) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            UPDATE buses SET operator = $1, bus_type = $2, seat_layout = $3, amenities = $4, rating = $5
            WHERE id = $6
            "#,
        )
        .bind(&bus.operator)
        .bind(&bus.bus_type)
        .bind(Json(&bus.seat_layout))
        .bind(&bus.amenities)
        .bind(bus.rating)
        .bind(bus.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM seats WHERE bus_id = $1")
            .bind(bus.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        Self::insert_seats(&mut tx, bus).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_bus(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn count_buses_of_type(&self, bus_type: &str) -> CoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM buses WHERE bus_type = $1")
            .bind(bus_type)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}
