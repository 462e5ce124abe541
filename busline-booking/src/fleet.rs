use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use busline_core::fleet::{Bus, BusType, SeatLayout};
use busline_core::repository::{BookingRepository, BusRepository, BusTypeRepository, TripRepository};
use busline_core::rules::BusinessRules;
use busline_core::schedule::{self, Trip, TripDetails};
use busline_core::search::{BusFilter, Page, Paging, TripFilter, TripSearchResult};
use busline_core::validation;
use busline_core::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct BusTypeInput {
    pub name: String,
    pub seats: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusTypePatch {
    pub name: Option<String>,
    pub seats: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusInput {
    pub operator: String,
    pub bus_type: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub rating: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusPatch {
    pub operator: Option<String>,
    pub bus_type: Option<String>,
    pub amenities: Option<Vec<String>>,
    pub rating: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripInput {
    pub bus_id: Uuid,
    pub from: String,
    pub to: String,
    pub date: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub price: i64,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub bus_id: Option<Uuid>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub price: Option<i64>,
    pub is_available: Option<bool>,
}

/// Back-office management of bus types, buses and the trip schedule.
pub struct FleetService {
    bus_types: Arc<dyn BusTypeRepository>,
    buses: Arc<dyn BusRepository>,
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    rules: BusinessRules,
}

impl FleetService {
    pub fn new(
        bus_types: Arc<dyn BusTypeRepository>,
        buses: Arc<dyn BusRepository>,
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        rules: BusinessRules,
    ) -> Self {
        Self { bus_types, buses, trips, bookings, rules }
    }

    // ------------------------------------------------------------------
    // Bus types
    // ------------------------------------------------------------------

    pub async fn list_bus_types(&self) -> CoreResult<Vec<BusType>> {
        self.bus_types.list_bus_types().await
    }

    pub async fn create_bus_type(&self, input: BusTypeInput, actor: &str) -> CoreResult<BusType> {
        let name = input.name.trim();
        validation::require_present(&[("name", name)])?;
        validation::require_seat_count(input.seats)?;

        if self.bus_types.find_bus_type_by_name(name).await?.is_some() {
            return Err(CoreError::conflict("Bus type name already exists"));
        }

        let bus_type = BusType::new(name, input.seats, Some(actor.to_string()));
        self.bus_types.insert_bus_type(&bus_type).await?;
        info!("Bus type {} created with {} seats", bus_type.name, bus_type.seats);
        Ok(bus_type)
    }

    pub async fn update_bus_type(&self, id: Uuid, patch: BusTypePatch, actor: &str) -> CoreResult<BusType> {
        let mut bus_type = self
            .bus_types
            .get_bus_type(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Bus type not found"))?;

        if let Some(name) = patch.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if name != bus_type.name {
                if self.bus_types.find_bus_type_by_name(name).await?.is_some() {
                    return Err(CoreError::conflict("Bus type name already exists"));
                }
                bus_type.name = name.to_string();
            }
        }

        if let Some(seats) = patch.seats {
            validation::require_seat_count(seats)?;
            bus_type.seats = seats;
        }

        bus_type.modified_by = Some(actor.to_string());
        self.bus_types.update_bus_type(&bus_type).await?;
        Ok(bus_type)
    }

    pub async fn delete_bus_type(&self, id: Uuid) -> CoreResult<()> {
        let bus_type = self
            .bus_types
            .get_bus_type(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Bus type not found"))?;

        if self.buses.count_buses_of_type(&bus_type.name).await? > 0 {
            return Err(CoreError::conflict("Bus type is in use by existing buses"));
        }

        self.bus_types.delete_bus_type(id).await
    }

    // ------------------------------------------------------------------
    // Buses
    // ------------------------------------------------------------------

    pub async fn list_buses(&self, filter: &BusFilter) -> CoreResult<Page<Bus>> {
        self.buses.list_buses(filter).await
    }

    pub async fn get_bus(&self, id: Uuid) -> CoreResult<Bus> {
        self.buses
            .get_bus(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Bus not found"))
    }

    pub async fn create_bus(&self, input: BusInput) -> CoreResult<Bus> {
        validation::require_present(&[("operator", input.operator.as_str()), ("bus_type", input.bus_type.as_str())])?;
        validation::require_rating(input.rating)?;
        let bus_type = self.require_bus_type(&input.bus_type).await?;

        let mut bus = Bus {
            id: Uuid::new_v4(),
            operator: input.operator.trim().to_string(),
            bus_type: bus_type.name.clone(),
            seat_layout: SeatLayout { rows: 0, columns: 0, arrangement: Vec::new() },
            seats: Vec::new(),
            amenities: input.amenities,
            rating: input.rating,
            created_at: Utc::now(),
        };
        bus.refit(&bus_type, self.rules.premium_seat_price);

        self.buses.insert_bus(&bus).await?;
        info!("Bus {} ({}) created with {} seats", bus.id, bus.operator, bus.seats.len());
        Ok(bus)
    }

    pub async fn update_bus(&self, id: Uuid, patch: BusPatch) -> CoreResult<Bus> {
        let mut bus = self.get_bus(id).await?;

        if let Some(operator) = patch.operator {
            validation::require_present(&[("operator", operator.as_str())])?;
            bus.operator = operator.trim().to_string();
        }
        if let Some(amenities) = patch.amenities {
            bus.amenities = amenities;
        }
        if let Some(rating) = patch.rating {
            validation::require_rating(rating)?;
            bus.rating = rating;
        }
        if let Some(type_name) = patch.bus_type.filter(|t| *t != bus.bus_type) {
            let bus_type = self.require_bus_type(&type_name).await?;
            // Seat numbers are baked into bookings; only refit an idle bus.
            if !self.trips.trips_for_bus(id).await?.is_empty() {
                return Err(CoreError::conflict("Cannot change the type of a bus with scheduled trips"));
            }
            bus.refit(&bus_type, self.rules.premium_seat_price);
        }

        self.buses.update_bus(&bus).await?;
        Ok(bus)
    }

    pub async fn delete_bus(&self, id: Uuid) -> CoreResult<()> {
        self.get_bus(id).await?;
        if !self.trips.trips_for_bus(id).await?.is_empty() {
            return Err(CoreError::conflict("Cannot delete a bus with scheduled trips"));
        }
        self.buses.delete_bus(id).await
    }

    async fn require_bus_type(&self, name: &str) -> CoreResult<BusType> {
        self.bus_types
            .find_bus_type_by_name(name.trim())
            .await?
            .ok_or_else(|| CoreError::Validation(format!("Unknown bus type: {}", name)))
    }

    // ------------------------------------------------------------------
    // Trips
    // ------------------------------------------------------------------

    pub async fn list_trips(&self, filter: &TripFilter) -> CoreResult<Page<TripDetails>> {
        let page = self.trips.list_trips(filter).await?;
        let mut data = Vec::with_capacity(page.data.len());
        for trip in page.data {
            data.push(self.with_bus(trip).await?);
        }
        Ok(Page { data, total: page.total })
    }

    /// Customer search: bookable trips with at least `passengers` open seats.
    pub async fn search_trips(&self, filter: &TripFilter, passengers: i64) -> CoreResult<Page<TripSearchResult>> {
        let mut unpaged = filter.clone();
        unpaged.available_only = true;
        unpaged.paging = Paging::all();
        let candidates = self.trips.list_trips(&unpaged).await?;

        let mut results = Vec::new();
        for trip in candidates.data {
            let booked = self.bookings.booked_seats(trip.id).await?;
            let details = self.with_bus(trip).await?;
            let available_seats = details
                .bus
                .seats
                .iter()
                .filter(|s| s.is_bookable() && !booked.contains(&s.number))
                .count() as i64;
            if available_seats >= passengers.max(1) {
                results.push(TripSearchResult { trip: details, available_seats });
            }
        }

        Ok(filter.paging.apply(results))
    }

    pub async fn get_trip(&self, id: Uuid) -> CoreResult<TripDetails> {
        let trip = self.require_trip(id).await?;
        self.with_bus(trip).await
    }

    pub async fn create_trip(&self, input: TripInput, actor: &str) -> CoreResult<TripDetails> {
        validation::require_present(&[
            ("from", input.from.as_str()),
            ("to", input.to.as_str()),
            ("date", input.date.as_str()),
            ("departure_time", input.departure_time.as_str()),
            ("arrival_time", input.arrival_time.as_str()),
        ])?;

        let trip = Trip {
            id: Uuid::new_v4(),
            bus_id: input.bus_id,
            from: input.from.trim().to_string(),
            to: input.to.trim().to_string(),
            date: parse_date(&input.date)?,
            departure_time: parse_time(&input.departure_time)?,
            arrival_time: parse_time(&input.arrival_time)?,
            duration: String::new(),
            price: input.price,
            is_available: input.is_available.unwrap_or(true),
            created_by: Some(actor.to_string()),
            modified_by: Some(actor.to_string()),
            created_at: Utc::now(),
        };

        let trip = self.check_schedule(trip).await?;
        self.trips.insert_trip(&trip).await?;
        info!("Trip {} scheduled: {} -> {} on {}", trip.id, trip.from, trip.to, trip.date);
        self.with_bus(trip).await
    }

    pub async fn update_trip(&self, id: Uuid, patch: TripPatch, actor: &str) -> CoreResult<TripDetails> {
        let mut trip = self.require_trip(id).await?;

        if let Some(bus_id) = patch.bus_id {
            trip.bus_id = bus_id;
        }
        if let Some(from) = patch.from {
            trip.from = from.trim().to_string();
        }
        if let Some(to) = patch.to {
            trip.to = to.trim().to_string();
        }
        if let Some(date) = patch.date {
            trip.date = parse_date(&date)?;
        }
        if let Some(dep) = patch.departure_time {
            trip.departure_time = parse_time(&dep)?;
        }
        if let Some(arr) = patch.arrival_time {
            trip.arrival_time = parse_time(&arr)?;
        }
        if let Some(price) = patch.price {
            trip.price = price;
        }
        if let Some(available) = patch.is_available {
            trip.is_available = available;
        }
        validation::require_present(&[("from", trip.from.as_str()), ("to", trip.to.as_str())])?;
        trip.modified_by = Some(actor.to_string());

        let trip = self.check_schedule(trip).await?;
        self.trips.update_trip(&trip).await?;
        self.with_bus(trip).await
    }

    pub async fn set_availability(&self, id: Uuid, is_available: bool, actor: &str) -> CoreResult<TripDetails> {
        let mut trip = self.require_trip(id).await?;
        trip.is_available = is_available;
        trip.modified_by = Some(actor.to_string());
        self.trips.update_trip(&trip).await?;
        info!("Trip {} {}", id, if is_available { "enabled" } else { "disabled" });
        self.with_bus(trip).await
    }

    pub async fn delete_trip(&self, id: Uuid) -> CoreResult<()> {
        self.require_trip(id).await?;
        if self.bookings.count_active_bookings(id).await? > 0 {
            return Err(CoreError::conflict("Cannot delete a trip with active bookings"));
        }
        self.trips.delete_trip(id).await
    }

    async fn require_trip(&self, id: Uuid) -> CoreResult<Trip> {
        self.trips
            .get_trip(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Trip not found"))
    }

    async fn with_bus(&self, trip: Trip) -> CoreResult<TripDetails> {
        let bus = self
            .buses
            .get_bus(trip.bus_id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("Trip {} references missing bus {}", trip.id, trip.bus_id)))?;
        Ok(TripDetails { trip, bus })
    }

    /// Validates a trip against pricing rules and the bus's other trips, and
    /// fills in the derived duration.
    async fn check_schedule(&self, mut trip: Trip) -> CoreResult<Trip> {
        validation::require_price_floor(trip.price, self.rules.min_trip_price)?;
        if trip.from.eq_ignore_ascii_case(&trip.to) {
            return Err(CoreError::validation("Origin and destination must differ"));
        }
        if self.buses.get_bus(trip.bus_id).await?.is_none() {
            return Err(CoreError::validation("Bus not found"));
        }

        let existing = self.trips.trips_for_bus(trip.bus_id).await?;
        if let Some(clash) = schedule::find_conflict(&trip, &existing) {
            info!("Trip on bus {} clashes with trip {}", trip.bus_id, clash.id);
            return Err(CoreError::conflict("This bus is already assigned to a conflicting trip."));
        }

        trip.duration = schedule::duration_label(trip.departure_time, trip.arrival_time);
        Ok(trip)
    }
}

fn parse_date(raw: &str) -> CoreResult<chrono::NaiveDate> {
    schedule::parse_date(raw.trim()).ok_or_else(|| CoreError::Validation(format!("Invalid date: {}", raw)))
}

fn parse_time(raw: &str) -> CoreResult<chrono::NaiveTime> {
    schedule::parse_time(raw.trim()).ok_or_else(|| CoreError::Validation(format!("Invalid time: {}", raw)))
}
