use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use packer_core::{
    baseline_list, packing_decision, Detection, Dimensions, Item, ItemId, ItemPatch, KernelError,
    PackingDecision, PackingLimits, RecommendedItem, Trip, TripId, TripPatch,
};
use packer_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Measurement provider boundary: yields one stable scale reading in
/// kilograms, or reports that no stable reading could be obtained.
pub trait Scale: Send + Sync {
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] when the sensor is
    /// unavailable or no stable reading was obtained.
    fn read_weight(&self) -> Result<WeightReading, KernelError>;
}

/// Detection provider boundary: classifies an image into at most one object
/// with bounding boxes and estimated physical dimensions.
pub trait Detector: Send + Sync {
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] when the detector itself
    /// fails; an empty result is `Ok(None)`.
    fn detect(&self, image: &[u8]) -> Result<Option<Detection>, KernelError>;
}

/// Weather provider boundary: min/max temperature for a destination.
pub trait WeatherSource: Send + Sync {
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] for unsupported locations
    /// or provider failures.
    fn forecast(&self, destination: &str) -> Result<TempRange, KernelError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightReading {
    pub weight_kg: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TempRange {
    pub lowest_temp: f64,
    pub highest_temp: f64,
}

/// Default scale wiring when no hardware is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedScale;

impl Scale for DisconnectedScale {
    fn read_weight(&self) -> Result<WeightReading, KernelError> {
        Err(KernelError::InvalidMeasurement("scale not detected".to_string()))
    }
}

/// Fixed-value scale for tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct FixedScale {
    pub weight_kg: f64,
}

impl Scale for FixedScale {
    fn read_weight(&self) -> Result<WeightReading, KernelError> {
        Ok(WeightReading { weight_kg: self.weight_kg })
    }
}

/// Default detector wiring: never sees anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _image: &[u8]) -> Result<Option<Detection>, KernelError> {
        Ok(None)
    }
}

/// Fixed-result detector for tests and demos.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    pub detection: Detection,
}

impl Detector for FixedDetector {
    fn detect(&self, _image: &[u8]) -> Result<Option<Detection>, KernelError> {
        Ok(Some(self.detection.clone()))
    }
}

/// Canned per-city forecast table. Stands in for the real lookup service,
/// which lives outside this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWeather;

const FORECASTS: &[(&str, f64, f64)] = &[
    ("reykjavik", -2.0, 6.0),
    ("oslo", 1.0, 9.0),
    ("helsinki", -4.0, 4.0),
    ("london", 8.0, 16.0),
    ("new york", 5.0, 14.0),
    ("tokyo", 12.0, 21.0),
    ("rome", 15.0, 26.0),
    ("dubai", 26.0, 39.0),
];

impl WeatherSource for StaticWeather {
    fn forecast(&self, destination: &str) -> Result<TempRange, KernelError> {
        let normalized = destination.trim().to_lowercase();
        FORECASTS
            .iter()
            .find(|(city, _, _)| *city == normalized)
            .map(|(_, lowest, highest)| TempRange { lowest_temp: *lowest, highest_temp: *highest })
            .ok_or_else(|| {
                KernelError::InvalidMeasurement(format!("unsupported location: {destination}"))
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateItemRequest {
    pub name: Option<String>,
    pub weight_kg: Option<f64>,
    pub estimated_volume_cm3: Option<f64>,
    pub detection: Option<Detection>,
    /// Optional trip to associate the new item with right away.
    pub trip_id: Option<TripId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTripRequest {
    pub destination: String,
    pub duration_days: i64,
    #[serde(default)]
    pub doing_laundry: bool,
    pub activities: Option<String>,
    pub lowest_temp: Option<f64>,
    pub highest_temp: Option<f64>,
}

/// Application facade over the registries, scorer, and decision engine.
///
/// Constructed once at startup and cloned into handlers; the store sits
/// behind one mutex, so every decide call's read-score-commit sequence runs
/// as a critical section. That is coarser than the per-trip serialization the
/// engine strictly needs, trading away cross-trip parallelism for a single
/// obvious lock.
#[derive(Clone)]
pub struct PackerApi {
    store: Arc<Mutex<SqliteStore>>,
    limits: PackingLimits,
    scale: Arc<dyn Scale>,
    detector: Arc<dyn Detector>,
    weather: Arc<dyn WeatherSource>,
}

impl PackerApi {
    #[must_use]
    pub fn new(store: SqliteStore, limits: PackingLimits) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            limits,
            scale: Arc::new(DisconnectedScale),
            detector: Arc::new(NullDetector),
            weather: Arc::new(StaticWeather),
        }
    }

    /// Open a migrated in-memory store, the default deployment shape.
    ///
    /// # Errors
    /// Returns an error when the store cannot be created or migrated.
    pub fn in_memory(limits: PackingLimits) -> Result<Self> {
        let mut store = SqliteStore::open_in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, limits))
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Arc<dyn Scale>) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    #[must_use]
    pub fn with_weather(mut self, weather: Arc<dyn WeatherSource>) -> Self {
        self.weather = weather;
        self
    }

    #[must_use]
    pub fn limits(&self) -> PackingLimits {
        self.limits
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, SqliteStore>> {
        self.store.lock().map_err(|_| anyhow!("store mutex poisoned"))
    }

    /// Create an item, optionally associating it with a trip in the same call.
    ///
    /// # Errors
    /// Returns an error when validation fails or the target trip is unknown.
    pub fn create_item(&self, request: CreateItemRequest) -> Result<Item> {
        let mut item = Item::new();
        item.name = request.name;
        item.weight_kg = request.weight_kg;
        item.estimated_volume_cm3 = request.estimated_volume_cm3;
        item.detection = request.detection;
        if item.estimated_volume_cm3.is_none() {
            item.estimated_volume_cm3 = item
                .detection
                .as_ref()
                .and_then(|detection| detection.dimensions.as_ref())
                .map(Dimensions::volume_cm3);
        }

        let mut store = self.lock_store()?;
        if let Some(trip_id) = request.trip_id {
            // Fail before inserting so a bad trip id leaves no orphan item.
            store.get_trip(trip_id)?;
        }
        store.insert_item(&item)?;
        if let Some(trip_id) = request.trip_id {
            store.associate(item.item_id, trip_id)?;
        }

        let stored = store.get_item(item.item_id)?;
        tracing::info!(item_id = %stored.item_id, "created item");
        Ok(stored)
    }

    /// # Errors
    /// Returns an error when the id is unknown or the store fails.
    pub fn get_item(&self, item_id: ItemId) -> Result<Item> {
        self.lock_store()?.get_item(item_id)
    }

    /// # Errors
    /// Returns an error when the store fails.
    pub fn list_items(&self) -> Result<Vec<Item>> {
        self.lock_store()?.list_items()
    }

    /// Apply a partial update; trips the item belongs to are recalculated.
    ///
    /// # Errors
    /// Returns an error when the id is unknown or validation fails.
    pub fn update_item(&self, item_id: ItemId, patch: ItemPatch) -> Result<Item> {
        let mut store = self.lock_store()?;
        let mut item = store.get_item(item_id)?;
        patch.apply(&mut item);
        store.update_item(&item)?;
        store.get_item(item_id)
    }

    /// # Errors
    /// Returns an error when the id is unknown or the store fails.
    pub fn delete_item(&self, item_id: ItemId) -> Result<()> {
        let mut store = self.lock_store()?;
        store.delete_item(item_id)?;
        tracing::info!(item_id = %item_id, "deleted item");
        Ok(())
    }

    /// # Errors
    /// Returns an error when validation or the insert fails.
    pub fn create_trip(&self, request: CreateTripRequest) -> Result<Trip> {
        let mut trip = Trip::new(request.destination, request.duration_days, request.doing_laundry);
        trip.activities = request.activities;
        trip.lowest_temp = request.lowest_temp;
        trip.highest_temp = request.highest_temp;

        let mut store = self.lock_store()?;
        store.insert_trip(&trip)?;
        let stored = store.get_trip(trip.trip_id)?;
        tracing::info!(trip_id = %stored.trip_id, destination = %stored.destination, "created trip");
        Ok(stored)
    }

    /// # Errors
    /// Returns an error when the id is unknown or the store fails.
    pub fn get_trip(&self, trip_id: TripId) -> Result<Trip> {
        self.lock_store()?.get_trip(trip_id)
    }

    /// # Errors
    /// Returns an error when the store fails.
    pub fn list_trips(&self) -> Result<Vec<Trip>> {
        self.lock_store()?.list_trips()
    }

    /// # Errors
    /// Returns an error when the id is unknown or validation fails.
    pub fn update_trip(&self, trip_id: TripId, patch: TripPatch) -> Result<Trip> {
        let mut store = self.lock_store()?;
        let mut trip = store.get_trip(trip_id)?;
        patch.apply(&mut trip);
        store.update_trip(&trip)?;
        store.get_trip(trip_id)
    }

    /// # Errors
    /// Returns an error when the id is unknown or the store fails.
    pub fn delete_trip(&self, trip_id: TripId) -> Result<()> {
        let mut store = self.lock_store()?;
        store.delete_trip(trip_id)?;
        tracing::info!(trip_id = %trip_id, "deleted trip");
        Ok(())
    }

    /// # Errors
    /// Returns an error when the trip id is unknown or the store fails.
    pub fn trip_items(&self, trip_id: TripId) -> Result<Vec<Item>> {
        self.lock_store()?.list_trip_items(trip_id)
    }

    /// # Errors
    /// Returns an error when either id is unknown or the store fails.
    pub fn associate(&self, item_id: ItemId, trip_id: TripId) -> Result<()> {
        self.lock_store()?.associate(item_id, trip_id)
    }

    /// # Errors
    /// Returns an error when either id is unknown or the store fails.
    pub fn disassociate(&self, item_id: ItemId, trip_id: TripId) -> Result<()> {
        self.lock_store()?.disassociate(item_id, trip_id)
    }

    /// Run one packing decision; a `pack` outcome is committed into trip
    /// membership and totals before returning.
    ///
    /// # Errors
    /// Returns [`KernelError::NotFound`] for unknown ids and
    /// [`KernelError::Validation`] when the candidate is already packed. The
    /// decision itself never fails on valid inputs.
    pub fn decide(&self, trip_id: TripId, item_id: ItemId) -> Result<PackingDecision> {
        let mut store = self.lock_store()?;
        let mut trip = store.get_trip(trip_id)?;
        let mut candidate = store.get_item(item_id)?;
        if trip.items.contains(&item_id) {
            return Err(KernelError::Validation(format!(
                "item {item_id} is already packed for trip {trip_id}"
            ))
            .into());
        }

        let mut packed = store.list_trip_items(trip_id)?;
        let decision = packing_decision(&mut candidate, &mut trip, &mut packed, &self.limits);
        if decision.status == packer_core::DecisionStatus::Pack {
            store.commit_pack(trip_id, item_id)?;
        }

        tracing::debug!(
            trip_id = %trip_id,
            item_id = %item_id,
            status = decision.status.as_str(),
            "packing decision"
        );
        Ok(decision)
    }

    /// Reconcile a trip's cached totals against a fresh full sum.
    ///
    /// # Errors
    /// Returns an error when the trip id is unknown or the store fails.
    pub fn recalculate(&self, trip_id: TripId) -> Result<Trip> {
        let mut store = self.lock_store()?;
        store.recalculate_totals(trip_id)?;
        store.get_trip(trip_id)
    }

    /// # Errors
    /// Returns an error when the trip id is unknown.
    pub fn baseline(&self, trip_id: TripId) -> Result<Vec<RecommendedItem>> {
        let trip = self.lock_store()?.get_trip(trip_id)?;
        Ok(baseline_list(&trip))
    }

    /// Pull one reading from the scale into the item; member trips are
    /// recalculated through the normal update path.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] when the scale is
    /// unavailable or yields an implausible value, or [`KernelError::NotFound`]
    /// for an unknown item.
    pub fn record_weight(&self, item_id: ItemId) -> Result<Item> {
        let reading = self.scale.read_weight().map_err(anyhow::Error::new)?;
        if !reading.weight_kg.is_finite() || reading.weight_kg < 0.0 {
            return Err(KernelError::InvalidMeasurement(format!(
                "scale reported implausible weight {}",
                reading.weight_kg
            ))
            .into());
        }

        let mut store = self.lock_store()?;
        let mut item = store.get_item(item_id)?;
        item.weight_kg = Some(reading.weight_kg);
        store.update_item(&item)?;
        tracing::info!(item_id = %item_id, weight_kg = reading.weight_kg, "recorded scale reading");
        store.get_item(item_id)
    }

    /// Run the detector over an image and attach the result to the item,
    /// replacing any previous detection. The item's volume estimate is
    /// derived from the detection's dimensions when present.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] when the detector fails or
    /// sees nothing, or [`KernelError::NotFound`] for an unknown item.
    pub fn record_detection(&self, item_id: ItemId, image: &[u8]) -> Result<Item> {
        let Some(detection) = self.detector.detect(image).map_err(anyhow::Error::new)? else {
            return Err(KernelError::InvalidMeasurement(
                "no object detected in image".to_string(),
            )
            .into());
        };
        detection.validate()?;

        let mut store = self.lock_store()?;
        let mut item = store.get_item(item_id)?;
        if let Some(dimensions) = &detection.dimensions {
            item.estimated_volume_cm3 = Some(dimensions.volume_cm3());
        }
        item.detection = Some(detection);
        store.update_item(&item)?;
        tracing::info!(item_id = %item_id, "recorded detection");
        store.get_item(item_id)
    }

    /// Refresh a trip's temperature range from the weather provider.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidMeasurement`] for unsupported locations,
    /// or [`KernelError::NotFound`] for an unknown trip.
    pub fn refresh_weather(&self, trip_id: TripId) -> Result<Trip> {
        let mut store = self.lock_store()?;
        let mut trip = store.get_trip(trip_id)?;
        let range = self.weather.forecast(&trip.destination).map_err(anyhow::Error::new)?;
        trip.lowest_temp = Some(range.lowest_temp);
        trip.highest_temp = Some(range.highest_temp);
        store.update_trip(&trip)?;
        store.get_trip(trip_id)
    }
}
