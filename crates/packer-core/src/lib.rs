use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub const DEFAULT_WEIGHT_LIMIT_KG: f64 = 20.0;
pub const DEFAULT_VOLUME_LIMIT_CM3: f64 = 40_000.0;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),
}

impl KernelError {
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Display) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Trip,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Trip => "trip",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ItemId(pub Ulid);

impl ItemId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TripId(pub Ulid);

impl TripId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TripId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel-space rectangle reported by the detection provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// # Errors
    /// Returns [`KernelError::Validation`] when the box is degenerate or inverted.
    pub fn validate(&self) -> Result<(), KernelError> {
        if !self.x_min.is_finite()
            || !self.y_min.is_finite()
            || !self.x_max.is_finite()
            || !self.y_max.is_finite()
        {
            return Err(KernelError::Validation(
                "all bounding box coordinates must be finite numbers".to_string(),
            ));
        }
        if self.x_min >= self.x_max {
            return Err(KernelError::Validation("x_min must be less than x_max".to_string()));
        }
        if self.y_min >= self.y_max {
            return Err(KernelError::Validation("y_min must be less than y_max".to_string()));
        }
        Ok(())
    }
}

/// Physical extent of a detected object in centimeters.
///
/// Height is optional: the camera pipeline can only estimate it from some
/// angles, and an unestimated height counts as 1 cm in volume terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: Option<f64>,
}

impl Dimensions {
    #[must_use]
    pub fn volume_cm3(&self) -> f64 {
        self.length * self.width * self.height.unwrap_or(1.0)
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when any extent is not strictly positive.
    pub fn validate(&self) -> Result<(), KernelError> {
        for (label, value) in [
            ("length", Some(self.length)),
            ("width", Some(self.width)),
            ("height", self.height),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(KernelError::Validation(format!(
                        "dimension {label} must be strictly positive, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One classification result from the external detector. An item keeps at
/// most one live detection; a newer capture replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub item_name: String,
    pub class_name: String,
    pub confidence: f64,
    pub bounding_boxes: Vec<BoundingBox>,
    pub dimensions: Option<Dimensions>,
}

impl Detection {
    /// # Errors
    /// Returns [`KernelError::Validation`] when the detection is structurally
    /// implausible: empty name, confidence outside [0, 1], no bounding boxes,
    /// or an invalid box or dimension set.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.item_name.trim().is_empty() {
            return Err(KernelError::Validation(
                "detection item_name must be non-empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(KernelError::Validation(format!(
                "detection confidence must be in [0.0, 1.0], got {}",
                self.confidence
            )));
        }
        if self.bounding_boxes.is_empty() {
            return Err(KernelError::Validation(
                "detection must carry at least one bounding box".to_string(),
            ));
        }
        for bounding_box in &self.bounding_boxes {
            bounding_box.validate()?;
        }
        if let Some(dimensions) = &self.dimensions {
            dimensions.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub item_id: ItemId,
    pub name: Option<String>,
    pub weight_kg: Option<f64>,
    pub estimated_volume_cm3: Option<f64>,
    pub detection: Option<Detection>,
    /// Scorer cache, valid only within the decision that computed it.
    /// Scores are trip-contextual and never persisted.
    pub importance: Option<i64>,
    #[serde(default)]
    pub trips: Vec<TripId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Item {
    #[must_use]
    pub fn new() -> Self {
        Self {
            item_id: ItemId::new(),
            name: None,
            weight_kg: None,
            estimated_volume_cm3: None,
            detection: None,
            importance: None,
            trips: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Name used for importance lookup: the detector's label wins over the
    /// manual one when both are present.
    #[must_use]
    pub fn scoring_name(&self) -> Option<&str> {
        self.detection
            .as_ref()
            .map(|detection| detection.item_name.as_str())
            .or(self.name.as_deref())
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when a measurement is negative or
    /// non-finite, or the attached detection is invalid.
    pub fn validate(&self) -> Result<(), KernelError> {
        for (label, value) in [
            ("weight_kg", self.weight_kg),
            ("estimated_volume_cm3", self.estimated_volume_cm3),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(KernelError::Validation(format!(
                        "{label} must be a non-negative finite number, got {value}"
                    )));
                }
            }
        }
        if let Some(detection) = &self.detection {
            detection.validate()?;
        }
        Ok(())
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub trip_id: TripId,
    pub destination: String,
    pub duration_days: i64,
    pub doing_laundry: bool,
    pub activities: Option<String>,
    pub lowest_temp: Option<f64>,
    pub highest_temp: Option<f64>,
    #[serde(default)]
    pub items: Vec<ItemId>,
    #[serde(default)]
    pub total_items_weight: f64,
    #[serde(default)]
    pub total_items_volume: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Trip {
    #[must_use]
    pub fn new(destination: impl Into<String>, duration_days: i64, doing_laundry: bool) -> Self {
        Self {
            trip_id: TripId::new(),
            destination: destination.into(),
            duration_days,
            doing_laundry,
            activities: None,
            lowest_temp: None,
            highest_temp: None,
            items: Vec::new(),
            total_items_weight: 0.0,
            total_items_volume: 0.0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when the destination is empty, the
    /// duration is not at least one day, or a cached total is negative.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.destination.trim().is_empty() {
            return Err(KernelError::Validation("destination must be non-empty".to_string()));
        }
        if self.duration_days < 1 {
            return Err(KernelError::Validation(format!(
                "duration_days must be at least 1, got {}",
                self.duration_days
            )));
        }
        for (label, value) in [
            ("total_items_weight", self.total_items_weight),
            ("total_items_volume", self.total_items_volume),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(KernelError::Validation(format!(
                    "{label} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Packing budget. Policy configuration shared by every trip; not per-trip state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PackingLimits {
    pub weight_limit_kg: f64,
    pub volume_limit_cm3: f64,
}

impl Default for PackingLimits {
    fn default() -> Self {
        Self {
            weight_limit_kg: DEFAULT_WEIGHT_LIMIT_KG,
            volume_limit_cm3: DEFAULT_VOLUME_LIMIT_CM3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pack,
    Remove,
    Swap,
}

impl DecisionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pack => "pack",
            Self::Remove => "remove",
            Self::Swap => "swap",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Overweight,
    OverVolume,
}

impl DecisionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overweight => "overweight",
            Self::OverVolume => "over_volume",
        }
    }
}

/// Outcome of one packing decision. Not persisted; `reason` is absent exactly
/// when the status is `pack`, and `swap_candidates` is present exactly when
/// the status is `swap`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackingDecision {
    pub status: DecisionStatus,
    pub reason: Option<DecisionReason>,
    pub swap_candidates: Option<Vec<Item>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecommendedItem {
    pub item_name: String,
    pub reason: Option<String>,
    pub priority: i64,
}

impl RecommendedItem {
    fn with_reason(item_name: &str, reason: &str) -> Self {
        Self { item_name: item_name.to_string(), reason: Some(reason.to_string()), priority: 1 }
    }
}

const IMPORTANCE_TABLE: &[(&str, i64)] = &[
    ("shirt", 95),
    ("pants", 95),
    ("socks", 95),
    ("shoes", 95),
    ("toothbrush", 90),
    ("toothpaste", 90),
    ("deodorant", 90),
    ("laptop", 80),
    ("laptop charger", 80),
    ("phone", 80),
    ("phone charger", 80),
    ("umbrella", 35),
    ("coat", 35),
    ("sunglasses", 30),
    ("snack", 20),
    ("water bottle", 20),
];

/// Electronics that only earn their weight on a work trip.
const WORK_GATED: &[&str] = &["laptop", "laptop charger"];

fn table_importance(name: &str) -> i64 {
    let normalized = name.trim().to_lowercase();
    IMPORTANCE_TABLE
        .iter()
        .find(|(entry, _)| *entry == normalized)
        .map_or(0, |(_, score)| *score)
}

fn is_work_trip(trip: &Trip) -> bool {
    trip.activities
        .as_deref()
        .is_some_and(|activities| activities.to_lowercase().contains("work"))
}

/// Score one item against a trip and cache the score on the item.
///
/// Scores are trip-contextual: the same laptop scores 80 on a work trip and 0
/// on a leisure trip, so callers must rescore per decision rather than reuse
/// a score computed against a different trip.
pub fn item_importance(item: &mut Item, trip: &Trip) -> i64 {
    let score = match item.scoring_name() {
        Some(name) => {
            let normalized = name.trim().to_lowercase();
            if WORK_GATED.contains(&normalized.as_str()) && !is_work_trip(trip) {
                0
            } else {
                table_importance(name)
            }
        }
        None => 0,
    };
    item.importance = Some(score);
    score
}

/// Stable-sort packed items ascending by importance and greedily accumulate
/// them until the freed measurement covers the overflow. Deliberately a
/// greedy approximation: it stops at the first cumulative sum that covers the
/// overflow and may evict more than the tightest-fitting subset would.
fn displacement_set(
    packed: &[Item],
    overflow: f64,
    measure: impl Fn(&Item) -> Option<f64>,
) -> Vec<Item> {
    let mut by_importance: Vec<&Item> = packed.iter().collect();
    by_importance.sort_by_key(|item| item.importance.unwrap_or(0));

    let mut freed = 0.0;
    let mut candidates = Vec::new();
    for item in by_importance {
        candidates.push(item.clone());
        freed += measure(item).unwrap_or(0.0);
        if freed >= overflow {
            break;
        }
    }
    candidates
}

/// Decide whether `candidate` should be packed for `trip`.
///
/// Checks run in a fixed order: weight, then volume, then commit. A candidate
/// with no measurement for a given axis can neither trip that limit nor count
/// toward it. On a `pack` outcome the candidate is committed into the
/// in-memory trip: totals grow by the candidate's present measurements and
/// the membership edge is recorded on both sides. `remove` and `swap` leave
/// trip state untouched; the swap candidate list is ordered and may
/// over-evict (see [`displacement_set`]).
///
/// Equal importance to the least important packed item is not enough to
/// displace it: the comparison is strict.
pub fn packing_decision(
    candidate: &mut Item,
    trip: &mut Trip,
    packed: &mut [Item],
    limits: &PackingLimits,
) -> PackingDecision {
    let candidate_importance = item_importance(candidate, trip);
    for item in packed.iter_mut() {
        item_importance(item, trip);
    }
    let min_packed_importance =
        packed.iter().map(|item| item.importance.unwrap_or(0)).min().unwrap_or(0);

    if let Some(weight) = candidate.weight_kg {
        if trip.total_items_weight + weight > limits.weight_limit_kg {
            if candidate_importance > min_packed_importance {
                let overflow = (trip.total_items_weight + weight) - limits.weight_limit_kg;
                return PackingDecision {
                    status: DecisionStatus::Swap,
                    reason: Some(DecisionReason::Overweight),
                    swap_candidates: Some(displacement_set(packed, overflow, |item| {
                        item.weight_kg
                    })),
                };
            }
            return PackingDecision {
                status: DecisionStatus::Remove,
                reason: Some(DecisionReason::Overweight),
                swap_candidates: None,
            };
        }
    }

    if let Some(volume) = candidate.estimated_volume_cm3 {
        if trip.total_items_volume + volume > limits.volume_limit_cm3 {
            if candidate_importance > min_packed_importance {
                let overflow = (trip.total_items_volume + volume) - limits.volume_limit_cm3;
                return PackingDecision {
                    status: DecisionStatus::Swap,
                    reason: Some(DecisionReason::OverVolume),
                    swap_candidates: Some(displacement_set(packed, overflow, |item| {
                        item.estimated_volume_cm3
                    })),
                };
            }
            return PackingDecision {
                status: DecisionStatus::Remove,
                reason: Some(DecisionReason::OverVolume),
                swap_candidates: None,
            };
        }
    }

    if let Some(weight) = candidate.weight_kg {
        trip.total_items_weight += weight;
    }
    if let Some(volume) = candidate.estimated_volume_cm3 {
        trip.total_items_volume += volume;
    }
    if !trip.items.contains(&candidate.item_id) {
        trip.items.push(candidate.item_id);
    }
    if !candidate.trips.contains(&trip.trip_id) {
        candidate.trips.push(trip.trip_id);
    }

    PackingDecision { status: DecisionStatus::Pack, reason: None, swap_candidates: None }
}

const CLOTHING: &[(&str, &str)] = &[
    ("Shirt", "Needed for everyday wear"),
    ("Pants", "Needed for everyday wear"),
    ("Socks", "Needed for everyday wear"),
    ("Shoes", "Needed for everyday wear"),
];

const ACCESSORIES: &[(&str, &str)] =
    &[("Sunglasses", "Needed for sunny weather"), ("Umbrella", "Needed for rainy weather")];

const TOILETRIES: &[(&str, &str)] =
    &[("Toothpaste", "Needed for oral hygiene"), ("Toothbrush", "Needed for oral hygiene")];

#[must_use]
pub fn base_items() -> Vec<RecommendedItem> {
    CLOTHING
        .iter()
        .chain(ACCESSORIES.iter())
        .chain(TOILETRIES.iter())
        .map(|(item_name, reason)| RecommendedItem::with_reason(item_name, reason))
        .collect()
}

#[must_use]
pub fn work_items(activities: Option<&str>) -> Vec<RecommendedItem> {
    let is_work = activities.is_some_and(|activities| activities.to_lowercase().contains("work"));
    if !is_work {
        return Vec::new();
    }
    vec![
        RecommendedItem::with_reason("Laptop", "Needed for work"),
        RecommendedItem::with_reason("Laptop Charger", "Needed for work"),
    ]
}

#[must_use]
pub fn weather_items(lowest_temp: Option<f64>) -> Vec<RecommendedItem> {
    match lowest_temp {
        Some(temp) if temp < 10.0 => {
            vec![RecommendedItem::with_reason("Coat", "Needed for cold weather")]
        }
        _ => Vec::new(),
    }
}

/// Compose the baseline checklist for a trip: base items first, then work
/// items, then weather items. Rules are additive; none removes what another
/// added.
#[must_use]
pub fn baseline_list(trip: &Trip) -> Vec<RecommendedItem> {
    let mut recommendations = base_items();
    recommendations.extend(work_items(trip.activities.as_deref()));
    recommendations.extend(weather_items(trip.lowest_temp));
    recommendations
}

fn deserialize_explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial item update. An omitted field is left alone; an explicit `null`
/// clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub weight_kg: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub estimated_volume_cm3: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub detection: Option<Option<Detection>>,
}

impl ItemPatch {
    pub fn apply(self, item: &mut Item) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(weight_kg) = self.weight_kg {
            item.weight_kg = weight_kg;
        }
        if let Some(estimated_volume_cm3) = self.estimated_volume_cm3 {
            item.estimated_volume_cm3 = estimated_volume_cm3;
        }
        if let Some(detection) = self.detection {
            item.detection = detection;
        }
    }
}

/// Partial trip update. Membership and cached totals are derived state and
/// deliberately not patchable; they move only through the registries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub destination: Option<String>,
    pub duration_days: Option<i64>,
    pub doing_laundry: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub activities: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub lowest_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub highest_temp: Option<Option<f64>>,
}

impl TripPatch {
    pub fn apply(self, trip: &mut Trip) {
        if let Some(destination) = self.destination {
            trip.destination = destination;
        }
        if let Some(duration_days) = self.duration_days {
            trip.duration_days = duration_days;
        }
        if let Some(doing_laundry) = self.doing_laundry {
            trip.doing_laundry = doing_laundry;
        }
        if let Some(activities) = self.activities {
            trip.activities = activities;
        }
        if let Some(lowest_temp) = self.lowest_temp {
            trip.lowest_temp = lowest_temp;
        }
        if let Some(highest_temp) = self.highest_temp {
            trip.highest_temp = highest_temp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected_item(name: &str, weight: Option<f64>, volume: Option<f64>) -> Item {
        let mut item = Item::new();
        item.weight_kg = weight;
        item.estimated_volume_cm3 = volume;
        item.detection = Some(Detection {
            item_name: name.to_string(),
            class_name: "generic".to_string(),
            confidence: 0.99,
            bounding_boxes: vec![BoundingBox { x_min: 0.0, y_min: 0.0, x_max: 10.0, y_max: 10.0 }],
            dimensions: Some(Dimensions { length: 10.0, width: 10.0, height: Some(1.0) }),
        });
        item
    }

    fn leisure_trip() -> Trip {
        Trip::new("Paris", 5, false)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn importance_scoring_follows_table_and_caches() {
        let trip = leisure_trip();

        let mut toothbrush = detected_item("Toothbrush", Some(0.1), None);
        assert_eq!(item_importance(&mut toothbrush, &trip), 90);
        assert_eq!(toothbrush.importance, Some(90));

        let mut snack = detected_item("Snack", Some(0.2), None);
        assert_eq!(item_importance(&mut snack, &trip), 20);

        let mut unknown = detected_item("Lava Lamp", Some(1.0), None);
        assert_eq!(item_importance(&mut unknown, &trip), 0);
    }

    #[test]
    fn importance_prefers_detected_name_over_manual_label() {
        let trip = leisure_trip();
        let mut item = detected_item("Toothbrush", None, None);
        item.name = Some("mystery box".to_string());
        assert_eq!(item_importance(&mut item, &trip), 90);
    }

    #[test]
    fn importance_falls_back_to_manual_name_without_detection() {
        let trip = leisure_trip();
        let mut item = Item::new();
        item.name = Some("Socks".to_string());
        assert_eq!(item_importance(&mut item, &trip), 95);

        let mut unnamed = Item::new();
        assert_eq!(item_importance(&mut unnamed, &trip), 0);
    }

    #[test]
    fn laptop_importance_depends_on_work_context() {
        let mut laptop = detected_item("Laptop", Some(1.0), None);

        let mut beach = Trip::new("Beach", 3, false);
        beach.activities = Some("Relaxing".to_string());
        assert_eq!(item_importance(&mut laptop, &beach), 0);

        let mut conference = Trip::new("Conf", 3, false);
        conference.activities = Some("Business Work".to_string());
        assert_eq!(item_importance(&mut laptop, &conference), 80);
    }

    #[test]
    fn pack_happy_path_commits_into_trip() {
        let mut trip = leisure_trip();
        let mut packed: Vec<Item> = Vec::new();
        let mut socks = detected_item("Socks", Some(0.1), Some(100.0));

        let decision =
            packing_decision(&mut socks, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Pack);
        assert_eq!(decision.reason, None);
        assert_eq!(decision.swap_candidates, None);
        assert_close(trip.total_items_weight, 0.1);
        assert_close(trip.total_items_volume, 100.0);
        assert!(trip.items.contains(&socks.item_id));
        assert!(socks.trips.contains(&trip.trip_id));
    }

    #[test]
    fn overweight_low_importance_candidate_is_removed() {
        let mut trip = Trip::new("Space", 1, false);
        trip.total_items_weight = 19.9;

        let mut packed = vec![detected_item("Toothbrush", Some(0.1), None)];
        let mut snack = detected_item("Snack", Some(0.5), None);

        let decision =
            packing_decision(&mut snack, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Remove);
        assert_eq!(decision.reason, Some(DecisionReason::Overweight));
        assert_eq!(decision.swap_candidates, None);
        assert_close(trip.total_items_weight, 19.9);
        assert!(trip.items.is_empty());
    }

    #[test]
    fn overweight_high_importance_candidate_swaps_out_least_important() {
        let mut trip = Trip::new("Office", 1, false);
        trip.activities = Some("Work".to_string());
        trip.total_items_weight = 19.5;

        let snack = detected_item("Snack", Some(2.0), None);
        let snack_id = snack.item_id;
        let mut packed = vec![snack];
        let mut laptop = detected_item("Laptop", Some(1.0), None);

        let decision =
            packing_decision(&mut laptop, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Swap);
        assert_eq!(decision.reason, Some(DecisionReason::Overweight));
        let candidates = decision.swap_candidates.unwrap_or_default();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_id, snack_id);
        assert_close(trip.total_items_weight, 19.5);
    }

    #[test]
    fn equal_importance_is_not_enough_to_swap() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_weight = 19.9;

        let mut packed = vec![detected_item("Snack", Some(1.0), None)];
        let mut candidate = detected_item("Water Bottle", Some(0.5), None);

        let decision =
            packing_decision(&mut candidate, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Remove);
        assert_eq!(decision.reason, Some(DecisionReason::Overweight));
    }

    #[test]
    fn missing_weight_never_triggers_the_weight_check() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_weight = 19.9;

        let mut packed: Vec<Item> = Vec::new();
        let mut weightless = detected_item("Coat", None, Some(500.0));

        let decision =
            packing_decision(&mut weightless, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Pack);
        assert_close(trip.total_items_weight, 19.9);
        assert_close(trip.total_items_volume, 500.0);
    }

    #[test]
    fn volume_check_runs_only_after_weight_passes() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_volume = 39_950.0;

        let mut packed = vec![detected_item("Toothbrush", Some(0.1), Some(10.0))];
        let mut bulky = detected_item("Snack", Some(0.1), Some(100.0));

        let decision =
            packing_decision(&mut bulky, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Remove);
        assert_eq!(decision.reason, Some(DecisionReason::OverVolume));
    }

    #[test]
    fn volume_swap_lists_displaced_items() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_volume = 39_950.0;

        let bottle = detected_item("Water Bottle", Some(0.1), Some(800.0));
        let bottle_id = bottle.item_id;
        let mut packed = vec![bottle];
        let mut shirt = detected_item("Shirt", Some(0.1), Some(100.0));

        let decision =
            packing_decision(&mut shirt, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Swap);
        assert_eq!(decision.reason, Some(DecisionReason::OverVolume));
        let candidates = decision.swap_candidates.unwrap_or_default();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_id, bottle_id);
    }

    #[test]
    fn greedy_displacement_may_over_evict() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_weight = 19.0;

        let light_snack = detected_item("Snack", Some(1.0), None);
        let heavy_bottle = detected_item("Water Bottle", Some(5.0), None);
        let light_id = light_snack.item_id;
        let heavy_id = heavy_bottle.item_id;
        let mut packed = vec![light_snack, heavy_bottle];
        let mut toothbrush = detected_item("Toothbrush", Some(2.5), None);

        let decision =
            packing_decision(&mut toothbrush, &mut trip, &mut packed, &PackingLimits::default());

        // Overflow is 1.5 kg. The 1.0 kg snack alone is not enough, so the
        // greedy pass also pulls in the 5.0 kg bottle even though the bottle
        // alone would have covered it.
        assert_eq!(decision.status, DecisionStatus::Swap);
        let candidates = decision.swap_candidates.unwrap_or_default();
        let ids: Vec<ItemId> = candidates.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![light_id, heavy_id]);
    }

    #[test]
    fn displacement_ties_preserve_packed_order() {
        let mut trip = Trip::new("Anywhere", 2, false);
        trip.total_items_weight = 19.9;

        let first = detected_item("Snack", Some(0.1), None);
        let second = detected_item("Water Bottle", Some(0.1), None);
        let first_id = first.item_id;
        let second_id = second.item_id;
        let mut packed = vec![first, second];
        let mut coat = detected_item("Coat", Some(1.0), None);

        let decision =
            packing_decision(&mut coat, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Swap);
        let candidates = decision.swap_candidates.unwrap_or_default();
        let ids: Vec<ItemId> = candidates.iter().map(|item| item.item_id).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }

    #[test]
    fn empty_trip_first_item_packs() {
        let mut trip = Trip::new("Void", 1, false);
        let mut packed: Vec<Item> = Vec::new();
        let mut coat = detected_item("Coat", Some(1.0), Some(200.0));

        let decision =
            packing_decision(&mut coat, &mut trip, &mut packed, &PackingLimits::default());

        assert_eq!(decision.status, DecisionStatus::Pack);
        assert_close(trip.total_items_weight, 1.0);
        assert_eq!(trip.items, vec![coat.item_id]);
    }

    #[test]
    fn base_items_cover_all_three_groups() {
        let items = base_items();
        assert_eq!(items.len(), CLOTHING.len() + ACCESSORIES.len() + TOILETRIES.len());

        let names: Vec<&str> = items.iter().map(|item| item.item_name.as_str()).collect();
        assert!(names.contains(&"Shirt"));
        assert!(names.contains(&"Sunglasses"));
        assert!(names.contains(&"Toothbrush"));
    }

    #[test]
    fn work_items_require_work_activities() {
        let names: Vec<String> = work_items(Some("Business Work"))
            .into_iter()
            .map(|item| item.item_name)
            .collect();
        assert_eq!(names, vec!["Laptop".to_string(), "Laptop Charger".to_string()]);

        assert!(work_items(Some("Relaxing at the beach")).is_empty());
        assert!(work_items(None).is_empty());
    }

    #[test]
    fn weather_items_trigger_below_ten_degrees() {
        let cold = weather_items(Some(5.0));
        assert_eq!(cold.len(), 1);
        assert_eq!(cold[0].item_name, "Coat");

        assert!(weather_items(Some(25.0)).is_empty());
        assert!(weather_items(None).is_empty());
    }

    #[test]
    fn baseline_list_composes_rules_in_order() {
        let mut trip = Trip::new("New York", 4, false);
        trip.activities = Some("Work Conference".to_string());
        trip.lowest_temp = Some(0.0);

        let results = baseline_list(&trip);
        let names: Vec<&str> = results.iter().map(|item| item.item_name.as_str()).collect();

        assert!(names.contains(&"Socks"));
        assert!(names.contains(&"Toothpaste"));
        assert!(names.contains(&"Laptop"));
        assert!(names.contains(&"Coat"));

        let expected = CLOTHING.len() + ACCESSORIES.len() + TOILETRIES.len() + 2 + 1;
        assert_eq!(results.len(), expected);

        // Base items come first, weather items last.
        assert_eq!(names[0], "Shirt");
        assert_eq!(names[names.len() - 1], "Coat");
    }

    #[test]
    fn bounding_box_rejects_inverted_coordinates() {
        let valid = BoundingBox { x_min: 10.0, y_min: 20.0, x_max: 50.0, y_max: 80.0 };
        assert!(valid.validate().is_ok());

        let negative = BoundingBox { x_min: -10.0, y_min: -20.0, x_max: 10.0, y_max: 20.0 };
        assert!(negative.validate().is_ok());

        let flat = BoundingBox { x_min: 10.0, y_min: 20.0, x_max: 10.0, y_max: 80.0 };
        assert!(matches!(flat.validate(), Err(KernelError::Validation(_))));

        let inverted = BoundingBox { x_min: 10.0, y_min: 80.0, x_max: 50.0, y_max: 20.0 };
        assert!(matches!(inverted.validate(), Err(KernelError::Validation(_))));
    }

    #[test]
    fn dimensions_default_height_counts_as_one() {
        let flat = Dimensions { length: 10.0, width: 4.0, height: None };
        assert_close(flat.volume_cm3(), 40.0);

        let tall = Dimensions { length: 10.0, width: 4.0, height: Some(2.5) };
        assert_close(tall.volume_cm3(), 100.0);
    }

    #[test]
    fn detection_validation_rejects_implausible_data() {
        let mut detection = Detection {
            item_name: "Water Bottle".to_string(),
            class_name: "bottle".to_string(),
            confidence: 0.92,
            bounding_boxes: vec![BoundingBox {
                x_min: 120.5,
                y_min: 80.2,
                x_max: 300.1,
                y_max: 600.9,
            }],
            dimensions: Some(Dimensions { length: 1.0, width: 1.0, height: None }),
        };
        assert!(detection.validate().is_ok());

        detection.confidence = 1.2;
        assert!(matches!(detection.validate(), Err(KernelError::Validation(_))));

        detection.confidence = 0.92;
        detection.bounding_boxes.clear();
        assert!(matches!(detection.validate(), Err(KernelError::Validation(_))));
    }

    #[test]
    fn item_validation_rejects_negative_measurements() {
        let mut item = Item::new();
        item.weight_kg = Some(-1.0);
        assert!(matches!(item.validate(), Err(KernelError::Validation(_))));

        item.weight_kg = Some(1.0);
        item.estimated_volume_cm3 = Some(f64::NAN);
        assert!(matches!(item.validate(), Err(KernelError::Validation(_))));
    }

    #[test]
    fn trip_validation_enforces_destination_and_duration() {
        let empty_destination = Trip::new("  ", 3, false);
        assert!(matches!(empty_destination.validate(), Err(KernelError::Validation(_))));

        let zero_days = Trip::new("Rome", 0, false);
        assert!(matches!(zero_days.validate(), Err(KernelError::Validation(_))));

        let valid = Trip::new("Rome", 3, true);
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn item_patch_distinguishes_omitted_from_null() -> Result<(), serde_json::Error> {
        let mut item = Item::new();
        item.weight_kg = Some(1.5);
        item.name = Some("Shirt".to_string());

        let patch: ItemPatch = serde_json::from_str(r#"{"weight_kg": null}"#)?;
        patch.apply(&mut item);

        assert_eq!(item.weight_kg, None);
        assert_eq!(item.name, Some("Shirt".to_string()));

        let patch: ItemPatch = serde_json::from_str(r#"{"weight_kg": 2.0}"#)?;
        patch.apply(&mut item);
        assert_eq!(item.weight_kg, Some(2.0));

        Ok(())
    }

    #[test]
    fn trip_patch_keeps_unmentioned_fields() -> Result<(), serde_json::Error> {
        let mut trip = Trip::new("Tokyo", 5, false);
        trip.items = vec![ItemId::new(), ItemId::new()];

        let patch: TripPatch = serde_json::from_str(
            r#"{"destination": "Kyoto", "duration_days": 7, "doing_laundry": true}"#,
        )?;
        patch.apply(&mut trip);

        assert_eq!(trip.destination, "Kyoto");
        assert_eq!(trip.duration_days, 7);
        assert!(trip.doing_laundry);
        assert_eq!(trip.items.len(), 2);

        Ok(())
    }

    #[test]
    fn decision_wire_names_are_stable() -> Result<(), serde_json::Error> {
        let decision = PackingDecision {
            status: DecisionStatus::Swap,
            reason: Some(DecisionReason::OverVolume),
            swap_candidates: Some(Vec::new()),
        };
        let encoded = serde_json::to_value(&decision)?;
        assert_eq!(encoded["status"], "swap");
        assert_eq!(encoded["reason"], "over_volume");
        Ok(())
    }
}
