//! # Stridepath
//!
//! Real-time turn-by-turn guidance engine for pedestrian navigation.
//!
//! This library follows a pedestrian along a previously computed route:
//! - Geodesic math (haversine distance, bearing, nearest point on polyline)
//! - Route model with precomputed per-instruction distances
//! - Navigation session state machine
//! - Per-fix pipeline: debounce, step advancement, arrival, progress,
//!   turn-approach tiers and deviation detection
//! - Recalculation coordinator with at most one attempt in flight
//! - Single-consumer engine loop that keeps guiding while a new route is fetched
//!
//! ## Features
//!
//! - **`synthetic`** - Deterministic synthetic walks for tests and benchmarks
//! - **`cli`** - Replay/debug command line tool (`stridepath-cli`)
//!
//! ## Quick Start
//!
//! ```rust
//! use stridepath::{
//!     GeoPoint, GpsFix, GuidanceConfig, ManeuverType, NavigationSession,
//!     PositionUpdateProcessor, RouteInstruction, RouteModel, ManualClock,
//! };
//!
//! let polyline = vec![
//!     GeoPoint::new(0.0, 0.0),
//!     GeoPoint::new(0.0, 0.001),
//!     GeoPoint::new(0.0, 0.002),
//! ];
//! let instructions = vec![
//!     RouteInstruction::new(0, polyline[0], "Head east", ManeuverType::Depart, 111.2, 80.0),
//!     RouteInstruction::new(1, polyline[1], "Continue", ManeuverType::Straight, 111.2, 80.0),
//!     RouteInstruction::new(2, polyline[2], "Arrive", ManeuverType::Arrive, 0.0, 0.0),
//! ];
//! let route = RouteModel::new(polyline.clone(), instructions, None).unwrap();
//!
//! let mut session = NavigationSession::new();
//! session.start(route, polyline[2]).unwrap();
//!
//! let clock = ManualClock::new(0);
//! let processor = PositionUpdateProcessor::new(GuidanceConfig::default());
//! let outcome = processor.process(&mut session, GpsFix::new(0.0, 0.00095, 0), &clock);
//! assert_eq!(session.current_step_index(), 1);
//! # let _ = outcome;
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{GuidanceError, OptionExt, Result};

// Geodesic math (distance, bearing, nearest point, projection)
pub mod geo_utils;

// Route geometry and instruction list
pub mod route;
pub use route::{ManeuverType, RouteInstruction, RouteModel};

// Time source for debounce and refresh timers
pub mod clock;
pub use clock::{ClockSource, ManualClock, SystemClock};

// Navigation session state machine
pub mod session;
pub use session::{
    ApproachTier, NavigationSession, NavigationState, SessionSnapshot, TierFlags,
};

// Per-fix pipeline
pub mod processor;
pub use processor::{FixOutcome, PositionUpdateProcessor, SessionUpdate, TierCrossing};

// Outbound guidance side effects
pub mod sink;
pub use sink::{GuidanceEventSink, NoopSink, dispatch_update};

// Recalculation coordination
pub mod recalc;
pub use recalc::{RecalcOutcome, RecalcTicket, RecalculationCoordinator, RouteProvider};

// Single-consumer engine loop
pub mod engine;
pub use engine::{GuidanceEngine, NavigationCommand};

// Synthetic walks for testing and benchmarking
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// Deserializes from `lat`/`latitude` and `lon`/`lng`/`longitude` so that
/// host payloads are normalized once, at the boundary.
///
/// # Example
/// ```
/// use stridepath::GeoPoint;
/// let point = GeoPoint::new(48.8584, 2.2945);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has finite coordinates inside the WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box over a set of points (used for overview framing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points, ignoring invalid ones.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let mut valid = points.iter().filter(|p| p.is_valid());
        let first = valid.next()?;
        let mut bounds = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lng: first.longitude,
            max_lng: first.longitude,
        };
        for p in valid {
            bounds.min_lat = bounds.min_lat.min(p.latitude);
            bounds.max_lat = bounds.max_lat.max(p.latitude);
            bounds.min_lng = bounds.min_lng.min(p.longitude);
            bounds.max_lng = bounds.max_lng.max(p.longitude);
        }
        Some(bounds)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Position Fixes
// ============================================================================

/// Why a fix was refused before entering the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Latitude or longitude absent from the payload.
    MissingCoordinate,
    /// Latitude or longitude is NaN or infinite.
    NotFinite,
    /// Latitude outside ±90 or longitude outside ±180.
    OutOfRange,
    /// Timestamp older than the last accepted fix.
    Stale,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingCoordinate => "missing_coordinate",
            RejectReason::NotFinite => "not_finite",
            RejectReason::OutOfRange => "out_of_range",
            RejectReason::Stale => "stale",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single GPS sample in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub point: GeoPoint,
    /// Horizontal accuracy radius in meters, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Direction of travel in degrees from north, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed in m/s, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

impl GpsFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: u64) -> Self {
        Self {
            point: GeoPoint::new(latitude, longitude),
            accuracy: None,
            heading: None,
            speed: None,
            timestamp,
        }
    }

    pub fn at(point: GeoPoint, timestamp: u64) -> Self {
        Self::new(point.latitude, point.longitude, timestamp)
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Check the coordinates, reporting the first problem found.
    pub fn check(&self) -> std::result::Result<(), RejectReason> {
        let GeoPoint {
            latitude,
            longitude,
        } = self.point;
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(RejectReason::NotFinite);
        }
        if !self.point.is_valid() {
            return Err(RejectReason::OutOfRange);
        }
        Ok(())
    }
}

/// Fix payload as delivered by a host (geolocation watch, test harness, file).
///
/// Field names vary between sources; aliases cover the common spellings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFix {
    #[serde(default, alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(default, alias = "lng", alias = "longitude")]
    pub lon: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl RawFix {
    /// Normalize into a canonical [`GpsFix`].
    ///
    /// `now_ms` stands in for a missing timestamp. Optional readings that are
    /// not usable (NaN, negative speed or accuracy) are dropped rather than
    /// rejecting the whole fix.
    pub fn normalize(&self, now_ms: u64) -> std::result::Result<GpsFix, RejectReason> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(RejectReason::MissingCoordinate);
        };
        let fix = GpsFix {
            point: GeoPoint::new(lat, lon),
            accuracy: self.accuracy.filter(|a| a.is_finite() && *a >= 0.0),
            heading: self.heading.filter(|h| h.is_finite()).map(|h| h.rem_euclid(360.0)),
            speed: self.speed.filter(|s| s.is_finite() && *s >= 0.0),
            timestamp: self.timestamp.unwrap_or(now_ms),
        };
        fix.check()?;
        Ok(fix)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Tuning constants for the guidance pipeline.
///
/// The defaults are empirical values for pedestrian guidance. Hosts can load
/// partial overrides from JSON; missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Distance to the destination that counts as arrival.
    /// Default: 20.0 meters
    pub arrival_radius: f64,

    /// Distance to the next instruction anchor that advances the step cursor.
    /// Default: 20.0 meters
    pub step_advance_radius: f64,

    /// Fixes closer than this to the last accepted fix are debounced.
    /// Default: 3.0 meters
    pub debounce_distance: f64,

    /// A fix is always processed once this long has passed since the last accepted update.
    /// Default: 10_000 ms
    pub force_refresh_interval_ms: u64,

    /// Turn-approach tier thresholds, least urgent first.
    /// Default: [100.0, 50.0, 20.0] meters
    pub tier_thresholds: [f64; 3],

    /// Beyond this distance the tiers of an instruction re-arm.
    /// Default: 150.0 meters
    pub tier_reset_distance: f64,

    /// Deviation threshold = multiplier * accuracy + margin.
    /// Default: 2.0
    pub deviation_accuracy_multiplier: f64,

    /// Fixed tolerance added to the deviation threshold.
    /// Default: 30.0 meters
    pub deviation_margin: f64,

    /// Accuracy assumed when a fix does not report one.
    /// Default: 15.0 meters
    pub default_accuracy: f64,

    /// Below this speed a user is stationary and never deviating.
    /// Default: 0.5 m/s
    pub stationary_speed: f64,

    /// Reported speeds inside [min, max] are trusted for time estimates.
    /// Default: 0.5 m/s
    pub min_walking_speed: f64,

    /// Default: 10.0 m/s
    pub max_walking_speed: f64,

    /// Speed used for time estimates when the reported one is missing or implausible.
    /// Default: 1.4 m/s
    pub fallback_walking_speed: f64,

    /// After a failed recalculation, wait this long before retrying while
    /// the user is still off route.
    /// Default: 15_000 ms
    pub recalculation_retry_interval_ms: u64,

    /// Profile passed to the route provider on recalculation.
    /// Default: "foot-walking"
    pub routing_profile: String,

    /// How far ahead of the user the map camera looks.
    /// Default: 30.0 meters
    pub camera_lookahead: f64,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            arrival_radius: 20.0,
            step_advance_radius: 20.0,
            debounce_distance: 3.0,
            force_refresh_interval_ms: 10_000,
            tier_thresholds: [100.0, 50.0, 20.0],
            tier_reset_distance: 150.0,
            deviation_accuracy_multiplier: 2.0,
            deviation_margin: 30.0,
            default_accuracy: 15.0,
            stationary_speed: 0.5,
            min_walking_speed: 0.5,
            max_walking_speed: 10.0,
            fallback_walking_speed: 1.4,
            recalculation_retry_interval_ms: 15_000,
            routing_profile: "foot-walking".to_string(),
            camera_lookahead: 30.0,
        }
    }
}

impl GuidanceConfig {
    /// Reject configurations the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("arrival_radius", self.arrival_radius),
            ("step_advance_radius", self.step_advance_radius),
            ("default_accuracy", self.default_accuracy),
            ("fallback_walking_speed", self.fallback_walking_speed),
            ("tier_reset_distance", self.tier_reset_distance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(GuidanceError::invalid_input(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("debounce_distance", self.debounce_distance),
            ("stationary_speed", self.stationary_speed),
            ("min_walking_speed", self.min_walking_speed),
            ("max_walking_speed", self.max_walking_speed),
            ("deviation_accuracy_multiplier", self.deviation_accuracy_multiplier),
            ("deviation_margin", self.deviation_margin),
            ("camera_lookahead", self.camera_lookahead),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(GuidanceError::invalid_input(format!(
                    "{name} must be finite and not negative, got {value}"
                )));
            }
        }

        let [t1, t2, t3] = self.tier_thresholds;
        if !(t1 > t2 && t2 > t3 && t3 > 0.0) {
            return Err(GuidanceError::invalid_input(
                "tier thresholds must be strictly decreasing and positive",
            ));
        }
        if self.tier_reset_distance <= t1 {
            return Err(GuidanceError::invalid_input(
                "tier_reset_distance must exceed the first tier threshold",
            ));
        }
        if self.min_walking_speed > self.max_walking_speed {
            return Err(GuidanceError::invalid_input(
                "min_walking_speed must not exceed max_walking_speed",
            ));
        }
        Ok(())
    }

    /// Distance from the route beyond which a fix counts as deviating.
    ///
    /// A missing, non-finite or negative accuracy counts as unreported.
    pub fn deviation_threshold(&self, accuracy: Option<f64>) -> f64 {
        let accuracy = accuracy
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or(self.default_accuracy);
        self.deviation_accuracy_multiplier * accuracy + self.deviation_margin
    }

    /// Speed used to estimate remaining time.
    pub fn effective_speed(&self, reported: Option<f64>) -> f64 {
        match reported {
            Some(s) if s >= self.min_walking_speed && s <= self.max_walking_speed => s,
            _ => self.fallback_walking_speed,
        }
    }
}
