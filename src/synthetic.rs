//! Synthetic walks for stress testing and benchmarking.
//!
//! Generates deterministic fix sequences along a polyline with Gaussian GPS
//! noise, plus helpers to lay out test routes from turn/length legs.
//!
//! Feature-gated behind `synthetic`; not included in production builds.
//!
//! # Example
//!
//! ```rust
//! use stridepath::GeoPoint;
//! use stridepath::synthetic::{WalkScenario, polyline_from_legs};
//!
//! let polyline = polyline_from_legs(GeoPoint::new(47.37, 8.55), 90.0, &[(0.0, 300.0), (90.0, 200.0)]);
//! let walk = WalkScenario::along(polyline).with_noise(3.0).with_seed(42);
//! let fixes = walk.generate();
//! assert!(fixes.len() > 100);
//! ```

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo_utils::{haversine_distance, initial_bearing, interpolate, point_ahead};
use crate::{GeoPoint, GpsFix};

/// Configuration of a synthetic walk along a polyline.
#[derive(Debug, Clone)]
pub struct WalkScenario {
    /// Path to walk.
    pub polyline: Vec<GeoPoint>,
    /// Distance between consecutive fixes in meters.
    pub step_meters: f64,
    /// Reported walking speed in m/s (also sets the fix interval).
    pub speed_mps: f64,
    /// GPS noise standard deviation in meters.
    pub noise_sigma_meters: f64,
    /// Reported accuracy radius in meters.
    pub accuracy: f64,
    /// Timestamp of the first fix (epoch ms).
    pub start_ms: u64,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

impl WalkScenario {
    /// Noise-free walk at 1.4 m/s with a fix every 5 meters.
    pub fn along(polyline: Vec<GeoPoint>) -> Self {
        Self {
            polyline,
            step_meters: 5.0,
            speed_mps: 1.4,
            noise_sigma_meters: 0.0,
            accuracy: 5.0,
            start_ms: 0,
            seed: 0,
        }
    }

    pub fn with_noise(mut self, sigma_meters: f64) -> Self {
        self.noise_sigma_meters = sigma_meters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_step(mut self, step_meters: f64) -> Self {
        self.step_meters = step_meters;
        self
    }

    /// Milliseconds between fixes implied by step and speed.
    pub fn interval_ms(&self) -> u64 {
        if self.speed_mps <= 0.0 {
            return 1000;
        }
        (self.step_meters / self.speed_mps * 1000.0).round() as u64
    }

    /// Generate the fixes, ending exactly on the last polyline point.
    pub fn generate(&self) -> Vec<GpsFix> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let interval = self.interval_ms();

        sample_along(&self.polyline, self.step_meters)
            .into_iter()
            .enumerate()
            .map(|(i, (point, heading))| {
                let noisy = add_gps_noise(&point, self.noise_sigma_meters, &mut rng);
                let mut fix = GpsFix::at(noisy, self.start_ms + i as u64 * interval)
                    .with_accuracy(self.accuracy)
                    .with_speed(self.speed_mps);
                if let Some(h) = heading {
                    fix = fix.with_heading(h);
                }
                fix
            })
            .collect()
    }
}

/// Points every `step` meters along a polyline, with the local direction.
fn sample_along(polyline: &[GeoPoint], step: f64) -> Vec<(GeoPoint, Option<f64>)> {
    let mut samples = Vec::new();
    if polyline.is_empty() || step <= 0.0 {
        return samples;
    }

    let mut carried = 0.0;
    for segment in polyline.windows(2) {
        let (a, b) = (&segment[0], &segment[1]);
        let length = haversine_distance(a, b);
        let heading = initial_bearing(a, b);
        let mut along = carried;
        while along < length {
            samples.push((interpolate(a, b, along / length), heading));
            along += step;
        }
        carried = along - length;
    }

    let last = polyline[polyline.len() - 1];
    let heading = samples.last().and_then(|(_, h)| *h);
    samples.push((last, heading));
    samples
}

/// Lay out a polyline from `(turn_degrees, length_meters)` legs.
///
/// The first leg starts at `origin` heading `initial_bearing`; each leg turns
/// by its angle (positive = right) before walking its length.
pub fn polyline_from_legs(origin: GeoPoint, initial_bearing: f64, legs: &[(f64, f64)]) -> Vec<GeoPoint> {
    let mut points = vec![origin];
    let mut heading = initial_bearing;
    let mut current = origin;
    for &(turn, length) in legs {
        heading = (heading + turn).rem_euclid(360.0);
        current = point_ahead(&current, heading, length);
        points.push(current);
    }
    points
}

/// Shift fixes sideways by `meters` towards `bearing` (simulates a detour).
pub fn offset_fixes(fixes: &[GpsFix], bearing: f64, meters: f64) -> Vec<GpsFix> {
    fixes
        .iter()
        .map(|f| GpsFix {
            point: point_ahead(&f.point, bearing, meters),
            ..*f
        })
        .collect()
}

/// Add Gaussian GPS noise to a point.
fn add_gps_noise(p: &GeoPoint, sigma_meters: f64, rng: &mut StdRng) -> GeoPoint {
    if sigma_meters <= 0.0 {
        return *p;
    }

    // Box-Muller transform: radial offset in a uniformly random direction
    let u1: f64 = rng.gen_range(0.0001..1.0);
    let u2: f64 = rng.r#gen();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    let z1 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin();

    let north = point_ahead(p, 0.0, z0 * sigma_meters);
    point_ahead(&north, 90.0, z1 * sigma_meters)
}
