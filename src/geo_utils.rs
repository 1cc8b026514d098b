//! Geodesic helpers on a spherical Earth.
//!
//! Every function here is total: degenerate input produces a documented
//! sentinel (`f64::INFINITY` for distances, `None` or `0.0` for bearings)
//! instead of panicking. Callers must treat an infinite distance as
//! "cannot compare", never as a real measurement.

use serde::Serialize;

use crate::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (approximately constant).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Great-circle distance between two points using the haversine formula.
///
/// Returns `f64::INFINITY` when either point has a NaN or infinite coordinate.
///
/// # Example
/// ```
/// use stridepath::GeoPoint;
/// use stridepath::geo_utils::haversine_distance;
///
/// let a = GeoPoint::new(0.0, 0.0);
/// let b = GeoPoint::new(0.0, 0.001);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 111.19).abs() < 0.1);
/// ```
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if !is_finite(a) || !is_finite(b) {
        return f64::INFINITY;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` towards `b` in degrees `[0, 360)`, 0 = north.
///
/// `None` when either point is not finite or the points coincide, since no
/// direction exists in those cases.
pub fn initial_bearing(a: &GeoPoint, b: &GeoPoint) -> Option<f64> {
    if !is_finite(a) || !is_finite(b) || a == b {
        return None;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    Some(normalize_bearing(y.atan2(x).to_degrees()))
}

/// Initial bearing with the degenerate case collapsed to `0.0`.
///
/// A result of `0.0` is ambiguous (due north or no direction at all); prefer
/// [`initial_bearing`] wherever the distinction matters.
pub fn bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    initial_bearing(a, b).unwrap_or(0.0)
}

/// Fold any angle in degrees into `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let b = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if b >= 360.0 { 0.0 } else { b }
}

/// Signed change of direction from `from` to `to`, in `(-180, 180]`.
/// Positive values turn right.
pub fn bearing_delta(from: f64, to: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Result of matching a point against a polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolylineMatch {
    /// Index of the segment start point (segment `i` joins points `i` and `i + 1`).
    pub segment_index: usize,
    /// Distance from the query point to `point`, in meters.
    pub distance: f64,
    /// Closest point on the polyline.
    pub point: GeoPoint,
    /// Position of `point` along the segment, 0.0 at its start and 1.0 at its end.
    pub fraction: f64,
}

impl PolylineMatch {
    fn unmatched(p: &GeoPoint) -> Self {
        Self {
            segment_index: 0,
            distance: f64::INFINITY,
            point: *p,
            fraction: 0.0,
        }
    }
}

/// Find the closest point of a polyline to `p`.
///
/// Linear scan over consecutive segments. When the perpendicular foot of `p`
/// lies within a segment the perpendicular distance is used (triangle height
/// via Heron's formula on haversine side lengths), otherwise the distance to
/// the nearer endpoint. Ties keep the earliest segment.
///
/// A single-point polyline matches that point; an empty polyline or an
/// invalid query point yields an infinite distance.
pub fn nearest_point_on_polyline(p: &GeoPoint, polyline: &[GeoPoint]) -> PolylineMatch {
    if !is_finite(p) {
        return PolylineMatch::unmatched(p);
    }

    match polyline {
        [] => PolylineMatch::unmatched(p),
        [only] => PolylineMatch {
            segment_index: 0,
            distance: haversine_distance(p, only),
            point: *only,
            fraction: 0.0,
        },
        _ => {
            let mut best = PolylineMatch::unmatched(p);
            for (i, segment) in polyline.windows(2).enumerate() {
                let candidate = match_segment(p, &segment[0], &segment[1], i);
                if candidate.distance < best.distance {
                    best = candidate;
                }
            }
            best
        }
    }
}

/// Closest point of segment `a`-`b` to `p`.
fn match_segment(p: &GeoPoint, a: &GeoPoint, b: &GeoPoint, index: usize) -> PolylineMatch {
    let da = haversine_distance(p, a);
    let db = haversine_distance(p, b);
    let len = haversine_distance(a, b);

    let endpoint = |use_start: bool| PolylineMatch {
        segment_index: index,
        distance: if use_start { da } else { db },
        point: if use_start { *a } else { *b },
        fraction: if use_start { 0.0 } else { 1.0 },
    };

    if !len.is_finite() || !da.is_finite() || !db.is_finite() {
        return PolylineMatch::unmatched(p);
    }
    if len < 1e-9 {
        return endpoint(true);
    }

    // Foot of the perpendicular falls outside the segment when the angle
    // at either endpoint is obtuse.
    let (da2, db2, len2) = (da * da, db * db, len * len);
    if da2 > db2 + len2 || db2 > da2 + len2 {
        return endpoint(da <= db);
    }

    let s = (da + db + len) / 2.0;
    let area = (s * (s - da) * (s - db) * (s - len)).max(0.0).sqrt();
    let height = 2.0 * area / len;
    let along = (da2 - height * height).max(0.0).sqrt();
    let fraction = (along / len).clamp(0.0, 1.0);

    PolylineMatch {
        segment_index: index,
        distance: height.min(da).min(db),
        point: interpolate(a, b, fraction),
        fraction,
    }
}

/// Linear interpolation between two points (adequate for short segments).
pub fn interpolate(a: &GeoPoint, b: &GeoPoint, fraction: f64) -> GeoPoint {
    GeoPoint::new(
        a.latitude + fraction * (b.latitude - a.latitude),
        a.longitude + fraction * (b.longitude - a.longitude),
    )
}

/// Project `p` forward along a great circle by `meters` at `bearing_deg`.
///
/// Invalid input returns `p` unchanged.
pub fn point_ahead(p: &GeoPoint, bearing_deg: f64, meters: f64) -> GeoPoint {
    if !p.is_valid() || !bearing_deg.is_finite() || !meters.is_finite() {
        return *p;
    }

    let delta = meters / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = p.latitude.to_radians();
    let lon1 = p.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let longitude = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    GeoPoint::new(lat2.to_degrees(), longitude)
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert a distance in meters to approximate degrees at the given latitude.
///
/// Uses the longitude scale, which is the larger of the two away from the equator.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_deg = METERS_PER_DEG_LAT * latitude.to_radians().cos();
    if meters_per_deg.abs() < 1e-10 {
        return meters / METERS_PER_DEG_LAT;
    }
    meters / meters_per_deg
}

fn is_finite(p: &GeoPoint) -> bool {
    p.latitude.is_finite() && p.longitude.is_finite()
}
