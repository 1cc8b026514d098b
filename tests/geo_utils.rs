//! Tests for geo_utils module

use stridepath::GeoPoint;
use stridepath::geo_utils::*;

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Meters per degree on the equator for the 6,371 km sphere.
const M_PER_DEG: f64 = 111_194.93;

#[test]
fn test_haversine_distance_same_point() {
    let p = GeoPoint::new(51.5074, -0.1278);
    assert_eq!(haversine_distance(&p, &p), 0.0);
}

#[test]
fn test_haversine_distance_known_value() {
    // London to Paris is approximately 344 km
    let london = GeoPoint::new(51.5074, -0.1278);
    let paris = GeoPoint::new(48.8566, 2.3522);
    let dist = haversine_distance(&london, &paris);
    assert!(approx_eq(dist, 343_560.0, 5000.0)); // Within 5km
}

#[test]
fn test_haversine_distance_symmetric() {
    let pairs = [
        (GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.002)),
        (GeoPoint::new(51.5074, -0.1278), GeoPoint::new(40.7128, -74.006)),
        (GeoPoint::new(-33.86, 151.21), GeoPoint::new(35.68, 139.69)),
        (GeoPoint::new(89.9, 0.0), GeoPoint::new(89.9, 180.0)),
    ];
    for (a, b) in pairs {
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }
}

#[test]
fn test_haversine_distance_nan_is_infinite() {
    let a = GeoPoint::new(f64::NAN, 0.0);
    let b = GeoPoint::new(0.0, 0.0);
    assert_eq!(haversine_distance(&a, &b), f64::INFINITY);
    assert_eq!(haversine_distance(&b, &a), f64::INFINITY);
}

#[test]
fn test_bearing_cardinal_directions() {
    let origin = GeoPoint::new(0.0, 0.0);
    assert!(approx_eq(bearing(&origin, &GeoPoint::new(1.0, 0.0)), 0.0, 0.01));
    assert!(approx_eq(bearing(&origin, &GeoPoint::new(0.0, 1.0)), 90.0, 0.01));
    assert!(approx_eq(bearing(&origin, &GeoPoint::new(-1.0, 0.0)), 180.0, 0.01));
    assert!(approx_eq(bearing(&origin, &GeoPoint::new(0.0, -1.0)), 270.0, 0.01));
}

#[test]
fn test_bearing_always_in_range() {
    let points = [
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(10.0, -170.0),
        GeoPoint::new(-45.0, 179.9),
        GeoPoint::new(60.0, 30.0),
        GeoPoint::new(-0.0001, -0.0001),
    ];
    for a in &points {
        for b in &points {
            let deg = bearing(a, b);
            assert!((0.0..360.0).contains(&deg), "bearing {deg} out of range");
        }
    }
}

#[test]
fn test_bearing_degenerate_input() {
    let p = GeoPoint::new(48.2, 16.37);
    assert_eq!(bearing(&p, &p), 0.0);
    assert_eq!(initial_bearing(&p, &p), None);
    assert_eq!(initial_bearing(&GeoPoint::new(f64::NAN, 0.0), &p), None);
    assert_eq!(bearing(&GeoPoint::new(f64::NAN, 0.0), &p), 0.0);
}

#[test]
fn test_bearing_delta_signs() {
    assert!(approx_eq(bearing_delta(0.0, 90.0), 90.0, 1e-9));
    assert!(approx_eq(bearing_delta(90.0, 0.0), -90.0, 1e-9));
    assert!(approx_eq(bearing_delta(350.0, 10.0), 20.0, 1e-9));
    assert!(approx_eq(bearing_delta(10.0, 350.0), -20.0, 1e-9));
    assert!(approx_eq(bearing_delta(0.0, 180.0), 180.0, 1e-9));
}

#[test]
fn test_nearest_point_perpendicular() {
    let polyline = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)];
    let p = GeoPoint::new(80.0 / M_PER_DEG, 0.005);

    let m = nearest_point_on_polyline(&p, &polyline);
    assert_eq!(m.segment_index, 0);
    assert!(approx_eq(m.distance, 80.0, 0.5), "got {}", m.distance);
    assert!(approx_eq(m.point.longitude, 0.005, 1e-5));
    assert!(approx_eq(m.fraction, 0.5, 0.01));
}

#[test]
fn test_nearest_point_beyond_segment_end() {
    let polyline = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)];
    // 0.0005 deg past the end, on the same line
    let p = GeoPoint::new(0.0, 0.0015);

    let m = nearest_point_on_polyline(&p, &polyline);
    assert_eq!(m.point, polyline[1]);
    assert_eq!(m.fraction, 1.0);
    assert!(approx_eq(m.distance, 0.0005 * M_PER_DEG, 0.1));
}

#[test]
fn test_nearest_point_picks_closest_segment() {
    // L-shaped: east then north
    let polyline = vec![
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 0.01),
        GeoPoint::new(0.01, 0.01),
    ];
    let p = GeoPoint::new(0.005, 0.0101);

    let m = nearest_point_on_polyline(&p, &polyline);
    assert_eq!(m.segment_index, 1);
    assert!(approx_eq(m.distance, 0.0001 * M_PER_DEG, 0.5));
}

#[test]
fn test_nearest_point_ties_keep_earliest_segment() {
    // On the vertex shared by both segments: both are at distance zero
    let polyline = vec![
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 0.001),
        GeoPoint::new(0.001, 0.001),
    ];
    let p = GeoPoint::new(0.0, 0.001);

    let m = nearest_point_on_polyline(&p, &polyline);
    assert_eq!(m.segment_index, 0);
    assert_eq!(m.distance, 0.0);
}

#[test]
fn test_nearest_point_degenerate_inputs() {
    let p = GeoPoint::new(0.0, 0.0);

    assert_eq!(nearest_point_on_polyline(&p, &[]).distance, f64::INFINITY);

    let single = [GeoPoint::new(0.0, 0.001)];
    let m = nearest_point_on_polyline(&p, &single);
    assert!(approx_eq(m.distance, 0.001 * M_PER_DEG, 0.1));

    let nan = GeoPoint::new(f64::NAN, 0.0);
    let line = [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)];
    assert_eq!(nearest_point_on_polyline(&nan, &line).distance, f64::INFINITY);

    // Zero-length segment behaves like a point
    let stacked = [GeoPoint::new(0.0, 0.001), GeoPoint::new(0.0, 0.001)];
    let m = nearest_point_on_polyline(&p, &stacked);
    assert!(approx_eq(m.distance, 0.001 * M_PER_DEG, 0.1));
}

#[test]
fn test_point_ahead_round_trip() {
    let start = GeoPoint::new(51.5074, -0.1278);
    for bearing_deg in [0.0, 45.0, 90.0, 200.0, 315.0] {
        let ahead = point_ahead(&start, bearing_deg, 250.0);
        assert!(approx_eq(haversine_distance(&start, &ahead), 250.0, 0.01));
        let back = bearing(&start, &ahead);
        assert!(approx_eq(bearing_delta(bearing_deg, back), 0.0, 0.01));
    }
}

#[test]
fn test_point_ahead_invalid_input_returns_origin() {
    let start = GeoPoint::new(10.0, 10.0);
    assert_eq!(point_ahead(&start, f64::NAN, 100.0), start);
    assert_eq!(point_ahead(&start, 90.0, f64::INFINITY), start);
}

#[test]
fn test_point_ahead_wraps_antimeridian() {
    let start = GeoPoint::new(0.0, 179.9995);
    let ahead = point_ahead(&start, 90.0, 200.0);
    assert!(ahead.is_valid());
    assert!(ahead.longitude < 0.0);
}

#[test]
fn test_polyline_length() {
    let line = vec![
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 0.001),
        GeoPoint::new(0.0, 0.002),
    ];
    assert!(approx_eq(polyline_length(&line), 0.002 * M_PER_DEG, 0.1));
    assert_eq!(polyline_length(&line[..1]), 0.0);
}

#[test]
fn test_meters_to_degrees() {
    // At equator, 111km = 1 degree
    let deg = meters_to_degrees(111_320.0, 0.0);
    assert!(approx_eq(deg, 1.0, 0.01));

    // At higher latitude, same distance = more degrees
    let deg_45 = meters_to_degrees(111_320.0, 45.0);
    assert!(deg_45 > 1.0);
}
