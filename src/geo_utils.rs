//! # Geographic Utilities
//!
//! Spherical-Earth helpers shared by the walk tracker and the collectible manager.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`bearing`] | Initial bearing from one point towards another |
//! | [`destination_point`] | Point reached by travelling a distance along a bearing |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`search_envelope`] | Degree boxes guaranteed to contain a radius around a point |
//! | [`jitter`] | Random offset of a point within a degree bound |
//!
//! ## Example
//!
//! ```rust
//! use walk_engine::{GpsPoint, geo_utils};
//!
//! let start = GpsPoint::new(55.7558, 37.6173);
//! let end = GpsPoint::new(55.7559, 37.6173);
//!
//! let meters = geo_utils::haversine_distance(&start, &end);
//! assert!((meters - 11.1).abs() < 0.1);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m:
//!
//! ```text
//! a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlng/2)
//! d = 2·R·atan2(√a, √(1−a))
//! ```
//!
//! Bearing and destination are delegated to `geo`'s haversine metric space.
//! All functions expect WGS84 latitude/longitude in degrees.

use geo::{Bearing, Destination, Haversine, Point};
use rand::Rng;

use crate::{Bounds, GpsPoint};

/// Mean Earth radius used by [`haversine_distance`], in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the surface of a sphere with radius
/// [`EARTH_RADIUS_METERS`].
///
/// # Example
///
/// ```rust
/// use walk_engine::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing from `from` towards `to`, in degrees clockwise from north (0..360).
#[inline]
pub fn bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    let origin = Point::new(from.longitude, from.latitude);
    let target = Point::new(to.longitude, to.latitude);
    Haversine::bearing(origin, target).rem_euclid(360.0)
}

/// The point reached by travelling `meters` from `origin` along `bearing_degrees`.
///
/// # Example
///
/// ```rust
/// use walk_engine::{GpsPoint, geo_utils};
///
/// let user = GpsPoint::new(55.7558, 37.6173);
/// let ahead = geo_utils::destination_point(&user, 90.0, 40.0);
///
/// assert!((geo_utils::haversine_distance(&user, &ahead) - 40.0).abs() < 0.1);
/// ```
pub fn destination_point(origin: &GpsPoint, bearing_degrees: f64, meters: f64) -> GpsPoint {
    let start = Point::new(origin.longitude, origin.latitude);
    let end = Haversine::destination(start, bearing_degrees, meters);
    GpsPoint::new(end.y(), end.x())
}

/// Calculate the total length of a polyline (GPS track) in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Search and Placement
// =============================================================================

/// Slack added to envelope half-widths so rounding never excludes a point on the rim.
const ENVELOPE_PADDING_DEGREES: f64 = 1e-9;

/// Degree boxes that together contain every point within `radius_meters` of `center`.
///
/// The latitude half-width is the angular radius itself. The longitude half-width is
/// the exact extent of the spherical cap, `asin(sin(r/R) / cos(lat))`. A cap that
/// reaches a pole spans every longitude. A box that crosses the antimeridian is split
/// in two, so every returned box lies within `[-180, 180]`.
///
/// # Example
///
/// ```rust
/// use walk_engine::{GpsPoint, geo_utils};
///
/// // Near the antimeridian the search area wraps around
/// let boxes = geo_utils::search_envelope(&GpsPoint::new(-16.5, 179.9999), 50.0);
/// assert_eq!(boxes.len(), 2);
/// ```
pub fn search_envelope(center: &GpsPoint, radius_meters: f64) -> Vec<Bounds> {
    let angular = radius_meters.max(0.0) / EARTH_RADIUS_METERS;
    let d_lat = angular.to_degrees() + ENVELOPE_PADDING_DEGREES;
    let min_lat = (center.latitude - d_lat).max(-90.0);
    let max_lat = (center.latitude + d_lat).min(90.0);

    let whole_band = vec![Bounds { min_lat, max_lat, min_lng: -180.0, max_lng: 180.0 }];
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return whole_band;
    }

    let ratio = angular.sin() / center.latitude.to_radians().cos();
    if !(ratio < 1.0) {
        return whole_band;
    }
    let d_lng = ratio.asin().to_degrees() + ENVELOPE_PADDING_DEGREES;
    let min_lng = center.longitude - d_lng;
    let max_lng = center.longitude + d_lng;

    if min_lng < -180.0 {
        vec![
            Bounds { min_lat, max_lat, min_lng: -180.0, max_lng },
            Bounds { min_lat, max_lat, min_lng: min_lng + 360.0, max_lng: 180.0 },
        ]
    } else if max_lng > 180.0 {
        vec![
            Bounds { min_lat, max_lat, min_lng, max_lng: 180.0 },
            Bounds { min_lat, max_lat, min_lng: -180.0, max_lng: max_lng - 360.0 },
        ]
    } else {
        vec![Bounds { min_lat, max_lat, min_lng, max_lng }]
    }
}

/// Offset `point` by an independent uniform amount in `[-max_degrees, max_degrees]`
/// on each axis.
pub fn jitter<R: Rng + ?Sized>(point: &GpsPoint, max_degrees: f64, rng: &mut R) -> GpsPoint {
    let d_lat = (rng.gen::<f64>() * 2.0 - 1.0) * max_degrees;
    let d_lng = (rng.gen::<f64>() * 2.0 - 1.0) * max_degrees;
    GpsPoint::new(point.latitude + d_lat, point.longitude + d_lng)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Distance;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(55.7558, 37.6173);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // 0.0001 degrees of latitude is ~11.12m
        let a = GpsPoint::new(55.7558, 37.6173);
        let b = GpsPoint::new(55.7559, 37.6173);
        assert!(approx_eq(haversine_distance(&a, &b), 11.12, 0.01));
    }

    #[test]
    fn test_haversine_matches_geo() {
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let ours = haversine_distance(&london, &paris);
        let theirs = Haversine::distance(
            Point::new(london.longitude, london.latitude),
            Point::new(paris.longitude, paris.latitude),
        );
        // geo uses a 6371.0088km radius; the difference is ~1.4ppm
        assert!((ours - theirs).abs() / theirs < 1e-5);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = GpsPoint::new(55.7558, 37.6173);
        let b = GpsPoint::new(55.7298, 37.6010);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GpsPoint::new(55.7558, 37.6173);
        let north = GpsPoint::new(55.7568, 37.6173);
        let south = GpsPoint::new(55.7548, 37.6173);
        let east = GpsPoint::new(55.7558, 37.6183);

        assert!(approx_eq(bearing(&origin, &north), 0.0, 0.01) || approx_eq(bearing(&origin, &north), 360.0, 0.01));
        assert!(approx_eq(bearing(&origin, &south), 180.0, 0.01));
        assert!(approx_eq(bearing(&origin, &east), 90.0, 0.1));
    }

    #[test]
    fn test_destination_round_trip() {
        let origin = GpsPoint::new(55.7558, 37.6173);
        for bearing_deg in [0.0, 45.0, 135.0, 270.0] {
            let target = destination_point(&origin, bearing_deg, 80.0);
            assert!(approx_eq(haversine_distance(&origin, &target), 80.0, 0.01));
        }
    }

    #[test]
    fn test_polyline_length_empty() {
        let empty: Vec<GpsPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
    }

    #[test]
    fn test_polyline_length_single_point() {
        let single = vec![GpsPoint::new(51.5074, -0.1278)];
        assert_eq!(polyline_length(&single), 0.0);
    }

    #[test]
    fn test_polyline_length_sums_segments() {
        let track = vec![
            GpsPoint::new(55.7558, 37.6173),
            GpsPoint::new(55.7559, 37.6173),
            GpsPoint::new(55.7560, 37.6173),
        ];
        assert!(approx_eq(polyline_length(&track), 22.24, 0.02));
    }

    fn wrap_longitude(lng: f64) -> f64 {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }

    fn in_any(boxes: &[Bounds], p: &GpsPoint) -> bool {
        let lng = wrap_longitude(p.longitude);
        boxes.iter().any(|b| {
            p.latitude >= b.min_lat && p.latitude <= b.max_lat && lng >= b.min_lng && lng <= b.max_lng
        })
    }

    #[test]
    fn test_search_envelope_contains_radius() {
        let centers = [
            GpsPoint::new(55.7558, 37.6173),
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(89.9, 10.0),
            GpsPoint::new(-89.95, -120.0),
            GpsPoint::new(-16.5, 179.9999),
            GpsPoint::new(64.0, -179.9995),
        ];
        for center in centers {
            let boxes = search_envelope(&center, 50.0);
            for step in 0..16 {
                let edge = destination_point(&center, step as f64 * 22.5, 49.99);
                assert!(in_any(&boxes, &edge), "{:?} from {:?} outside {:?}", edge, center, boxes);
            }
        }
    }

    #[test]
    fn test_search_envelope_high_latitude_is_wide() {
        // 40m east at 89.9N is ~0.2 degrees of longitude
        let center = GpsPoint::new(89.9, 10.0);
        let boxes = search_envelope(&center, 50.0);
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].max_lng - center.longitude > 0.2);
    }

    #[test]
    fn test_search_envelope_covering_pole_spans_all_longitudes() {
        let boxes = search_envelope(&GpsPoint::new(89.9999, 0.0), 50.0);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].min_lng, -180.0);
        assert_eq!(boxes[0].max_lng, 180.0);
        assert_eq!(boxes[0].max_lat, 90.0);
    }

    #[test]
    fn test_search_envelope_splits_at_antimeridian() {
        let boxes = search_envelope(&GpsPoint::new(-16.5, 179.9999), 50.0);
        assert_eq!(boxes.len(), 2);
        for b in &boxes {
            assert!(b.min_lng >= -180.0 && b.max_lng <= 180.0);
        }
        assert!(in_any(&boxes, &GpsPoint::new(-16.5, -179.9999)));

        let west = search_envelope(&GpsPoint::new(10.0, -179.9999), 50.0);
        assert_eq!(west.len(), 2);
        assert!(in_any(&west, &GpsPoint::new(10.0, 179.9999)));
    }

    #[test]
    fn test_search_envelope_single_box_away_from_edges() {
        let center = GpsPoint::new(55.7558, 37.6173);
        let boxes = search_envelope(&center, 100.0);
        assert_eq!(boxes.len(), 1);
        let far = destination_point(&center, 45.0, 300.0);
        assert!(!in_any(&boxes, &far));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        let zone = GpsPoint::new(55.7558, 37.6173);
        for _ in 0..1000 {
            let p = jitter(&zone, 0.0005, &mut rng);
            assert!((p.latitude - zone.latitude).abs() <= 0.0005);
            assert!((p.longitude - zone.longitude).abs() <= 0.0005);
        }
    }

    #[test]
    fn test_jitter_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let zone = GpsPoint::new(55.7558, 37.6173);
        assert_eq!(jitter(&zone, 0.0, &mut rng), zone);
    }
}
