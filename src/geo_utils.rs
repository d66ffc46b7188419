//! Geographic utilities (distance, bearing, geofence outline).
//!
//! Pure functions with no state and no failure conditions.

use geo::{Distance, Geodesic, Haversine, Point};

use crate::GpsPoint;

/// Meters per degree of latitude used by the equirectangular circle outline.
pub const METERS_PER_DEGREE: f64 = 111_111.0;

/// Default number of vertices in a geofence outline.
pub const DEFAULT_CIRCLE_SEGMENTS: u32 = 36;

fn to_point(p: &GpsPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Distance in meters between two GPS points on the WGS84 ellipsoid.
///
/// This is the distance used for every geofence decision. It agrees with the
/// platform `Location.distanceBetween` implementation to well under a
/// millimeter at anchoring distances.
pub fn distance_meters(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Geodesic::distance(to_point(p1), to_point(p2))
}

/// Calculate haversine distance between two GPS points in meters.
///
/// Spherical approximation, up to ~0.5% off the ellipsoidal distance.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Haversine::distance(to_point(p1), to_point(p2))
}

/// Initial great-circle bearing from `from` to `to`, in degrees clockwise from
/// true north, normalized to `[0, 360)`.
///
/// Identical points yield 0.
pub fn bearing_degrees(from: &GpsPoint, to: &GpsPoint) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let delta_lambda = (to.longitude - from.longitude).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Generate the outline of a geofence circle.
///
/// Returns `segments` points at equal angular steps, starting due north and
/// going clockwise. Uses an equirectangular approximation (longitude offsets
/// scaled by `cos(latitude)`), good for radii up to a few kilometers.
/// Not valid close to the poles.
///
/// # Example
/// ```
/// use anchor_watch::geo_utils::circle_polygon;
/// use anchor_watch::GpsPoint;
///
/// let outline = circle_polygon(&GpsPoint::new(10.0, 20.0), 50.0, 36);
/// assert_eq!(outline.len(), 36);
/// ```
pub fn circle_polygon(center: &GpsPoint, radius_meters: f64, segments: u32) -> Vec<GpsPoint> {
    let lat_step = radius_meters / METERS_PER_DEGREE;
    let lng_step = radius_meters / (METERS_PER_DEGREE * center.latitude.to_radians().cos());

    (0..segments)
        .map(|i| {
            let angle = (i as f64 * 360.0 / segments as f64).to_radians();
            GpsPoint::new(
                center.latitude + lat_step * angle.cos(),
                center.longitude + lng_step * angle.sin(),
            )
        })
        .collect()
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| distance_meters(&w[0], &w[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let points = [
            GpsPoint::new(10.0, 20.0),
            GpsPoint::new(-33.8688, 151.2093),
            GpsPoint::new(0.0, 0.0),
        ];
        for p in &points {
            assert!(distance_meters(p, p).abs() < 1e-9);
            assert!(haversine_distance(p, p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GpsPoint::new(51.5074, -0.1278);
        let b = GpsPoint::new(51.5090, -0.1300);
        assert!((distance_meters(&a, &b) - distance_meters(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_close_to_haversine() {
        // London to Paris, ~343 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let geodesic = distance_meters(&london, &paris);
        let haversine = haversine_distance(&london, &paris);

        assert!(geodesic > 340_000.0 && geodesic < 346_000.0);
        assert!((geodesic - haversine).abs() / geodesic < 0.01);
    }

    #[test]
    fn test_small_distance_near_equator() {
        // 0.00045 degrees of latitude at 10N is just under 50m on the ellipsoid
        let a = GpsPoint::new(10.0, 20.0);
        let b = GpsPoint::new(10.00045, 20.0);
        let d = distance_meters(&a, &b);
        assert!(d > 49.5 && d < 50.0, "got {}", d);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GpsPoint::new(10.0, 20.0);
        let north = bearing_degrees(&origin, &GpsPoint::new(10.001, 20.0));
        let east = bearing_degrees(&origin, &GpsPoint::new(10.0, 20.001));
        let south = bearing_degrees(&origin, &GpsPoint::new(9.999, 20.0));
        let west = bearing_degrees(&origin, &GpsPoint::new(10.0, 19.999));

        assert!(north.abs() < 0.01 || (north - 360.0).abs() < 0.01);
        assert!((east - 90.0).abs() < 0.01);
        assert!((south - 180.0).abs() < 0.01);
        assert!((west - 270.0).abs() < 0.01);
        assert_eq!(bearing_degrees(&origin, &origin), 0.0);
    }

    #[test]
    fn test_circle_polygon_radius() {
        let center = GpsPoint::new(10.0, 20.0);
        let outline = circle_polygon(&center, 50.0, DEFAULT_CIRCLE_SEGMENTS);

        assert_eq!(outline.len(), 36);
        // First vertex is due north
        assert!(outline[0].latitude > center.latitude);
        assert!((outline[0].longitude - center.longitude).abs() < 1e-12);
        for p in &outline {
            let d = distance_meters(&center, p);
            assert!((d - 50.0).abs() < 1.0, "vertex at {}m", d);
        }
    }

    #[test]
    fn test_circle_polygon_degenerate() {
        let center = GpsPoint::new(10.0, 20.0);
        let outline = circle_polygon(&center, 0.0, 12);
        assert_eq!(outline.len(), 12);
        assert!(outline.iter().all(|p| *p == center));

        assert!(circle_polygon(&center, 50.0, 0).is_empty());
    }

    #[test]
    fn test_polyline_length() {
        let points: Vec<GpsPoint> = (0..5)
            .map(|i| GpsPoint::new(10.0 + i as f64 * 0.001, 20.0))
            .collect();
        let expected = distance_meters(&points[0], &points[4]);
        assert!((polyline_length(&points) - expected).abs() < 0.01);
        assert_eq!(polyline_length(&points[..1]), 0.0);
        assert_eq!(polyline_length(&[]), 0.0);
    }
}
