//! Geodesic helpers shared by fusion, dispatch and officer safety:
//! haversine distance, bearing-to-compass direction, point-in-polygon.

use crate::types::GeoPoint;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in meters.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    distance_km(a, b) * 1000.0
}

/// Initial bearing from `from` toward `to`, in degrees [0, 360).
pub fn bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Compass direction (8-wind) for a bearing.
pub fn compass_direction(bearing: f64) -> &'static str {
    const WINDS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let idx = (((bearing + 22.5) % 360.0) / 45.0) as usize;
    WINDS[idx % 8]
}

/// Ray-casting point-in-polygon test over (lat, lon) vertices.
///
/// A point on the polygon boundary counts as inside, which matters for
/// geofenced waypoints sitting exactly on the fence line.
pub fn point_in_polygon(point: GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    // Boundary check first: distance from point to each edge segment.
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if on_segment(point, a, b) {
            return true;
        }
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if ((pi.lat > point.lat) != (pj.lat > point.lat))
            && (point.lon
                < (pj.lon - pi.lon) * (point.lat - pi.lat) / (pj.lat - pi.lat) + pi.lon)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether `p` lies on the segment `a`-`b` within a small planar tolerance.
fn on_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> bool {
    const EPS: f64 = 1e-9;
    let cross = (b.lat - a.lat) * (p.lon - a.lon) - (b.lon - a.lon) * (p.lat - a.lat);
    if cross.abs() > EPS {
        return false;
    }
    let dot = (p.lat - a.lat) * (b.lat - a.lat) + (p.lon - a.lon) * (b.lon - a.lon);
    let len2 = (b.lat - a.lat).powi(2) + (b.lon - a.lon).powi(2);
    dot >= -EPS && dot <= len2 + EPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_distance() {
        // Riviera Beach to West Palm Beach, roughly 8 km.
        let rb = GeoPoint::new(26.7753, -80.0583);
        let wpb = GeoPoint::new(26.7153, -80.0534);
        let d = distance_km(rb, wpb);
        assert!(d > 6.0 && d < 8.0, "got {d}");
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(26.7, -80.05);
        assert!(distance_m(p, p) < 1e-6);
    }

    #[test]
    fn compass_directions() {
        assert_eq!(compass_direction(0.0), "N");
        assert_eq!(compass_direction(90.0), "E");
        assert_eq!(compass_direction(225.0), "SW");
        assert_eq!(compass_direction(359.0), "N");
    }

    #[test]
    fn point_inside_square() {
        let square = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(1.0, 0.0),
        ];
        assert!(point_in_polygon(GeoPoint::new(0.5, 0.5), &square));
        assert!(!point_in_polygon(GeoPoint::new(1.5, 0.5), &square));
    }

    #[test]
    fn boundary_point_is_inside() {
        let square = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(1.0, 0.0),
        ];
        assert!(point_in_polygon(GeoPoint::new(0.0, 0.5), &square));
        assert!(point_in_polygon(GeoPoint::new(1.0, 1.0), &square));
    }
}
