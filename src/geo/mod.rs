use crate::models::order::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Assumed average courier speed, in km per minute (18 km/h).
const AVERAGE_SPEED_KM_PER_MIN: f64 = 0.3;

/// Distance assumed for a quote when either endpoint is still unknown.
pub const DEFAULT_DISTANCE_KM: f64 = 10.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// ETA at the assumed average speed, rendered for humans: "25min" below
/// one hour, "1h 15min" above.
pub fn format_eta(distance_km: f64) -> String {
    let total_minutes = distance_km / AVERAGE_SPEED_KM_PER_MIN;
    let hours = (total_minutes / 60.0).floor() as u64;
    let minutes = (total_minutes % 60.0).round() as u64;

    if hours == 0 {
        format!("{minutes}min")
    } else {
        format!("{hours}h {minutes}min")
    }
}

#[cfg(test)]
mod tests {
    use super::{format_eta, haversine_km};
    use crate::models::order::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            latitude: 5.3600,
            longitude: -4.0083,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            latitude: 51.5074,
            longitude: -0.1278,
        };
        let paris = GeoPoint {
            latitude: 48.8566,
            longitude: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn short_eta_renders_minutes_only() {
        assert_eq!(format_eta(3.0), "10min");
        assert_eq!(format_eta(0.3), "1min");
    }

    #[test]
    fn long_eta_renders_hours_and_minutes() {
        assert_eq!(format_eta(18.0), "1h 0min");
        assert_eq!(format_eta(22.5), "1h 15min");
    }
}
