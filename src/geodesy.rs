//! Great-circle geometry over WGS84 coordinates.

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two (lat, lon) points in meters.
///
/// Coordinates are degrees. Inputs outside [-90, 90] x [-180, 180] are not
/// validated; callers own that contract.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from (lat1, lon1) toward (lat2, lon2), radians in [-pi, pi].
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();
    y.atan2(x)
}

/// Turning angle at `p2` for the consecutive triple `p1 -> p2 -> p3`, degrees.
///
/// Computed as `|180 - |bearing(p2->p3) - bearing(p1->p2)||` after normalizing
/// the bearing difference to (-180, 180]. 180 means the heading is unchanged
/// (straight line); 0 means a full reversal.
///
/// Returns `None` if any coordinate is non-finite. Callers substitute the
/// non-filtering sentinel (180.0) so a malformed triple never rejects points.
pub fn turning_angle(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> Option<f64> {
    let coords = [p1.0, p1.1, p2.0, p2.1, p3.0, p3.1];
    if coords.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let bearing1 = initial_bearing(p1.0, p1.1, p2.0, p2.1);
    let bearing2 = initial_bearing(p2.0, p2.1, p3.0, p3.1);

    let mut diff = bearing2 - bearing1;
    while diff > std::f64::consts::PI {
        diff -= 2.0 * std::f64::consts::PI;
    }
    while diff < -std::f64::consts::PI {
        diff += 2.0 * std::f64::consts::PI;
    }

    let turning_rad = (std::f64::consts::PI - diff.abs()).abs();
    Some(turning_rad.to_degrees())
}
