//! Closed-form CO2 emission model for loaded trucks.
//!
//! Distance-based fuel consumption adjusted for three effects observed in
//! heavy-vehicle fuel studies: a U-shaped speed penalty around an optimal
//! cruising speed, a non-linear payload factor, and a grade effect that
//! steepens past a 5% climb and credits descents at a smaller fixed rate.
//! Pure arithmetic over scalars, no I/O.

use serde::{Deserialize, Serialize};

/// Cruising speed with minimum consumption, km/h.
pub const OPTIMAL_SPEED_KMH: f64 = 50.0;

/// Vehicle characteristics consumed by the emission model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Baseline efficiency on a flat road, km/L
    pub fuel_efficiency_km_per_l: f64,
    /// Carried payload, tonnes
    pub payload_tonnes: f64,
    /// Rated maximum payload, tonnes
    pub max_payload_tonnes: f64,
    /// CO2 emitted per liter of fuel, grams (2640 for diesel)
    pub co2_factor_g_per_l: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            fuel_efficiency_km_per_l: 3.0,
            payload_tonnes: 10.0,
            max_payload_tonnes: 25.0,
            co2_factor_g_per_l: 2640.0,
        }
    }
}

/// CO2 emissions in kilograms for one trip.
///
/// # Arguments
/// * `distance_km` - total trip distance
/// * `total_elevation_gain_m` - summed ascent over the trip
/// * `total_elevation_loss_m` - summed descent over the trip
/// * `total_time_s` - total travel time
///
/// The grade percentages are averaged over the whole distance; the speed
/// factor grows quadratically with the distance of the average speed from
/// [`OPTIMAL_SPEED_KMH`]; the load factor uses a slightly super-linear
/// payload ratio. Deterministic for fixed inputs.
pub fn calculate_co2_emissions(
    distance_km: f64,
    total_elevation_gain_m: f64,
    total_elevation_loss_m: f64,
    total_time_s: f64,
    vehicle: &VehicleParams,
) -> f64 {
    let avg_gain_grade_pct = total_elevation_gain_m / (distance_km * 1000.0) * 100.0;
    let avg_loss_grade_pct = total_elevation_loss_m / (distance_km * 1000.0) * 100.0;

    let total_time_h = total_time_s / 3600.0;
    let speed_diff = (distance_km / total_time_h - OPTIMAL_SPEED_KMH).abs();
    let speed_factor = 1.0 + (speed_diff / 50.0).powi(2) * 0.15;

    let payload_ratio = vehicle.payload_tonnes / vehicle.max_payload_tonnes;
    let load_factor = 1.0 + payload_ratio.powf(1.2);

    let mut slope_effect = 1.0;
    if avg_gain_grade_pct > 0.0 {
        let mut slope_factor = 0.2;
        if avg_gain_grade_pct > 5.0 {
            // Climbs past 5% cost disproportionately more fuel
            slope_factor = 0.2 + 0.1 * (avg_gain_grade_pct - 5.0);
        }
        let weight_slope_interaction = 1.0 + payload_ratio * (avg_gain_grade_pct / 10.0);
        slope_effect += (avg_gain_grade_pct / 100.0) * slope_factor * weight_slope_interaction;
    }
    if avg_loss_grade_pct > 0.0 {
        slope_effect -= (avg_loss_grade_pct / 100.0) * 0.05;
    }

    (distance_km / (vehicle.fuel_efficiency_km_per_l * speed_factor))
        * slope_effect
        * load_factor
        * (vehicle.co2_factor_g_per_l / 1000.0)
}
