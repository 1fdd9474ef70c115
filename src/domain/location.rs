// src/domain/location.rs

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const MINUTES_PER_HOUR: i64 = 60;

/// Immutable place on the map. A zero latitude or longitude means the
/// coordinates were never captured, not a point on the equator or meridian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Validates coordinate ranges. Zero coordinates are accepted and mark the
    /// location as unset.
    pub fn new(
        city: impl Into<String>,
        state: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(EngineError::invalid(
                "latitude",
                format!("{latitude} is outside [-90, 90]"),
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(EngineError::invalid(
                "longitude",
                format!("{longitude} is outside [-180, 180]"),
            ));
        }
        Ok(Self {
            city: city.into(),
            state: state.into(),
            latitude,
            longitude,
        })
    }

    pub fn is_set(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }

    /// Same city and state, compared case-insensitively after trimming.
    pub fn same_area(&self, other: &Location) -> bool {
        self.city.trim().eq_ignore_ascii_case(other.city.trim())
            && self.state.trim().eq_ignore_ascii_case(other.state.trim())
    }
}

/// Great-circle distance via the haversine formula.
/// `None` when either location is unset.
pub fn distance_km(a: &Location, b: &Location) -> Option<f64> {
    if !a.is_set() || !b.is_set() {
        return None;
    }

    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against h drifting a hair above 1.0 for antipodes.
    let c = 2.0 * h.sqrt().min(1.0).asin();

    Some(EARTH_RADIUS_KM * c)
}

/// Drive-time estimate: constant average speed plus a fixed buffer per trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelModel {
    pub average_speed_kmh: f64,
    pub buffer_minutes: f64,
}

impl Default for TravelModel {
    fn default() -> Self {
        Self {
            average_speed_kmh: crate::config::DEFAULT_AVERAGE_SPEED_KMH,
            buffer_minutes: crate::config::DEFAULT_TRAVEL_BUFFER_MINUTES,
        }
    }
}

impl TravelModel {
    pub fn minutes_per_km(&self) -> f64 {
        60.0 / self.average_speed_kmh
    }

    pub fn travel_time_minutes(&self, distance_km: f64) -> f64 {
        distance_km * self.minutes_per_km() + self.buffer_minutes
    }
}

/// Travel time with the default 40 km/h and 15 minute buffer.
pub fn travel_time_minutes(distance_km: f64) -> f64 {
    TravelModel::default().travel_time_minutes(distance_km)
}

/// Rounds to the nearest whole hour, expressed in minutes. Exact half hours
/// go to the even hour (90 -> 120, 150 -> 120). Non-positive input yields 0.
pub fn round_to_nearest_hour(minutes: f64) -> i64 {
    if minutes <= 0.0 || minutes.is_nan() {
        return 0;
    }
    let hours = (minutes / MINUTES_PER_HOUR as f64).round_ties_even();
    hours as i64 * MINUTES_PER_HOUR
}
