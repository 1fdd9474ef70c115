//! Runtime configuration for the matching engine.
//! Defaults match the field-service constants the engine was tuned with.

use crate::errors::{EngineError, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "dispatch.sqlite3";
pub const DEFAULT_MAX_RANGE_KM: f64 = 15.0;
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 40.0;
pub const DEFAULT_TRAVEL_BUFFER_MINUTES: f64 = 15.0;
pub const DEFAULT_RANGE_EXPANSION_FACTOR: f64 = 1.5;
pub const DEFAULT_RANGE_EXPANSION_THRESHOLD: f64 = 0.2;
pub const DEFAULT_EXPANSION_QUALITY_THRESHOLD: f64 = 50.0;
pub const DEFAULT_BATCH_LIMIT: usize = 1000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Per-factor weights for the weighted scoring policy.
/// They sum to 1.0 by convention; nothing enforces it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub priority: f64,
    pub skill_match: f64,
    pub utilization: f64,
    pub history: f64,
    pub distance: f64,
    pub travel_time: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            priority: 0.25,
            skill_match: 0.20,
            utilization: 0.15,
            history: 0.15,
            distance: 0.15,
            travel_time: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.priority
            + self.skill_match
            + self.utilization
            + self.history
            + self.distance
            + self.travel_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoringPolicy {
    /// Weighted combination of six normalized factors, 0..=100.
    Weighted(ScoringWeights),
    /// `100 - 2*distance_km - 0.5*utilization_pct`.
    Simple,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy::Weighted(ScoringWeights::default())
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: String,
    /// Primary search radius around the customer.
    pub max_range_km: f64,
    pub average_speed_kmh: f64,
    pub travel_buffer_minutes: f64,
    /// Expanded radius is `max_range_km * range_expansion_factor`.
    pub range_expansion_factor: f64,
    /// Fraction by which an out-of-radius score must beat the best in-radius score.
    pub range_expansion_threshold: f64,
    /// In-radius scores at or above this never trigger expansion.
    pub expansion_quality_threshold: f64,
    pub scoring: ScoringPolicy,
    pub unassigned_batch_limit: usize,
    pub busy_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            max_range_km: DEFAULT_MAX_RANGE_KM,
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            travel_buffer_minutes: DEFAULT_TRAVEL_BUFFER_MINUTES,
            range_expansion_factor: DEFAULT_RANGE_EXPANSION_FACTOR,
            range_expansion_threshold: DEFAULT_RANGE_EXPANSION_THRESHOLD,
            expansion_quality_threshold: DEFAULT_EXPANSION_QUALITY_THRESHOLD,
            scoring: ScoringPolicy::default(),
            unassigned_batch_limit: DEFAULT_BATCH_LIMIT,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();

        let database_path = match std::env::var("DISPATCH_DB_PATH") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => defaults.database_path,
        };

        let scoring = match std::env::var("DISPATCH_SCORING") {
            Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
                "" | "weighted" => ScoringPolicy::default(),
                "simple" => ScoringPolicy::Simple,
                other => {
                    return Err(EngineError::invalid(
                        "DISPATCH_SCORING",
                        format!("expected 'weighted' or 'simple', got '{other}'"),
                    ))
                }
            },
            Err(_) => ScoringPolicy::default(),
        };

        let busy_ms = env_or("DISPATCH_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;

        Ok(EngineConfig {
            database_path,
            max_range_km: env_or("DISPATCH_MAX_RANGE_KM", defaults.max_range_km)?,
            average_speed_kmh: env_or("DISPATCH_AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            travel_buffer_minutes: env_or(
                "DISPATCH_TRAVEL_BUFFER_MIN",
                defaults.travel_buffer_minutes,
            )?,
            range_expansion_factor: env_or(
                "DISPATCH_RANGE_EXPANSION_FACTOR",
                defaults.range_expansion_factor,
            )?,
            range_expansion_threshold: env_or(
                "DISPATCH_RANGE_EXPANSION_THRESHOLD",
                defaults.range_expansion_threshold,
            )?,
            expansion_quality_threshold: env_or(
                "DISPATCH_EXPANSION_QUALITY",
                defaults.expansion_quality_threshold,
            )?,
            scoring,
            unassigned_batch_limit: env_or("DISPATCH_BATCH_LIMIT", defaults.unassigned_batch_limit)?,
            busy_timeout: Duration::from_millis(busy_ms),
        })
    }

    pub fn expanded_range_km(&self) -> f64 {
        self.max_range_km * self.range_expansion_factor
    }
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| EngineError::invalid(name, format!("cannot parse '{}'", raw.trim()))),
        _ => Ok(default),
    }
}
