pub mod candidates;
pub mod scoring;

use crate::config::{EngineConfig, ScoringPolicy};
use crate::domain::location::TravelModel;

pub use candidates::{find_candidates, Candidate};

/// The slice of engine configuration the matcher needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub max_range_km: f64,
    pub range_expansion_factor: f64,
    pub range_expansion_threshold: f64,
    pub expansion_quality_threshold: f64,
    pub travel: TravelModel,
    pub scoring: ScoringPolicy,
}

impl MatchSettings {
    pub fn expanded_range_km(&self) -> f64 {
        self.max_range_km * self.range_expansion_factor
    }
}

impl From<&EngineConfig> for MatchSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            max_range_km: cfg.max_range_km,
            range_expansion_factor: cfg.range_expansion_factor,
            range_expansion_threshold: cfg.range_expansion_threshold,
            expansion_quality_threshold: cfg.expansion_quality_threshold,
            travel: TravelModel {
                average_speed_kmh: cfg.average_speed_kmh,
                buffer_minutes: cfg.travel_buffer_minutes,
            },
            scoring: cfg.scoring,
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        MatchSettings::from(&EngineConfig::default())
    }
}
