// src/matching/scoring.rs
use crate::config::{ScoringPolicy, ScoringWeights};
use crate::domain::Priority;

/// Everything the scoring policies look at for one dispatch/technician pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInputs {
    pub priority: Priority,
    /// False when the dispatch names no skill (any technician qualifies).
    pub skill_specified: bool,
    pub utilization_pct: f64,
    /// Completed share of the technician's history, if there is any.
    pub completion_ratio: Option<f64>,
    pub distance_km: f64,
    pub travel_time_min: f64,
}

/// Normalisation bounds: the furthest distance and longest drive a candidate
/// can have.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBounds {
    pub max_distance_km: f64,
    pub max_travel_min: f64,
}

pub fn score(policy: &ScoringPolicy, inputs: &ScoreInputs, bounds: &ScoreBounds) -> f64 {
    match policy {
        ScoringPolicy::Weighted(weights) => weighted_score(weights, inputs, bounds),
        ScoringPolicy::Simple => simple_score(inputs),
    }
}

/// `100 - 2*distance_km - 0.5*utilization_pct`. Can go negative.
pub fn simple_score(inputs: &ScoreInputs) -> f64 {
    100.0 - 2.0 * inputs.distance_km - 0.5 * inputs.utilization_pct
}

/// `100 * sum(weight * factor)` with every factor in [0, 1].
pub fn weighted_score(w: &ScoringWeights, inputs: &ScoreInputs, bounds: &ScoreBounds) -> f64 {
    let skill = if inputs.skill_specified { 1.0 } else { 0.5 };
    let utilization = unit(1.0 - inputs.utilization_pct / 100.0);
    let history = inputs.completion_ratio.map(unit).unwrap_or(0.5);
    let distance = unit(1.0 - ratio(inputs.distance_km, bounds.max_distance_km));
    let travel = unit(1.0 - ratio(inputs.travel_time_min, bounds.max_travel_min));

    100.0
        * (w.priority * inputs.priority.factor()
            + w.skill_match * skill
            + w.utilization * utilization
            + w.history * history
            + w.distance * distance
            + w.travel_time * travel)
}

/// Booked share of the day's capacity, in percent. A day with no capacity
/// reports zero.
pub fn utilization_pct(assigned_minutes: i64, available_minutes: i64) -> f64 {
    if available_minutes <= 0 {
        return 0.0;
    }
    assigned_minutes as f64 / available_minutes as f64 * 100.0
}

fn ratio(value: f64, bound: f64) -> f64 {
    if bound > 0.0 {
        value / bound
    } else {
        1.0
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
