// src/matching/candidates.rs
use rusqlite::Connection;
use serde::Serialize;
use std::cmp::Ordering;

use super::scoring::{self, ScoreBounds, ScoreInputs};
use super::MatchSettings;
use crate::capacity;
use crate::config::ScoringPolicy;
use crate::db::technicians::{self, AvailableTechnician};
use crate::domain::location::{distance_km, MINUTES_PER_HOUR};
use crate::domain::Dispatch;
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub technician_id: String,
    pub name: String,
    pub distance_km: f64,
    pub travel_time_min: f64,
    pub score: f64,
    pub utilization_pct: f64,
    /// Admitted from beyond the primary search area.
    pub expanded: bool,
}

fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.technician_id.cmp(&b.technician_id))
}

/// Ranks eligible technicians for a dispatch, best score first with ties in
/// technician id order.
///
/// The primary set is every available, skill-matching technician based in the
/// dispatch's city and state and within `max_range_km`. With expansion enabled,
/// technicians out to the expanded radius are admitted when the primary set is
/// empty, or when its best score is below the quality threshold and theirs beats
/// it by the expansion threshold fraction.
pub fn find_candidates(
    conn: &Connection,
    dispatch: &Dispatch,
    settings: &MatchSettings,
    enable_range_expansion: bool,
) -> Result<Vec<Candidate>> {
    if !dispatch.location.is_set() {
        log::warn!("dispatch {} has no customer coordinates", dispatch.id);
        return Ok(Vec::new());
    }

    let date = dispatch.appointment_date();
    let expanded_radius = settings.expanded_range_km();
    let bounds = ScoreBounds {
        max_distance_km: expanded_radius,
        max_travel_min: settings.travel.travel_time_minutes(expanded_radius),
    };

    let mut primary = Vec::new();
    let mut pool = Vec::new();

    for row in technicians::available_on(conn, date)? {
        let tech = &row.technician;
        if !tech.has_skill(&dispatch.required_skill) {
            continue;
        }
        let Some(distance) = distance_km(&dispatch.location, &tech.location) else {
            log::debug!("skipping {}: no coordinates", tech.id);
            continue;
        };

        let in_primary =
            tech.location.same_area(&dispatch.location) && distance <= settings.max_range_km;
        if !in_primary && !(enable_range_expansion && distance <= expanded_radius) {
            continue;
        }

        let candidate = score_candidate(conn, dispatch, &row, distance, settings, &bounds)?;
        if in_primary {
            primary.push(candidate);
        } else {
            pool.push(candidate);
        }
    }

    primary.sort_by(by_score_desc);

    if enable_range_expansion && !pool.is_empty() {
        let admitted: Vec<Candidate> = match primary.first() {
            None => pool,
            Some(best) if best.score < settings.expansion_quality_threshold => {
                let bar = best.score * (1.0 + settings.range_expansion_threshold);
                pool.into_iter().filter(|c| c.score > bar).collect()
            }
            Some(_) => Vec::new(),
        };
        if !admitted.is_empty() {
            log::debug!(
                "dispatch {}: admitting {} technicians from the expanded radius",
                dispatch.id,
                admitted.len()
            );
        }
        primary.extend(admitted.into_iter().map(|c| Candidate {
            expanded: true,
            ..c
        }));
        primary.sort_by(by_score_desc);
    }

    log::debug!("dispatch {}: {} candidates", dispatch.id, primary.len());
    Ok(primary)
}

fn score_candidate(
    conn: &Connection,
    dispatch: &Dispatch,
    row: &AvailableTechnician,
    distance: f64,
    settings: &MatchSettings,
    bounds: &ScoreBounds,
) -> Result<Candidate> {
    let tech = &row.technician;
    let date = dispatch.appointment_date();

    let assigned = capacity::assigned_minutes(conn, &tech.id, date)?;
    let utilization_pct =
        scoring::utilization_pct(assigned, row.max_assignments_hours * MINUTES_PER_HOUR);
    let completion_ratio = match settings.scoring {
        ScoringPolicy::Weighted(_) => technicians::completion_ratio(conn, &tech.id)?,
        ScoringPolicy::Simple => None,
    };
    let travel_time_min = settings.travel.travel_time_minutes(distance);

    let inputs = ScoreInputs {
        priority: dispatch.priority,
        skill_specified: !dispatch.required_skill.trim().is_empty(),
        utilization_pct,
        completion_ratio,
        distance_km: distance,
        travel_time_min,
    };
    let score = scoring::score(&settings.scoring, &inputs, bounds);

    Ok(Candidate {
        technician_id: tech.id.clone(),
        name: tech.name.clone(),
        distance_km: distance,
        travel_time_min,
        score,
        utilization_pct,
        expanded: false,
    })
}
