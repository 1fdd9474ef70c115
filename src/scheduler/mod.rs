//! Batch assignment of unassigned dispatches.
//!
//! `auto_assign` only reads until it hands its picks to `commit`, which gives
//! every item its own IMMEDIATE transaction: dispatch update, change record
//! and capacity deduction land together, and one failing item leaves the
//! others alone.

pub mod stats;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::capacity::bindings::committed_binding;
use crate::capacity::{self, AssignmentBindings, Binding};
use crate::db::{calendar, dispatches, technicians, Database};
use crate::domain::location::MINUTES_PER_HOUR;
use crate::domain::changes::snapshot;
use crate::domain::{Operation, Priority};
use crate::errors::{EngineError, Result};
use crate::history::{self, Table};
use crate::matching::{find_candidates, Candidate, MatchSettings};

pub use stats::AssignmentStats;

pub const NO_TECHNICIANS: &str = "No available technicians";

/// Note on the dispatch change written by a commit. Only assignments carrying
/// it had hours deducted.
pub const AUTO_ASSIGN_NOTE: &str = "Auto-assigned";

#[derive(Debug, Clone, Default)]
pub struct AssignFilters {
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignOptions {
    pub dry_run: bool,
    /// Pick the best score; otherwise the shortest distance.
    pub use_scoring: bool,
    pub enable_range_expansion: bool,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            use_scoring: true,
            enable_range_expansion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub dispatch_id: String,
    pub technician_id: String,
    pub technician_name: String,
    pub distance_km: f64,
    pub travel_time_min: f64,
    pub score: f64,
    pub priority: Priority,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unassignable {
    pub dispatch_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoAssignResult {
    pub assignments: Vec<Assignment>,
    pub unassignable: Vec<Unassignable>,
    pub stats: AssignmentStats,
    /// Present when the batch was committed.
    pub commit: Option<CommitResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentRequest {
    pub dispatch_id: String,
    pub technician_id: String,
}

impl From<&Assignment> for AssignmentRequest {
    fn from(a: &Assignment) -> Self {
        Self {
            dispatch_id: a.dispatch_id.clone(),
            technician_id: a.technician_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedAssignment {
    pub dispatch_id: String,
    pub technician_id: String,
    pub date: NaiveDate,
    pub hours_deducted: i64,
    pub change_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitResult {
    pub committed: Vec<CommittedAssignment>,
    /// One `"<dispatch_id>: <message>"` line per failed item.
    pub failed: Vec<String>,
}

/// Picks the winner from a ranked list: the first candidate when scoring, else
/// the first of the closest.
pub fn pick_winner(candidates: &[Candidate], use_scoring: bool) -> Option<&Candidate> {
    if use_scoring {
        candidates.first()
    } else {
        candidates
            .iter()
            .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
    }
}

/// Proposes a technician for each unassigned dispatch on `date`, in priority
/// order. Commits the proposals unless `dry_run`.
pub fn auto_assign(
    db: &Database,
    settings: &MatchSettings,
    bindings: &AssignmentBindings,
    batch_limit: usize,
    date: NaiveDate,
    filters: &AssignFilters,
    options: AssignOptions,
) -> Result<AutoAssignResult> {
    let (assignments, unassignable) =
        db.with_conn(|conn| propose(conn, settings, batch_limit, date, filters, options))?;

    let stats = AssignmentStats::from_batch(&assignments, unassignable.len());
    log::info!(
        "auto-assign {date}: {} of {} dispatches matched ({:.1}%)",
        stats.assigned,
        stats.total,
        stats.success_rate
    );

    let committed = if options.dry_run || assignments.is_empty() {
        None
    } else {
        let requests: Vec<AssignmentRequest> = assignments.iter().map(Into::into).collect();
        Some(commit(db, settings, bindings, &requests))
    };

    Ok(AutoAssignResult {
        assignments,
        unassignable,
        stats,
        commit: committed,
    })
}

fn propose(
    conn: &Connection,
    settings: &MatchSettings,
    batch_limit: usize,
    date: NaiveDate,
    filters: &AssignFilters,
    options: AssignOptions,
) -> Result<(Vec<Assignment>, Vec<Unassignable>)> {
    let batch = dispatches::unassigned_for_date(
        conn,
        date,
        filters.city.as_deref(),
        filters.state.as_deref(),
        batch_limit,
    )?;

    let mut assignments = Vec::new();
    let mut unassignable = Vec::new();

    for dispatch in batch {
        let candidates = find_candidates(conn, &dispatch, settings, options.enable_range_expansion)?;
        match pick_winner(&candidates, options.use_scoring) {
            Some(best) => assignments.push(Assignment {
                dispatch_id: dispatch.id.clone(),
                technician_id: best.technician_id.clone(),
                technician_name: best.name.clone(),
                distance_km: best.distance_km,
                travel_time_min: best.travel_time_min,
                score: best.score,
                priority: dispatch.priority,
                expanded: best.expanded,
            }),
            None => unassignable.push(Unassignable {
                dispatch_id: dispatch.id.clone(),
                reason: NO_TECHNICIANS.to_string(),
            }),
        }
    }

    Ok((assignments, unassignable))
}

/// Persists each assignment in its own transaction. Failures are collected.
pub fn commit(
    db: &Database,
    settings: &MatchSettings,
    bindings: &AssignmentBindings,
    requests: &[AssignmentRequest],
) -> CommitResult {
    let mut result = CommitResult::default();

    for req in requests {
        let outcome = db.with_transaction(|tx| commit_one(tx, settings, bindings, req));
        match outcome {
            Ok(done) => {
                bindings.track(
                    &done.dispatch_id,
                    Binding {
                        technician_id: done.technician_id.clone(),
                        date: done.date,
                        hours_deducted: done.hours_deducted,
                    },
                );
                log::info!(
                    "assigned dispatch {} to {} ({}h on {})",
                    done.dispatch_id,
                    done.technician_id,
                    done.hours_deducted,
                    done.date
                );
                result.committed.push(done);
            }
            Err(e) => {
                log::warn!("could not assign dispatch {}: {e}", req.dispatch_id);
                result.failed.push(format!("{}: {e}", req.dispatch_id));
            }
        }
    }

    result
}

fn commit_one(
    conn: &Connection,
    settings: &MatchSettings,
    bindings: &AssignmentBindings,
    req: &AssignmentRequest,
) -> Result<CommittedAssignment> {
    let dispatch = dispatches::get_dispatch(conn, &req.dispatch_id)?
        .ok_or_else(|| EngineError::not_found("dispatch", &req.dispatch_id))?;
    let tech = technicians::get_technician(conn, &req.technician_id)?
        .ok_or_else(|| EngineError::not_found("technician", &req.technician_id))?;

    if dispatch.assigned_technician_id.as_deref() == Some(tech.id.as_str()) {
        return Err(EngineError::invalid(
            "technician_id",
            format!("dispatch is already assigned to {}", tech.id),
        ));
    }

    let date = dispatch.appointment_date();
    let hours = capacity::hours_for_dispatch(&dispatch, &tech, &settings.travel);

    // Re-read inside the write lock; the proposal may be stale.
    let on_hand = calendar::get_entry(conn, &tech.id, date)?
        .filter(|e| e.available)
        .map(|e| e.max_assignments_hours)
        .unwrap_or(0);
    if on_hand < hours {
        let needed_minutes = hours * MINUTES_PER_HOUR;
        let available_minutes = on_hand * MINUTES_PER_HOUR;
        return Err(EngineError::CapacityExceeded {
            technician_id: tech.id.clone(),
            date: date.to_string(),
            needed_minutes,
            available_minutes,
            short_minutes: needed_minutes - available_minutes,
        });
    }

    // a binding lost to a restart is recovered from the change log
    let previous = match bindings.get(&dispatch.id) {
        Some(binding) => Some(binding),
        None => committed_binding(conn, &dispatch, &settings.travel)?,
    };
    if let Some(prev) = previous {
        if prev.technician_id != tech.id {
            capacity::adjust_capacity_strict(
                conn,
                &prev.technician_id,
                prev.date,
                prev.hours_deducted,
                true,
            )?;
        }
    }

    if dispatches::set_assigned_technician(conn, &dispatch.id, Some(&tech.id))? == 0 {
        return Err(EngineError::not_found("dispatch", &dispatch.id));
    }

    let old = snapshot(json!({ "assigned_technician_id": dispatch.assigned_technician_id }));
    let new = snapshot(json!({ "assigned_technician_id": tech.id }));
    let change_id = history::log_change(
        conn,
        Table::Dispatches,
        Operation::Update,
        &dispatch.id,
        Some(&old),
        Some(&new),
        Some(AUTO_ASSIGN_NOTE),
    )?;

    capacity::adjust_capacity_strict(conn, &tech.id, date, hours, false)?;

    Ok(CommittedAssignment {
        dispatch_id: dispatch.id,
        technician_id: tech.id,
        date,
        hours_deducted: hours,
        change_id,
    })
}
