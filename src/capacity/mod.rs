//! Per-day capacity bookkeeping.
//!
//! `technician_calendar.max_assignments` is the only stored capacity figure.
//! Booked minutes are re-derived from `current_dispatches` on each read.

pub mod bindings;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

use crate::db::{calendar, dispatches};
use crate::domain::location::{distance_km, round_to_nearest_hour, TravelModel, MINUTES_PER_HOUR};
use crate::domain::changes::snapshot;
use crate::domain::{Dispatch, Operation, Technician};
use crate::errors::{EngineError, Result};
use crate::history::{self, Table};

pub use bindings::{AssignmentBindings, Binding, ReconcileReport};

/// Sum of `duration_min` over dispatches assigned to the technician that day.
pub fn assigned_minutes(conn: &Connection, technician_id: &str, date: NaiveDate) -> Result<i64> {
    dispatches::assigned_minutes(conn, technician_id, date)
}

/// Moves `hours` into (`restore`) or out of a calendar entry, clamping at zero,
/// and logs the change. Returns `false` if the entry disappeared between the
/// read and the write; callers treat that as a lost update.
pub fn adjust_capacity(
    conn: &Connection,
    technician_id: &str,
    date: NaiveDate,
    hours: i64,
    restore: bool,
) -> Result<bool> {
    let entry = calendar::get_entry(conn, technician_id, date)?.ok_or_else(|| {
        EngineError::EntryNotFound {
            technician_id: technician_id.to_string(),
            date: date.to_string(),
        }
    })?;

    let hours = hours.abs();
    let current = entry.max_assignments_hours;
    let new_max = if restore {
        current + hours
    } else {
        (current - hours).max(0)
    };

    if calendar::set_max_assignments(conn, technician_id, date, new_max)? == 0 {
        log::warn!("calendar entry {technician_id} {date} vanished during capacity update");
        return Ok(false);
    }

    let old = snapshot(json!({ "max_assignments": current }));
    let new = snapshot(json!({ "max_assignments": new_max }));
    let note = if restore {
        format!("Capacity restored: +{hours}h")
    } else {
        format!("Capacity deducted: -{hours}h")
    };
    history::log_change(
        conn,
        Table::Calendar,
        Operation::Update,
        &entry.record_id(),
        Some(&old),
        Some(&new),
        Some(&note),
    )?;

    log::debug!("capacity {technician_id} {date}: {current}h -> {new_max}h");
    Ok(true)
}

/// Same as [`adjust_capacity`] but a vanished entry is an error.
pub fn adjust_capacity_strict(
    conn: &Connection,
    technician_id: &str,
    date: NaiveDate,
    hours: i64,
    restore: bool,
) -> Result<()> {
    if adjust_capacity(conn, technician_id, date, hours, restore)? {
        Ok(())
    } else {
        Err(EngineError::LostUpdate {
            technician_id: technician_id.to_string(),
            date: date.to_string(),
        })
    }
}

/// Whole hours to deduct for a dispatch: job duration plus travel, rounded to
/// the nearest hour. With an unset location on either side travel counts as zero.
pub fn hours_for_dispatch(dispatch: &Dispatch, technician: &Technician, travel: &TravelModel) -> i64 {
    let duration = dispatch.duration_minutes as f64;
    let total = match distance_km(&dispatch.location, &technician.location) {
        Some(d) => duration + travel.travel_time_minutes(d),
        None => {
            log::warn!(
                "no coordinates for dispatch {} or technician {}; ignoring travel time",
                dispatch.id,
                technician.id
            );
            duration
        }
    };
    round_to_nearest_hour(total) / MINUTES_PER_HOUR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, Priority};
    use chrono::NaiveDateTime;

    fn dispatch_at(lat: f64, lon: f64, minutes: i64) -> Dispatch {
        Dispatch {
            id: "D1".into(),
            location: Location::new("Austin", "TX", lat, lon).unwrap(),
            appointment_start: NaiveDateTime::parse_from_str("2025-06-02 09:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            duration_minutes: minutes,
            required_skill: String::new(),
            priority: Priority::Medium,
            assigned_technician_id: None,
        }
    }

    fn tech_at(lat: f64, lon: f64) -> Technician {
        Technician {
            id: "T1".into(),
            name: "Tess".into(),
            location: Location::new("Austin", "TX", lat, lon).unwrap(),
            primary_skill: "HVAC".into(),
            workload_capacity: 8,
        }
    }

    #[test]
    fn ten_km_job_costs_two_hours() {
        // 0.0904 degrees of latitude is a little over 10 km
        let d = dispatch_at(30.0904, -97.7, 60);
        let t = tech_at(30.0, -97.7);
        assert_eq!(hours_for_dispatch(&d, &t, &TravelModel::default()), 2);
    }

    #[test]
    fn missing_coordinates_fall_back_to_duration() {
        let d = dispatch_at(0.0, 0.0, 150);
        let t = tech_at(30.0, -97.7);
        // 150 minutes is a tie and rounds to the even hour
        assert_eq!(hours_for_dispatch(&d, &t, &TravelModel::default()), 2);

        let d = dispatch_at(30.1, -97.7, 200);
        let t = tech_at(0.0, 0.0);
        assert_eq!(hours_for_dispatch(&d, &t, &TravelModel::default()), 3);
    }
}
