// src/availability.rs
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::capacity;
use crate::db::{calendar, technicians};
use crate::errors::Result;

pub const REASON_NO_ENTRY: &str = "No calendar entry";
pub const REASON_NOT_SPECIFIED: &str = "Not specified";

/// A technician's standing for one day. When available,
/// `remaining_minutes == available_minutes - assigned_minutes`, and it goes
/// negative when the day is over-committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub available_minutes: i64,
    pub assigned_minutes: i64,
    pub remaining_minutes: i64,
    pub reason: Option<String>,
}

impl Availability {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            start_time: None,
            end_time: None,
            available_minutes: 0,
            assigned_minutes: 0,
            remaining_minutes: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Resolves availability from the calendar entry for that date alone.
/// `workload_capacity` on the technician plays no part.
pub fn check(conn: &Connection, technician_id: &str, date: NaiveDate) -> Result<Availability> {
    let Some(entry) = calendar::get_entry(conn, technician_id, date)? else {
        log::warn!("no calendar entry for {technician_id} on {date}");
        return Ok(Availability::unavailable(REASON_NO_ENTRY));
    };

    if !entry.available {
        let reason = entry
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| REASON_NOT_SPECIFIED.to_string());
        return Ok(Availability {
            start_time: entry.start_time,
            end_time: entry.end_time,
            ..Availability::unavailable(reason)
        });
    }

    let available_minutes = entry.capacity_minutes();
    let assigned_minutes = capacity::assigned_minutes(conn, technician_id, date)?;
    Ok(Availability {
        available: true,
        start_time: entry.start_time,
        end_time: entry.end_time,
        available_minutes,
        assigned_minutes,
        remaining_minutes: available_minutes - assigned_minutes,
        reason: None,
    })
}

#[derive(Debug, Clone, Default)]
pub struct AvailabilityFilter {
    pub city: Option<String>,
    pub state: Option<String>,
    pub skill: Option<String>,
}

fn matches_text(filter: &Option<String>, value: &str) -> bool {
    filter
        .as_deref()
        .map(|f| f.trim().eq_ignore_ascii_case(value.trim()))
        .unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianAvailability {
    pub technician_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub primary_skill: String,
    #[serde(flatten)]
    pub availability: Availability,
}

/// Technicians marked available on `date`, sorted by name then id.
pub fn list_available_technicians(
    conn: &Connection,
    date: NaiveDate,
    filter: &AvailabilityFilter,
) -> Result<Vec<TechnicianAvailability>> {
    let mut out = Vec::new();
    for row in technicians::available_on(conn, date)? {
        let tech = row.technician;
        if !matches_text(&filter.city, &tech.location.city)
            || !matches_text(&filter.state, &tech.location.state)
        {
            continue;
        }
        if let Some(skill) = &filter.skill {
            if !tech.has_skill(skill) {
                continue;
            }
        }
        let availability = check(conn, &tech.id, date)?;
        out.push(TechnicianAvailability {
            technician_id: tech.id,
            name: tech.name,
            city: tech.location.city,
            state: tech.location.state,
            primary_skill: tech.primary_skill,
            availability,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.technician_id.cmp(&b.technician_id)));
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityCapacity {
    pub city: String,
    pub state: String,
    pub date: NaiveDate,
    pub technician_count: usize,
    pub available_minutes: i64,
    pub assigned_minutes: i64,
    pub remaining_minutes: i64,
}

/// Aggregate capacity of every available technician based in a city.
pub fn city_capacity(
    conn: &Connection,
    date: NaiveDate,
    city: &str,
    state: &str,
) -> Result<CityCapacity> {
    let filter = AvailabilityFilter {
        city: Some(city.to_string()),
        state: Some(state.to_string()),
        skill: None,
    };
    let techs = list_available_technicians(conn, date, &filter)?;

    let available_minutes: i64 = techs.iter().map(|t| t.availability.available_minutes).sum();
    let assigned_minutes: i64 = techs.iter().map(|t| t.availability.assigned_minutes).sum();

    Ok(CityCapacity {
        city: city.to_string(),
        state: state.to_string(),
        date,
        technician_count: techs.len(),
        available_minutes,
        assigned_minutes,
        remaining_minutes: available_minutes - assigned_minutes,
    })
}

/// Soft result of "can this area absorb another job of this length".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityCheck {
    pub sufficient: bool,
    pub available_minutes: i64,
    pub shortage_minutes: i64,
    pub message: String,
}

pub fn check_capacity(
    conn: &Connection,
    city: &str,
    state: &str,
    date: NaiveDate,
    duration_minutes: i64,
) -> Result<CapacityCheck> {
    let cap = city_capacity(conn, date, city, state)?;
    let available = cap.remaining_minutes.max(0);

    if available >= duration_minutes {
        return Ok(CapacityCheck {
            sufficient: true,
            available_minutes: available,
            shortage_minutes: 0,
            message: format!(
                "Sufficient capacity available ({available} min available, {duration_minutes} min needed)"
            ),
        });
    }

    let shortage = duration_minutes - available;
    Ok(CapacityCheck {
        sufficient: false,
        available_minutes: available,
        shortage_minutes: shortage,
        message: format!(
            "Insufficient capacity in {city}, {state} on {date} (need {duration_minutes} min, \
             only {available} min available, shortage: {shortage} min)"
        ),
    })
}
