// src/domain/calendar.rs

use chrono::NaiveDate;
use serde::Serialize;

/// One technician's availability for one day, keyed by (technician_id, date).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub technician_id: String,
    pub date: NaiveDate,
    pub available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Daily capacity in whole hours. Never negative.
    pub max_assignments_hours: i64,
    pub reason: Option<String>,
}

impl CalendarEntry {
    pub fn capacity_minutes(&self) -> i64 {
        self.max_assignments_hours * super::location::MINUTES_PER_HOUR
    }

    /// Record id used for change records on `technician_calendar`.
    pub fn record_id(&self) -> String {
        calendar_record_id(&self.technician_id, self.date)
    }
}

pub fn calendar_record_id(technician_id: &str, date: NaiveDate) -> String {
    format!("{}|{}", technician_id, date.format("%Y-%m-%d"))
}

/// Partial edit of a calendar entry; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct CalendarUpdate {
    pub available: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_assignments_hours: Option<i64>,
    pub reason: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl CalendarUpdate {
    pub fn is_empty(&self) -> bool {
        self.available.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.max_assignments_hours.is_none()
            && self.reason.is_none()
            && self.city.is_none()
            && self.state.is_none()
    }
}
