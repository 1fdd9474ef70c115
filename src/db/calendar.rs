// src/db/calendar.rs
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::CalendarEntry;
use crate::errors::Result;

pub fn get_entry(
    conn: &Connection,
    technician_id: &str,
    date: NaiveDate,
) -> Result<Option<CalendarEntry>> {
    let entry = conn
        .query_row(
            r#"
            SELECT technician_id, date, available, start_time, end_time, max_assignments, reason
            FROM technician_calendar
            WHERE technician_id = ?1 AND date = ?2
            "#,
            params![technician_id, date],
            |row| {
                Ok(CalendarEntry {
                    technician_id: row.get(0)?,
                    date: row.get(1)?,
                    available: row.get::<_, Option<i64>>(2)?.unwrap_or(0) != 0,
                    start_time: row.get(3)?,
                    end_time: row.get(4)?,
                    max_assignments_hours: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                    reason: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

/// Writes a new daily capacity. Returns rows affected (0 if the entry vanished).
pub fn set_max_assignments(
    conn: &Connection,
    technician_id: &str,
    date: NaiveDate,
    hours: i64,
) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE technician_calendar SET max_assignments = ?1 WHERE technician_id = ?2 AND date = ?3",
        params![hours, technician_id, date],
    )?;
    Ok(rows)
}
