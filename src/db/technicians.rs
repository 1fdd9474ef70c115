// src/db/technicians.rs
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Location, Technician};
use crate::errors::Result;

const TECHNICIAN_COLUMNS: &str =
    "t.technician_id, t.name, t.city, t.state, t.latitude, t.longitude, t.primary_skill, t.workload_capacity";

fn row_to_technician(row: &Row) -> rusqlite::Result<Technician> {
    Ok(Technician {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        location: Location {
            city: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            state: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            latitude: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            longitude: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        },
        primary_skill: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        workload_capacity: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
    })
}

pub fn get_technician(conn: &Connection, technician_id: &str) -> Result<Option<Technician>> {
    let sql = format!("SELECT {TECHNICIAN_COLUMNS} FROM technicians t WHERE t.technician_id = ?1");
    let tech = conn
        .query_row(&sql, params![technician_id], row_to_technician)
        .optional()?;
    Ok(tech)
}

/// A technician joined with that day's calendar capacity.
#[derive(Debug, Clone)]
pub struct AvailableTechnician {
    pub technician: Technician,
    pub max_assignments_hours: i64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Technicians with an `available` calendar entry on `date`, ordered by id
/// so downstream ranking is reproducible.
pub fn available_on(conn: &Connection, date: NaiveDate) -> Result<Vec<AvailableTechnician>> {
    let sql = format!(
        r#"
        SELECT {TECHNICIAN_COLUMNS}, c.max_assignments, c.start_time, c.end_time
        FROM technicians t
        JOIN technician_calendar c ON c.technician_id = t.technician_id
        WHERE c.date = ?1 AND c.available = 1
        ORDER BY t.technician_id
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![date], |row| {
        Ok(AvailableTechnician {
            technician: row_to_technician(row)?,
            max_assignments_hours: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
            start_time: row.get(9)?,
            end_time: row.get(10)?,
        })
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Share of a technician's logged history rows that ended in completion.
/// `None` when there is no history to judge by.
pub fn completion_ratio(conn: &Connection, technician_id: &str) -> Result<Option<f64>> {
    let (total, completed): (i64, i64) = conn.query_row(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN lower(action) = 'completed' THEN 1 ELSE 0 END), 0)
        FROM dispatch_history
        WHERE technician_id = ?1
        "#,
        params![technician_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    if total == 0 {
        return Ok(None);
    }
    Ok(Some(completed as f64 / total as f64))
}
