// src/db/dispatches.rs
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Dispatch, Location, Priority};
use crate::errors::Result;

const DISPATCH_COLUMNS: &str = r#"
    dispatch_id, city, state, customer_latitude, customer_longitude,
    appointment_start_datetime, duration_min, required_skill, priority,
    assigned_technician_id
"#;

// Stored priority text -> rank. Anything unrecognised sorts as Medium.
const PRIORITY_RANK_SQL: &str = r#"
    CASE lower(trim(priority))
        WHEN 'critical' THEN 4
        WHEN 'high' THEN 3
        WHEN 'low' THEN 1
        ELSE 2
    END
"#;

const UNASSIGNED_SQL: &str = "(assigned_technician_id IS NULL OR trim(assigned_technician_id) = '')";

fn row_to_dispatch(row: &Row) -> rusqlite::Result<Dispatch> {
    let assigned: Option<String> = row.get(9)?;
    Ok(Dispatch {
        id: row.get(0)?,
        location: Location {
            city: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            state: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            latitude: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            longitude: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        },
        appointment_start: row.get(5)?,
        duration_minutes: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        required_skill: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        priority: Priority::from_stored(&row.get::<_, Option<String>>(8)?.unwrap_or_default()),
        assigned_technician_id: assigned.filter(|t| !t.trim().is_empty()),
    })
}

fn collect(stmt: &mut rusqlite::Statement<'_>, params: impl rusqlite::Params) -> Result<Vec<Dispatch>> {
    let rows = stmt.query_map(params, row_to_dispatch)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get_dispatch(conn: &Connection, dispatch_id: &str) -> Result<Option<Dispatch>> {
    let sql = format!("SELECT {DISPATCH_COLUMNS} FROM current_dispatches WHERE dispatch_id = ?1");
    let dispatch = conn
        .query_row(&sql, params![dispatch_id], row_to_dispatch)
        .optional()?;
    Ok(dispatch)
}

/// Unassigned dispatches for a day in fetch-precedence order:
/// priority rank desc, appointment asc, id asc.
pub fn unassigned_for_date(
    conn: &Connection,
    date: NaiveDate,
    city: Option<&str>,
    state: Option<&str>,
    limit: usize,
) -> Result<Vec<Dispatch>> {
    let sql = format!(
        r#"
        SELECT {DISPATCH_COLUMNS}
        FROM current_dispatches
        WHERE {UNASSIGNED_SQL}
          AND date(appointment_start_datetime) = ?1
          AND (?2 IS NULL OR lower(trim(city)) = lower(trim(?2)))
          AND (?3 IS NULL OR lower(trim(state)) = lower(trim(?3)))
        ORDER BY {PRIORITY_RANK_SQL} DESC, appointment_start_datetime ASC, dispatch_id ASC
        LIMIT ?4
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    collect(&mut stmt, params![date, city, state, limit])
}

/// Minutes of work booked against a technician on a day. Recomputed from the
/// dispatch table on every call; there is no running counter to drift.
pub fn assigned_minutes(conn: &Connection, technician_id: &str, date: NaiveDate) -> Result<i64> {
    let minutes: i64 = conn.query_row(
        r#"
        SELECT COALESCE(SUM(duration_min), 0)
        FROM current_dispatches
        WHERE assigned_technician_id = ?1
          AND date(appointment_start_datetime) = ?2
        "#,
        params![technician_id, date],
        |r| r.get(0),
    )?;
    Ok(minutes)
}

/// Dispatches assigned to a technician, optionally limited to one day.
pub fn assigned_to(
    conn: &Connection,
    technician_id: &str,
    date: Option<NaiveDate>,
) -> Result<Vec<Dispatch>> {
    let sql = format!(
        r#"
        SELECT {DISPATCH_COLUMNS}
        FROM current_dispatches
        WHERE assigned_technician_id = ?1
          AND (?2 IS NULL OR date(appointment_start_datetime) = ?2)
        ORDER BY appointment_start_datetime ASC, dispatch_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    collect(&mut stmt, params![technician_id, date])
}

/// Every dispatch that currently has a technician.
pub fn all_assigned(conn: &Connection) -> Result<Vec<Dispatch>> {
    let sql = format!(
        r#"
        SELECT {DISPATCH_COLUMNS}
        FROM current_dispatches
        WHERE NOT {UNASSIGNED_SQL}
        ORDER BY dispatch_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    collect(&mut stmt, [])
}

/// `Some(None)` for an unassigned dispatch, `None` when the dispatch is gone.
pub fn current_assignee(conn: &Connection, dispatch_id: &str) -> Result<Option<Option<String>>> {
    let assignee = conn
        .query_row(
            "SELECT assigned_technician_id FROM current_dispatches WHERE dispatch_id = ?1",
            params![dispatch_id],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(assignee.map(|a| a.filter(|t| !t.trim().is_empty())))
}

/// Returns rows affected.
pub fn set_assigned_technician(
    conn: &Connection,
    dispatch_id: &str,
    technician_id: Option<&str>,
) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE current_dispatches SET assigned_technician_id = ?1 WHERE dispatch_id = ?2",
        params![technician_id, dispatch_id],
    )?;
    Ok(rows)
}
