use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::EngineConfig;
use crate::db::connection::{init_db, Database};
use crate::engine::DispatchEngine;
use crate::errors::Result;

static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

// Downtown Austin. Offsets below are degrees of latitude.
pub const BASE_LAT: f64 = 30.2672;
pub const BASE_LON: f64 = -97.7431;
pub const KM_PER_DEG_LAT: f64 = 111.195;

pub const DAY: &str = "2025-06-02";

pub fn day() -> NaiveDate {
    date(DAY)
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("test date")
}

/// Latitude `km` kilometres north of the base point.
pub fn lat_north(km: f64) -> f64 {
    BASE_LAT + km / KM_PER_DEG_LAT
}

fn fresh_path(tag: &str) -> PathBuf {
    let n = NEXT_DB.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "dispatch_engine_{tag}_{}_{n}.sqlite",
        std::process::id()
    ));
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
    path
}

/// Fresh on-disk database with the production schema applied.
pub fn init_test_db(tag: &str) -> Database {
    let db = Database::new(fresh_path(tag).display().to_string());
    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));
    db
}

pub fn test_engine(tag: &str) -> DispatchEngine {
    test_engine_with(tag, EngineConfig::default())
}

pub fn test_engine_with(tag: &str, config: EngineConfig) -> DispatchEngine {
    DispatchEngine::with_database(init_test_db(tag), config)
}

pub fn add_technician(
    conn: &Connection,
    id: &str,
    name: &str,
    skill: &str,
    city: &str,
    lat: f64,
    lon: f64,
) -> Result<()> {
    conn.execute(
        "insert into technicians (technician_id, name, primary_skill, city, state, latitude, longitude, workload_capacity)
         values (?1, ?2, ?3, ?4, 'TX', ?5, ?6, 8)",
        params![id, name, skill, city, lat, lon],
    )?;
    Ok(())
}

pub fn add_calendar(
    conn: &Connection,
    technician_id: &str,
    day: &str,
    available: bool,
    max_hours: i64,
    reason: Option<&str>,
) -> Result<()> {
    conn.execute(
        "insert into technician_calendar (technician_id, date, day_of_week, available, start_time, end_time, reason, max_assignments)
         values (?1, ?2, 'Monday', ?3, '08:00', '17:00', ?4, ?5)",
        params![technician_id, day, available as i64, reason, max_hours],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn add_dispatch(
    conn: &Connection,
    id: &str,
    city: &str,
    lat: f64,
    lon: f64,
    start: &str,
    duration_min: i64,
    skill: &str,
    priority: &str,
) -> Result<()> {
    conn.execute(
        "insert into current_dispatches
            (dispatch_id, priority, required_skill, city, state, customer_latitude, customer_longitude,
             appointment_start_datetime, duration_min)
         values (?1, ?2, ?3, ?4, 'TX', ?5, ?6, ?7, ?8)",
        params![id, priority, skill, city, lat, lon, start, duration_min],
    )?;
    Ok(())
}

pub fn set_assignee(conn: &Connection, dispatch_id: &str, technician_id: Option<&str>) -> Result<()> {
    conn.execute(
        "update current_dispatches set assigned_technician_id = ?1 where dispatch_id = ?2",
        params![technician_id, dispatch_id],
    )?;
    Ok(())
}

pub fn max_hours(db: &Database, technician_id: &str, day: &str) -> i64 {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "select max_assignments from technician_calendar where technician_id = ?1 and date = ?2",
            params![technician_id, day],
            |r| r.get::<_, i64>(0),
        )?)
    })
    .expect("calendar row")
}

pub fn assignee(db: &Database, dispatch_id: &str) -> Option<String> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "select assigned_technician_id from current_dispatches where dispatch_id = ?1",
            params![dispatch_id],
            |r| r.get::<_, Option<String>>(0),
        )?)
    })
    .expect("dispatch row")
}

pub fn change_count(db: &Database) -> i64 {
    db.with_conn(|conn| {
        Ok(conn.query_row("select count(*) from change_history", [], |r| r.get(0))?)
    })
    .expect("count")
}
