// src/db/changes.rs
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{ChangeRecord, Operation, Snapshot};
use crate::errors::Result;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const CHANGE_COLUMNS: &str = r#"
    change_id, timestamp, table_name, operation, record_id,
    old_data, new_data, user_action, can_rollback
"#;

/// Filters for browsing the change log. Results come back newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub table: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeStats {
    pub total_changes: i64,
    pub by_table: BTreeMap<String, i64>,
    pub by_operation: BTreeMap<String, i64>,
    pub changes_today: i64,
}

pub struct NewChange<'a> {
    pub table_name: &'a str,
    pub operation: Operation,
    pub record_id: &'a str,
    pub old_data: Option<&'a Snapshot>,
    pub new_data: Option<&'a Snapshot>,
    pub note: Option<&'a str>,
    pub can_rollback: bool,
}

fn snapshot_to_text(snapshot: Option<&Snapshot>) -> Result<Option<String>> {
    snapshot
        .map(|s| serde_json::to_string(s).map_err(Into::into))
        .transpose()
}

fn text_to_snapshot(raw: Option<String>) -> rusqlite::Result<Option<Snapshot>> {
    match raw {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => serde_json::from_str::<Snapshot>(&text).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

fn row_to_change(row: &Row) -> rusqlite::Result<ChangeRecord> {
    let op_text: String = row.get(3)?;
    let operation = Operation::parse(&op_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ChangeRecord {
        change_id: row.get(0)?,
        timestamp: row.get(1)?,
        table_name: row.get(2)?,
        operation,
        record_id: row.get(4)?,
        old_data: text_to_snapshot(row.get(5)?)?,
        new_data: text_to_snapshot(row.get(6)?)?,
        note: row.get(7)?,
        can_rollback: row.get::<_, i64>(8)? != 0,
    })
}

/// Appends one record and returns its id.
pub fn insert_change(conn: &Connection, change: &NewChange<'_>) -> Result<i64> {
    let now = Utc::now().naive_utc();
    conn.execute(
        r#"
        INSERT INTO change_history
            (timestamp, table_name, operation, record_id, old_data, new_data, user_action, can_rollback)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            now,
            change.table_name,
            change.operation.as_str(),
            change.record_id,
            snapshot_to_text(change.old_data)?,
            snapshot_to_text(change.new_data)?,
            change.note,
            change.can_rollback as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_change(conn: &Connection, change_id: i64) -> Result<Option<ChangeRecord>> {
    let sql = format!("SELECT {CHANGE_COLUMNS} FROM change_history WHERE change_id = ?1");
    let change = conn
        .query_row(&sql, params![change_id], row_to_change)
        .optional()?;
    Ok(change)
}

pub fn mark_not_rollbackable(conn: &Connection, change_id: i64) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE change_history SET can_rollback = 0 WHERE change_id = ?1",
        params![change_id],
    )?;
    Ok(rows)
}

pub fn list_changes(conn: &Connection, filter: &HistoryFilter) -> Result<Vec<ChangeRecord>> {
    let sql = format!(
        r#"
        SELECT {CHANGE_COLUMNS}
        FROM change_history
        WHERE (?1 IS NULL OR table_name = ?1)
          AND (?2 IS NULL OR timestamp >= ?2)
          AND (?3 IS NULL OR timestamp <= ?3)
        ORDER BY timestamp DESC, change_id DESC
        LIMIT ?4 OFFSET ?5
        "#
    );
    let limit = filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(filter.offset.unwrap_or(0)).unwrap_or(0);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.table, filter.start, filter.end, limit, offset],
        row_to_change,
    )?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn grouped_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>> {
    // column is one of two literals below, never caller input
    let sql = format!("SELECT {column}, COUNT(*) FROM change_history GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    let mut out = BTreeMap::new();
    for r in rows {
        let (key, n) = r?;
        out.insert(key, n);
    }
    Ok(out)
}

pub fn change_stats(conn: &Connection) -> Result<ChangeStats> {
    let total_changes: i64 =
        conn.query_row("SELECT COUNT(*) FROM change_history", [], |r| r.get(0))?;

    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    let changes_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM change_history WHERE timestamp >= ?1",
        params![midnight],
        |r| r.get(0),
    )?;

    Ok(ChangeStats {
        total_changes,
        by_table: grouped_counts(conn, "table_name")?,
        by_operation: grouped_counts(conn, "operation")?,
        changes_today,
    })
}

/// Deletes records older than the cutoff, or everything when `None`.
pub fn delete_changes_before(conn: &Connection, cutoff: Option<NaiveDateTime>) -> Result<usize> {
    let rows = match cutoff {
        Some(cutoff) => conn.execute(
            "DELETE FROM change_history WHERE timestamp < ?1",
            params![cutoff],
        )?,
        None => conn.execute("DELETE FROM change_history", [])?,
    };
    Ok(rows)
}

/// Newest change record on `current_dispatches` that wrote the dispatch's
/// `assigned_technician_id`, whatever the operation.
pub fn last_assignment_change(conn: &Connection, dispatch_id: &str) -> Result<Option<ChangeRecord>> {
    let sql = format!(
        r#"
        SELECT {CHANGE_COLUMNS}
        FROM change_history
        WHERE table_name = 'current_dispatches'
          AND record_id = ?1
          AND json_type(new_data, '$.assigned_technician_id') IS NOT NULL
        ORDER BY change_id DESC
        LIMIT 1
        "#
    );
    let change = conn
        .query_row(&sql, params![dispatch_id], row_to_change)
        .optional()?;
    Ok(change)
}
