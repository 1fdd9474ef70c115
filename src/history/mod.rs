//! Append-only audit log of table mutations and the rollback that inverts them.
//!
//! Every function here takes the caller's connection or transaction. Callers
//! that mutate wrap the call in `Database::with_transaction` so the mutation
//! and its change record land together or not at all.

pub mod tables;

use chrono::{Duration, Utc};
use rusqlite::Connection;

use crate::db::changes::{self, ChangeStats, HistoryFilter, NewChange};
use crate::domain::{ChangeRecord, Operation, Snapshot};
use crate::errors::{EngineError, Result};

pub use tables::Table;

/// Appends a rollbackable change record and returns its id.
pub fn log_change(
    conn: &Connection,
    table: Table,
    operation: Operation,
    record_id: &str,
    old_data: Option<&Snapshot>,
    new_data: Option<&Snapshot>,
    note: Option<&str>,
) -> Result<i64> {
    let change_id = changes::insert_change(
        conn,
        &NewChange {
            table_name: table.name(),
            operation,
            record_id,
            old_data,
            new_data,
            note,
            can_rollback: true,
        },
    )?;
    log::debug!("logged change #{change_id}: {operation} {table} {record_id}");
    Ok(change_id)
}

/// Applies the inverse of a change and records the rollback itself.
/// Returns the id of the new `ROLLBACK_*` record.
pub fn rollback(conn: &Connection, change_id: i64) -> Result<i64> {
    let record = changes::get_change(conn, change_id)?
        .ok_or_else(|| EngineError::not_found("change", change_id.to_string()))?;

    if !record.can_rollback {
        return Err(EngineError::NotRollbackable(change_id));
    }
    let tag = record
        .operation
        .rollback_tag()
        .ok_or(EngineError::NotRollbackable(change_id))?;
    let table = Table::parse(&record.table_name)?;

    let rows = match record.operation {
        Operation::Insert => table.delete(conn, &record.record_id)?,
        Operation::Update => {
            let old = record
                .old_data
                .as_ref()
                .ok_or(EngineError::NotRollbackable(change_id))?;
            table.update(conn, &record.record_id, old)?
        }
        Operation::Delete => {
            let old = record
                .old_data
                .as_ref()
                .ok_or(EngineError::NotRollbackable(change_id))?;
            table.insert(conn, old)?
        }
        _ => return Err(EngineError::NotRollbackable(change_id)),
    };

    if rows == 0 {
        return Err(EngineError::not_found(table.name(), record.record_id.clone()));
    }

    changes::mark_not_rollbackable(conn, change_id)?;

    let note = format!("Rollback of change #{change_id}");
    let rollback_id = changes::insert_change(
        conn,
        &NewChange {
            table_name: table.name(),
            operation: tag,
            record_id: &record.record_id,
            old_data: record.new_data.as_ref(),
            new_data: record.old_data.as_ref(),
            note: Some(&note),
            can_rollback: false,
        },
    )?;

    log::info!(
        "rolled back change #{change_id} ({} {} {}) as #{rollback_id}",
        record.operation,
        table,
        record.record_id
    );
    Ok(rollback_id)
}

/// Deletes one row and logs it with the full prior row as `old_data`.
pub fn delete_record(
    conn: &Connection,
    table: Table,
    record_id: &str,
    reason: Option<&str>,
) -> Result<i64> {
    let old = table
        .fetch(conn, record_id)?
        .ok_or_else(|| EngineError::not_found(table.name(), record_id))?;

    if table.delete(conn, record_id)? == 0 {
        return Err(EngineError::not_found(table.name(), record_id));
    }

    let note = reason.unwrap_or("Manual deletion");
    log_change(conn, table, Operation::Delete, record_id, Some(&old), None, Some(note))
}

/// Edits the given fields of one row. `old_data` holds the previous values of
/// exactly the edited fields, so a rollback restores those and nothing else.
pub fn update_record(
    conn: &Connection,
    table: Table,
    record_id: &str,
    fields: &Snapshot,
    note: Option<&str>,
) -> Result<i64> {
    let current = table
        .fetch(conn, record_id)?
        .ok_or_else(|| EngineError::not_found(table.name(), record_id))?;

    // key columns are the record's identity, not editable data
    if let Some(key) = table
        .spec()
        .primary_key
        .iter()
        .find(|k| fields.contains_key(**k))
    {
        return Err(EngineError::invalid(
            "fields",
            format!("key column '{key}' cannot be edited"),
        ));
    }

    let mut old = Snapshot::new();
    for key in fields.keys() {
        if let Some(v) = current.get(key) {
            old.insert(key.clone(), v.clone());
        }
    }

    if table.update(conn, record_id, fields)? == 0 {
        return Err(EngineError::not_found(table.name(), record_id));
    }

    log_change(
        conn,
        table,
        Operation::Update,
        record_id,
        Some(&old),
        Some(fields),
        Some(note.unwrap_or("Manual update")),
    )
}

/// Inserts one row and logs it with the stored row as `new_data`.
pub fn insert_record(
    conn: &Connection,
    table: Table,
    fields: &Snapshot,
    note: Option<&str>,
) -> Result<i64> {
    table.insert(conn, fields)?;

    // autoincrement keys are only known after the insert
    let record_id = match table.record_id_of(fields) {
        Ok(id) => id,
        Err(_) if table.spec().primary_key.len() == 1 => conn.last_insert_rowid().to_string(),
        Err(e) => return Err(e),
    };

    let stored = table
        .fetch(conn, &record_id)?
        .ok_or_else(|| EngineError::Internal(format!("{table} {record_id} missing after insert")))?;

    log_change(
        conn,
        table,
        Operation::Insert,
        &record_id,
        None,
        Some(&stored),
        Some(note.unwrap_or("Manual insert")),
    )
}

pub fn get_history(conn: &Connection, filter: &HistoryFilter) -> Result<Vec<ChangeRecord>> {
    match &filter.table {
        Some(raw) => {
            let canonical = HistoryFilter {
                table: Some(Table::parse(raw)?.name().to_string()),
                ..filter.clone()
            };
            changes::list_changes(conn, &canonical)
        }
        None => changes::list_changes(conn, filter),
    }
}

pub fn stats(conn: &Connection) -> Result<ChangeStats> {
    changes::change_stats(conn)
}

/// Drops records older than `older_than_days`, or all records when `None`.
pub fn clear_history(conn: &Connection, older_than_days: Option<u32>) -> Result<usize> {
    let cutoff = older_than_days.map(|d| Utc::now().naive_utc() - Duration::days(i64::from(d)));
    let removed = changes::delete_changes_before(conn, cutoff)?;
    log::info!("cleared {removed} change records");
    Ok(removed)
}
