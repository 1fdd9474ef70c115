// src/tests/history_tests.rs
use serde_json::json;

use super::utils::*;
use crate::db::HistoryFilter;
use crate::domain::{Operation, Snapshot};
use crate::errors::EngineError;
use crate::history::Table;
use crate::scheduler::AssignmentRequest;

fn fields(value: serde_json::Value) -> Snapshot {
    value.as_object().cloned().expect("object literal")
}

fn seeded(tag: &str) -> crate::engine::DispatchEngine {
    let engine = test_engine(tag);
    engine
        .database()
        .with_conn(|conn| {
            add_technician(conn, "T1", "Tess", "HVAC", "Austin", BASE_LAT, BASE_LON)?;
            add_calendar(conn, "T1", DAY, true, 8, None)?;
            add_dispatch(conn, "D1", "Austin", BASE_LAT, BASE_LON, "2025-06-02 09:00:00", 60, "HVAC", "High")?;
            Ok(())
        })
        .expect("fixtures");
    engine
}

fn fetch(engine: &crate::engine::DispatchEngine, table: Table, id: &str) -> Option<Snapshot> {
    engine
        .database()
        .with_conn(|conn| table.fetch(conn, id))
        .expect("fetch")
}

#[test]
fn deleted_technician_comes_back_identical() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_delete");
    let before = fetch(&engine, Table::Technicians, "T1").expect("row");

    let change_id = engine.delete_record("technicians", "T1", Some("left the company"))?;
    assert!(fetch(&engine, Table::Technicians, "T1").is_none());

    let logged = &engine.get_history(&HistoryFilter::default())?[0];
    assert_eq!(logged.change_id, change_id);
    assert_eq!(logged.operation, Operation::Delete);
    assert_eq!(logged.old_data.as_ref(), Some(&before));
    assert_eq!(logged.new_data, None);
    assert_eq!(logged.note.as_deref(), Some("left the company"));

    engine.rollback(change_id)?;
    assert_eq!(fetch(&engine, Table::Technicians, "T1"), Some(before));
    Ok(())
}

#[test]
fn imported_columns_survive_delete_and_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_imported_column");
    engine.database().with_conn(|conn| {
        conn.execute_batch(
            "alter table technicians add column phone text;
             update technicians set phone = '555-0100' where technician_id = 'T1';",
        )?;
        Ok(())
    })?;

    let change_id = engine.delete_record("technicians", "T1", None)?;
    let logged = &engine.get_history(&HistoryFilter::default())?[0];
    assert_eq!(logged.old_data.as_ref().unwrap()["phone"], "555-0100");

    engine.rollback(change_id)?;
    let phone: Option<String> = engine.database().with_conn(|conn| {
        Ok(conn.query_row("select phone from technicians where technician_id = 'T1'", [], |r| r.get(0))?)
    })?;
    assert_eq!(phone.as_deref(), Some("555-0100"));

    // the new column is editable like any other
    engine.update_record("technicians", "T1", &fields(json!({"phone": "555-0199"})), None)?;
    assert_eq!(fetch(&engine, Table::Technicians, "T1").unwrap()["phone"], "555-0199");
    Ok(())
}

#[test]
fn rollback_is_recorded_and_one_shot() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_one_shot");
    let change_id = engine.delete_record("technicians", "T1", None)?;
    let rollback_id = engine.rollback(change_id)?;
    assert!(rollback_id > change_id);

    let history = engine.get_history(&HistoryFilter::default())?;
    let rb = history.iter().find(|c| c.change_id == rollback_id).expect("rollback record");
    let original = history.iter().find(|c| c.change_id == change_id).expect("original");
    assert_eq!(rb.operation, Operation::RollbackDelete);
    assert!(!rb.can_rollback);
    assert_eq!(rb.old_data, original.new_data);
    assert_eq!(rb.new_data, original.old_data);
    assert!(!original.can_rollback);

    assert!(matches!(engine.rollback(change_id), Err(EngineError::NotRollbackable(id)) if id == change_id));
    assert!(matches!(engine.rollback(rollback_id), Err(EngineError::NotRollbackable(_))));
    assert!(matches!(engine.rollback(9999), Err(EngineError::NotFound { kind: "change", .. })));
    Ok(())
}

#[test]
fn update_and_insert_roll_back_to_prior_state() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_update_insert");
    let before = fetch(&engine, Table::Technicians, "T1");

    let update_id = engine.update_record(
        "technicians",
        "T1",
        &fields(json!({"primary_skill": "Fiber", "latitude": 30.5})),
        None,
    )?;
    let edited = fetch(&engine, Table::Technicians, "T1").expect("row");
    assert_eq!(edited["primary_skill"], "Fiber");

    let logged = engine.get_history(&HistoryFilter::default())?;
    let old = logged[0].old_data.as_ref().expect("old data");
    assert_eq!(old.len(), 2);
    assert_eq!(old["primary_skill"], "HVAC");

    engine.rollback(update_id)?;
    assert_eq!(fetch(&engine, Table::Technicians, "T1"), before);

    let insert_id = engine.insert_record(
        "technician_calendar",
        &fields(json!({"technician_id": "T1", "date": "2025-06-09", "available": 1, "max_assignments": 6})),
        None,
    )?;
    assert!(fetch(&engine, Table::Calendar, "T1|2025-06-09").is_some());
    engine.rollback(insert_id)?;
    assert!(fetch(&engine, Table::Calendar, "T1|2025-06-09").is_none());
    Ok(())
}

#[test]
fn autoincrement_rows_get_their_generated_id() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_autoinc");
    let change_id = engine.insert_record(
        "dispatch_history",
        &fields(json!({"dispatch_id": "D1", "technician_id": "T1", "action": "completed"})),
        Some("import"),
    )?;
    let logged = &engine.get_history(&HistoryFilter::default())?[0];
    assert_eq!(logged.change_id, change_id);
    assert_eq!(logged.record_id, "1");
    assert_eq!(logged.new_data.as_ref().unwrap()["history_id"], 1);
    Ok(())
}

#[test]
fn inverse_that_misses_its_row_leaves_the_record_rollbackable() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_missing_row");
    let insert_id = engine.insert_record(
        "technicians",
        &fields(json!({"technician_id": "T9", "name": "Nine", "city": "Austin", "state": "TX"})),
        None,
    )?;
    engine.database().with_conn(|conn| {
        conn.execute("delete from technicians where technician_id = 'T9'", [])?;
        Ok(())
    })?;

    let err = engine.rollback(insert_id).unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
    let record = engine
        .get_history(&HistoryFilter::default())?
        .into_iter()
        .find(|c| c.change_id == insert_id)
        .expect("record");
    assert!(record.can_rollback);
    Ok(())
}

#[test]
fn edits_are_checked_against_the_table_allow_list() {
    let engine = seeded("hist_allow_list");
    assert!(matches!(
        engine.update_record("technicians", "T1", &fields(json!({"password": "x"})), None),
        Err(EngineError::InvalidInput { field: "fields", .. })
    ));
    assert!(matches!(
        engine.update_record("technicians", "T1", &fields(json!({"technician_id": "T2"})), None),
        Err(EngineError::InvalidInput { .. })
    ));
    assert!(matches!(
        engine.delete_record("change_history", "1", None),
        Err(EngineError::InvalidInput { field: "table", .. })
    ));
    assert!(matches!(
        engine.delete_record("technicians", "GHOST", None),
        Err(EngineError::NotFound { .. })
    ));
    assert_eq!(change_count(engine.database()), 0);
}

#[test]
fn rolling_back_an_assignment_restores_capacity() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_unassign");
    let result = engine.commit(&[AssignmentRequest {
        dispatch_id: "D1".into(),
        technician_id: "T1".into(),
    }]);
    let assignment_change = result.committed[0].change_id;
    assert_eq!(max_hours(engine.database(), "T1", DAY), 7);

    engine.rollback(assignment_change)?;
    assert_eq!(assignee(engine.database(), "D1"), None);
    assert_eq!(max_hours(engine.database(), "T1", DAY), 8);
    assert!(engine.bindings().get("D1").is_none());
    Ok(())
}

#[test]
fn stats_and_filtered_history() -> Result<(), Box<dyn std::error::Error>> {
    let engine = seeded("hist_stats");
    engine.adjust_capacity("T1", day(), 1, false)?;
    engine.adjust_capacity("T1", day(), 1, true)?;
    let delete_id = engine.delete_record("current_dispatches", "D1", None)?;
    engine.rollback(delete_id)?;

    let stats = engine.get_stats()?;
    assert_eq!(stats.total_changes, 4);
    assert_eq!(stats.changes_today, 4);
    assert_eq!(stats.by_table.get("technician_calendar"), Some(&2));
    assert_eq!(stats.by_table.get("current_dispatches"), Some(&2));
    assert_eq!(stats.by_operation.get("UPDATE"), Some(&2));
    assert_eq!(stats.by_operation.get("ROLLBACK_DELETE"), Some(&1));

    let calendar_only = engine.get_history(&HistoryFilter {
        table: Some("TECHNICIAN_CALENDAR".into()),
        limit: Some(1),
        ..HistoryFilter::default()
    })?;
    assert_eq!(calendar_only.len(), 1);
    assert_eq!(calendar_only[0].table_name, "technician_calendar");
    assert_eq!(calendar_only[0].note.as_deref(), Some("Capacity restored: +1h"));

    assert!(engine
        .get_history(&HistoryFilter {
            table: Some("sessions".into()),
            ..HistoryFilter::default()
        })
        .is_err());

    assert_eq!(engine.clear_history(Some(30))?, 0);
    assert_eq!(engine.clear_history(None)?, 4);
    assert_eq!(engine.get_stats()?.total_changes, 0);
    Ok(())
}
