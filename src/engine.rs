// src/engine.rs
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::availability::{self, Availability, AvailabilityFilter, CapacityCheck, CityCapacity, TechnicianAvailability};
use crate::cache::TechnicianCache;
use crate::capacity::{self, AssignmentBindings, ReconcileReport};
use crate::config::EngineConfig;
use crate::db::{dispatches, init_db, ChangeStats, Database, HistoryFilter};
use crate::domain::calendar::calendar_record_id;
use crate::domain::{CalendarUpdate, ChangeRecord, Dispatch, Operation, Snapshot};
use crate::errors::{EngineError, Result};
use crate::history::{self, Table};
use crate::matching::{self, Candidate, MatchSettings};
use crate::scheduler::{self, AssignFilters, AssignOptions, AssignmentRequest, AutoAssignResult, CommitResult};

/// Dispatches booked against one technician.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianAssignments {
    pub technician_id: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub dispatches: Vec<Dispatch>,
    pub total_assignments: usize,
    pub total_minutes: i64,
}

/// Entry point for callers. Owns the database handle, the assignment
/// bindings and the technician cache; safe to share across worker threads.
pub struct DispatchEngine {
    db: Database,
    config: EngineConfig,
    settings: MatchSettings,
    bindings: AssignmentBindings,
    cache: TechnicianCache,
}

impl DispatchEngine {
    /// Opens the database named in `config` and applies the schema.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db = Database::new(config.database_path.clone()).with_busy_timeout(config.busy_timeout);
        init_db(&db)?;
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: EngineConfig) -> Self {
        let settings = MatchSettings::from(&config);
        Self {
            db,
            config,
            settings,
            bindings: AssignmentBindings::new(),
            cache: TechnicianCache::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bindings(&self) -> &AssignmentBindings {
        &self.bindings
    }

    pub fn cache(&self) -> &TechnicianCache {
        &self.cache
    }

    // ---- availability ----

    pub fn check_availability(&self, technician_id: &str, date: NaiveDate) -> Result<Availability> {
        self.db.with_conn(|conn| {
            self.cache
                .get_or_load(conn, technician_id)?
                .ok_or_else(|| EngineError::not_found("technician", technician_id))?;
            availability::check(conn, technician_id, date)
        })
    }

    pub fn list_available_technicians(
        &self,
        date: NaiveDate,
        filter: &AvailabilityFilter,
    ) -> Result<Vec<TechnicianAvailability>> {
        self.db
            .with_conn(|conn| availability::list_available_technicians(conn, date, filter))
    }

    pub fn city_capacity(&self, date: NaiveDate, city: &str, state: &str) -> Result<CityCapacity> {
        self.db
            .with_conn(|conn| availability::city_capacity(conn, date, city, state))
    }

    pub fn check_capacity(
        &self,
        city: &str,
        state: &str,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> Result<CapacityCheck> {
        if duration_minutes <= 0 {
            return Err(EngineError::invalid("duration_min", "must be positive"));
        }
        self.db
            .with_conn(|conn| availability::check_capacity(conn, city, state, date, duration_minutes))
    }

    pub fn technician_assignments(
        &self,
        technician_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<TechnicianAssignments> {
        self.db.with_conn(|conn| {
            let tech = self
                .cache
                .get_or_load(conn, technician_id)?
                .ok_or_else(|| EngineError::not_found("technician", technician_id))?;
            let booked = dispatches::assigned_to(conn, technician_id, date)?;
            let total_minutes = booked.iter().map(|d| d.duration_minutes).sum();
            Ok(TechnicianAssignments {
                technician_id: tech.id,
                name: tech.name,
                date,
                total_assignments: booked.len(),
                dispatches: booked,
                total_minutes,
            })
        })
    }

    // ---- capacity ----

    pub fn assigned_minutes(&self, technician_id: &str, date: NaiveDate) -> Result<i64> {
        self.db
            .with_conn(|conn| capacity::assigned_minutes(conn, technician_id, date))
    }

    /// Deducts or restores hours in its own transaction.
    pub fn adjust_capacity(
        &self,
        technician_id: &str,
        date: NaiveDate,
        hours: i64,
        restore: bool,
    ) -> Result<bool> {
        self.db
            .with_transaction(|tx| capacity::adjust_capacity(tx, technician_id, date, hours, restore))
    }

    pub fn hours_for_dispatch(&self, dispatch_id: &str, technician_id: &str) -> Result<i64> {
        self.db.with_conn(|conn| {
            let dispatch = dispatches::get_dispatch(conn, dispatch_id)?
                .ok_or_else(|| EngineError::not_found("dispatch", dispatch_id))?;
            let tech = self
                .cache
                .get_or_load(conn, technician_id)?
                .ok_or_else(|| EngineError::not_found("technician", technician_id))?;
            Ok(capacity::hours_for_dispatch(&dispatch, &tech, &self.settings.travel))
        })
    }

    /// Restores hours for dispatches whose tracked assignment changed or
    /// disappeared since it was committed.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let report = capacity::bindings::reconcile(&self.db, &self.bindings, &self.settings.travel)?;
        for restored in &report.restored {
            self.cache.invalidate(&restored.technician_id);
        }
        Ok(report)
    }

    // ---- matching and scheduling ----

    pub fn find_candidates(&self, dispatch_id: &str, enable_range_expansion: bool) -> Result<Vec<Candidate>> {
        self.db.with_conn(|conn| {
            let dispatch = dispatches::get_dispatch(conn, dispatch_id)?
                .ok_or_else(|| EngineError::not_found("dispatch", dispatch_id))?;
            matching::find_candidates(conn, &dispatch, &self.settings, enable_range_expansion)
        })
    }

    pub fn auto_assign(
        &self,
        date: NaiveDate,
        filters: &AssignFilters,
        options: AssignOptions,
    ) -> Result<AutoAssignResult> {
        let result = scheduler::auto_assign(
            &self.db,
            &self.settings,
            &self.bindings,
            self.config.unassigned_batch_limit,
            date,
            filters,
            options,
        )?;
        if let Some(commit) = &result.commit {
            self.invalidate_committed(commit);
        }
        Ok(result)
    }

    pub fn commit(&self, requests: &[AssignmentRequest]) -> CommitResult {
        let result = scheduler::commit(&self.db, &self.settings, &self.bindings, requests);
        self.invalidate_committed(&result);
        result
    }

    fn invalidate_committed(&self, result: &CommitResult) {
        for done in &result.committed {
            self.cache.invalidate(&done.technician_id);
        }
    }

    // ---- change history ----

    pub fn log_change(
        &self,
        table: Table,
        operation: Operation,
        record_id: &str,
        old_data: Option<&Snapshot>,
        new_data: Option<&Snapshot>,
        note: Option<&str>,
    ) -> Result<i64> {
        self.db.with_conn(|conn| {
            history::log_change(conn, table, operation, record_id, old_data, new_data, note)
        })
    }

    pub fn get_history(&self, filter: &HistoryFilter) -> Result<Vec<ChangeRecord>> {
        self.db.with_conn(|conn| history::get_history(conn, filter))
    }

    pub fn get_stats(&self) -> Result<ChangeStats> {
        self.db.with_conn(|conn| history::stats(conn))
    }

    pub fn clear_history(&self, older_than_days: Option<u32>) -> Result<usize> {
        self.db
            .with_transaction(|tx| history::clear_history(tx, older_than_days))
    }

    /// Inverts a change. Returns the id of the rollback record.
    pub fn rollback(&self, change_id: i64) -> Result<i64> {
        let rollback_id = self.db.with_transaction(|tx| history::rollback(tx, change_id))?;
        self.cache.clear();
        self.reconcile_after("rollback");
        Ok(rollback_id)
    }

    pub fn delete_record(&self, table: &str, record_id: &str, reason: Option<&str>) -> Result<i64> {
        let table = Table::parse(table)?;
        let change_id = self
            .db
            .with_transaction(|tx| history::delete_record(tx, table, record_id, reason))?;
        self.invalidate_for(table, record_id);
        self.reconcile_after("delete");
        Ok(change_id)
    }

    pub fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: &Snapshot,
        note: Option<&str>,
    ) -> Result<i64> {
        let table = Table::parse(table)?;
        let change_id = self
            .db
            .with_transaction(|tx| history::update_record(tx, table, record_id, fields, note))?;
        self.invalidate_for(table, record_id);
        Ok(change_id)
    }

    pub fn insert_record(&self, table: &str, fields: &Snapshot, note: Option<&str>) -> Result<i64> {
        let table = Table::parse(table)?;
        self.db
            .with_transaction(|tx| history::insert_record(tx, table, fields, note))
    }

    /// Partial edit of one calendar day. With `permanent_move`, a new city or
    /// state is also written to the technician. Each table edit is logged once.
    /// Returns the change ids written.
    pub fn update_calendar_entry(
        &self,
        technician_id: &str,
        date: NaiveDate,
        update: &CalendarUpdate,
        permanent_move: bool,
    ) -> Result<Vec<i64>> {
        if update.is_empty() {
            return Err(EngineError::invalid("update", "no fields to update"));
        }
        if let Some(hours) = update.max_assignments_hours {
            if hours < 0 {
                return Err(EngineError::invalid("max_assignments", "cannot be negative"));
            }
        }

        let mut calendar_fields = Snapshot::new();
        if let Some(available) = update.available {
            calendar_fields.insert("available".into(), Value::from(i64::from(available)));
        }
        if let Some(start) = &update.start_time {
            calendar_fields.insert("start_time".into(), Value::from(start.clone()));
        }
        if let Some(end) = &update.end_time {
            calendar_fields.insert("end_time".into(), Value::from(end.clone()));
        }
        if let Some(hours) = update.max_assignments_hours {
            calendar_fields.insert("max_assignments".into(), Value::from(hours));
        }
        if let Some(reason) = &update.reason {
            calendar_fields.insert("reason".into(), Value::from(reason.clone()));
        }

        let mut technician_fields = Snapshot::new();
        if permanent_move {
            if let Some(city) = update.city.as_deref().filter(|c| !c.trim().is_empty()) {
                technician_fields.insert("city".into(), Value::from(city.trim()));
            }
            if let Some(state) = update.state.as_deref().filter(|s| !s.trim().is_empty()) {
                technician_fields.insert("state".into(), Value::from(state.trim()));
            }
        }

        if calendar_fields.is_empty() && technician_fields.is_empty() {
            return Err(EngineError::invalid(
                "update",
                "city and state only apply to a permanent move",
            ));
        }

        let record_id = calendar_record_id(technician_id, date);
        let change_ids = self.db.with_transaction(|tx| {
            let mut ids = Vec::new();
            if Table::Calendar.fetch(tx, &record_id)?.is_none() {
                return Err(EngineError::not_found("calendar entry", record_id.clone()));
            }
            if !calendar_fields.is_empty() {
                ids.push(history::update_record(
                    tx,
                    Table::Calendar,
                    &record_id,
                    &calendar_fields,
                    Some("Calendar update"),
                )?);
            }
            if !technician_fields.is_empty() {
                ids.push(history::update_record(
                    tx,
                    Table::Technicians,
                    technician_id,
                    &technician_fields,
                    Some("Permanent move"),
                )?);
            }
            Ok(ids)
        })?;

        self.cache.invalidate(technician_id);
        log::info!("updated calendar entry {record_id} ({} changes)", change_ids.len());
        Ok(change_ids)
    }

    fn invalidate_for(&self, table: Table, record_id: &str) {
        match table {
            Table::Technicians => self.cache.invalidate(record_id),
            Table::Calendar => {
                if let Some((tech, _)) = record_id.split_once(history::tables::KEY_SEPARATOR) {
                    self.cache.invalidate(tech);
                }
            }
            Table::Dispatches | Table::DispatchHistory => {}
        }
    }

    // Side-channel edits are reconciled best-effort; the edit itself already
    // committed, so a reconcile failure is logged rather than returned.
    fn reconcile_after(&self, what: &str) {
        match self.reconcile() {
            Ok(report) if !report.failed.is_empty() => {
                log::warn!("reconcile after {what}: {} failures", report.failed.len())
            }
            Ok(_) => {}
            Err(e) => log::warn!("reconcile after {what} failed: {e}"),
        }
    }
}
