// src/capacity/bindings.rs
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{adjust_capacity_strict, hours_for_dispatch};
use crate::db::{changes, dispatches, technicians, Database};
use crate::domain::location::TravelModel;
use crate::domain::{Dispatch, Operation};
use crate::errors::Result;
use crate::scheduler::AUTO_ASSIGN_NOTE;

/// Hours a commit took from a technician's day for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub technician_id: String,
    pub date: NaiveDate,
    pub hours_deducted: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoredBinding {
    pub dispatch_id: String,
    pub technician_id: String,
    pub date: NaiveDate,
    pub hours_restored: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub restored: Vec<RestoredBinding>,
    pub rebuilt: usize,
    pub failed: Vec<String>,
}

/// Process-lifetime map of dispatch_id -> deducted binding. Not persisted;
/// missing entries are rebuilt from committed assignments in the change log.
#[derive(Debug, Default)]
pub struct AssignmentBindings {
    inner: Mutex<HashMap<String, Binding>>,
}

impl AssignmentBindings {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Binding>> {
        // the map holds plain data; a panic elsewhere cannot leave it half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&self, dispatch_id: &str, binding: Binding) {
        self.lock().insert(dispatch_id.to_string(), binding);
    }

    pub fn get(&self, dispatch_id: &str) -> Option<Binding> {
        self.lock().get(dispatch_id).cloned()
    }

    pub fn remove(&self, dispatch_id: &str) -> Option<Binding> {
        self.lock().remove(dispatch_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn entries(&self) -> Vec<(String, Binding)> {
        let mut all: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Adds bindings for assigned dispatches this process has not seen but
    /// whose current assignment was committed. Returns how many were added.
    pub fn rebuild_missing(
        &self,
        conn: &Connection,
        travel: &TravelModel,
        skip: &HashSet<String>,
    ) -> Result<usize> {
        let mut added = 0;
        for dispatch in dispatches::all_assigned(conn)? {
            if skip.contains(&dispatch.id) || self.get(&dispatch.id).is_some() {
                continue;
            }
            if let Some(binding) = committed_binding(conn, &dispatch, travel)? {
                self.track(&dispatch.id, binding);
                added += 1;
            }
        }
        if added > 0 {
            log::debug!("rebuilt {added} assignment bindings from the change log");
        }
        Ok(added)
    }
}

/// The deduction behind a dispatch's current assignment, recovered from the
/// change log. `None` unless the newest change that set the assignee is a
/// commit naming the same technician; direct edits and rollbacks move the
/// assignee without touching capacity.
pub fn committed_binding(
    conn: &Connection,
    dispatch: &Dispatch,
    travel: &TravelModel,
) -> Result<Option<Binding>> {
    let Some(tech_id) = dispatch.assigned_technician_id.as_deref() else {
        return Ok(None);
    };
    let Some(change) = changes::last_assignment_change(conn, &dispatch.id)? else {
        return Ok(None);
    };
    let committed = change.operation == Operation::Update
        && change.note.as_deref() == Some(AUTO_ASSIGN_NOTE)
        && change
            .new_data
            .as_ref()
            .and_then(|d| d.get("assigned_technician_id"))
            .and_then(|v| v.as_str())
            == Some(tech_id);
    if !committed {
        return Ok(None);
    }
    let Some(tech) = technicians::get_technician(conn, tech_id)? else {
        log::warn!("dispatch {} assigned to unknown technician {tech_id}", dispatch.id);
        return Ok(None);
    };
    Ok(Some(Binding {
        technician_id: tech.id.clone(),
        date: dispatch.appointment_date(),
        hours_deducted: hours_for_dispatch(dispatch, &tech, travel),
    }))
}

/// Restores hours for every tracked binding whose dispatch is now unassigned,
/// reassigned, or gone. Each restoration is its own transaction; a failed one
/// is logged, dropped from the map and reported.
pub fn reconcile(
    db: &Database,
    bindings: &AssignmentBindings,
    travel: &TravelModel,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let mut touched = HashSet::new();

    for (dispatch_id, binding) in bindings.entries() {
        let outcome = db.with_transaction(|tx| {
            let current = dispatches::current_assignee(tx, &dispatch_id)?;
            if current.flatten().as_deref() == Some(binding.technician_id.as_str()) {
                return Ok(false);
            }
            adjust_capacity_strict(
                tx,
                &binding.technician_id,
                binding.date,
                binding.hours_deducted,
                true,
            )?;
            Ok(true)
        });

        match outcome {
            Ok(false) => {}
            Ok(true) => {
                bindings.remove(&dispatch_id);
                touched.insert(dispatch_id.clone());
                log::info!(
                    "restored {}h to {} on {} after dispatch {dispatch_id} lost its assignment",
                    binding.hours_deducted,
                    binding.technician_id,
                    binding.date
                );
                report.restored.push(RestoredBinding {
                    dispatch_id,
                    technician_id: binding.technician_id,
                    date: binding.date,
                    hours_restored: binding.hours_deducted,
                });
            }
            Err(e) => {
                log::warn!("could not restore capacity for dispatch {dispatch_id}: {e}");
                bindings.remove(&dispatch_id);
                touched.insert(dispatch_id.clone());
                report.failed.push(format!("{dispatch_id}: {e}"));
            }
        }
    }

    report.rebuilt = db.with_conn(|conn| bindings.rebuild_missing(conn, travel, &touched))?;
    Ok(report)
}
