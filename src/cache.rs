// src/cache.rs
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::db::technicians;
use crate::domain::Technician;
use crate::errors::Result;

/// Technician rows by id, owned by one engine. Entries are dropped whenever
/// the engine writes to a technician or anything that may have touched one
/// (commit, direct edit, delete, rollback).
#[derive(Debug, Default)]
pub struct TechnicianCache {
    entries: RwLock<HashMap<String, Technician>>,
}

impl TechnicianCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Technician>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Technician>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Cached row, or a fresh read that is then cached. Unknown ids are not cached.
    pub fn get_or_load(&self, conn: &Connection, technician_id: &str) -> Result<Option<Technician>> {
        if let Some(hit) = self.read().get(technician_id) {
            return Ok(Some(hit.clone()));
        }
        let loaded = technicians::get_technician(conn, technician_id)?;
        if let Some(tech) = &loaded {
            self.write().insert(tech.id.clone(), tech.clone());
        }
        Ok(loaded)
    }

    pub fn invalidate(&self, technician_id: &str) {
        self.write().remove(technician_id);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
