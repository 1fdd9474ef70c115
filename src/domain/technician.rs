// src/domain/technician.rs

use serde::Serialize;

use super::location::Location;

/// A field worker as stored in `technicians`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Technician {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub primary_skill: String,
    /// Informational only. Availability is decided by the calendar.
    pub workload_capacity: i64,
}

impl Technician {
    /// An empty required skill matches everyone.
    pub fn has_skill(&self, required: &str) -> bool {
        let required = required.trim();
        required.is_empty() || self.primary_skill.trim().eq_ignore_ascii_case(required)
    }
}
