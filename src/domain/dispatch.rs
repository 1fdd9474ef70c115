// src/domain/dispatch.rs

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use super::location::Location;
use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    /// Strict parse used on caller input.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(EngineError::invalid(
                "priority",
                format!("unknown priority '{other}', expected Low, Medium, High or Critical"),
            )),
        }
    }

    /// Lenient parse for stored rows: anything unrecognised ranks as Medium.
    pub fn from_stored(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Priority::Medium)
    }

    /// Normalized scoring factor in (0, 1].
    pub fn factor(self) -> f64 {
        match self {
            Priority::Low => 0.25,
            Priority::Medium => 0.5,
            Priority::High => 0.75,
            Priority::Critical => 1.0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer service request as stored in `current_dispatches`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub id: String,
    pub location: Location,
    pub appointment_start: NaiveDateTime,
    pub duration_minutes: i64,
    pub required_skill: String,
    pub priority: Priority,
    pub assigned_technician_id: Option<String>,
}

impl Dispatch {
    pub fn appointment_date(&self) -> NaiveDate {
        self.appointment_start.date()
    }
}

/// Parses a `YYYY-MM-DD` date from caller input.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::invalid("date", format!("'{raw}' is not in YYYY-MM-DD format")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!(Priority::parse(" critical ").unwrap(), Priority::Critical);
        assert_eq!(Priority::parse("HIGH").unwrap(), Priority::High);
        assert!(matches!(
            Priority::parse("urgent"),
            Err(EngineError::InvalidInput { field: "priority", .. })
        ));
    }

    #[test]
    fn stored_priority_falls_back_to_medium() {
        assert_eq!(Priority::from_stored(""), Priority::Medium);
        assert_eq!(Priority::from_stored("Low"), Priority::Low);
    }

    #[test]
    fn priorities_order_by_urgency() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn parse_date_rejects_bad_format() {
        assert_eq!(
            parse_date("2025-06-02").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
        assert!(parse_date("06/02/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
    }
}
