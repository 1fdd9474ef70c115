// src/domain/changes.rs

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::{EngineError, Result};

/// Structured row snapshot stored in `old_data` / `new_data`.
pub type Snapshot = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    RollbackInsert,
    RollbackUpdate,
    RollbackDelete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::RollbackInsert => "ROLLBACK_INSERT",
            Operation::RollbackUpdate => "ROLLBACK_UPDATE",
            Operation::RollbackDelete => "ROLLBACK_DELETE",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            "ROLLBACK_INSERT" => Ok(Operation::RollbackInsert),
            "ROLLBACK_UPDATE" => Ok(Operation::RollbackUpdate),
            "ROLLBACK_DELETE" => Ok(Operation::RollbackDelete),
            other => Err(EngineError::invalid(
                "operation",
                format!("unknown operation '{other}'"),
            )),
        }
    }

    /// The tag written when this operation is rolled back.
    /// Rollback records themselves have none.
    pub fn rollback_tag(self) -> Option<Operation> {
        match self {
            Operation::Insert => Some(Operation::RollbackInsert),
            Operation::Update => Some(Operation::RollbackUpdate),
            Operation::Delete => Some(Operation::RollbackDelete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a `json!({...})` object literal into a snapshot.
pub fn snapshot(value: Value) -> Snapshot {
    match value {
        Value::Object(map) => map,
        _ => Snapshot::new(),
    }
}

/// One entry of the append-only change log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub change_id: i64,
    pub timestamp: NaiveDateTime,
    pub table_name: String,
    pub operation: Operation,
    pub record_id: String,
    pub old_data: Option<Snapshot>,
    pub new_data: Option<Snapshot>,
    pub note: Option<String>,
    pub can_rollback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_round_trip_through_text() {
        for op in [
            Operation::Insert,
            Operation::Update,
            Operation::Delete,
            Operation::RollbackInsert,
            Operation::RollbackUpdate,
            Operation::RollbackDelete,
        ] {
            assert_eq!(Operation::parse(op.as_str()).unwrap(), op);
        }
        assert!(Operation::parse("TRUNCATE").is_err());
    }

    #[test]
    fn only_base_operations_have_rollback_tags() {
        assert_eq!(
            Operation::Delete.rollback_tag(),
            Some(Operation::RollbackDelete)
        );
        assert_eq!(Operation::RollbackUpdate.rollback_tag(), None);
    }
}
