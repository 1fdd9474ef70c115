// src/history/tables.rs
//
// Closed mapping from audited table name to its key columns. Column names in
// generated statements are either key columns from this mapping or names
// confirmed against the table's live columns; caller data travels as bound
// parameters.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{Number, Value};
use std::fmt;

use crate::domain::Snapshot;
use crate::errors::{EngineError, Result};

/// Separator used to join composite keys into one record id.
pub const KEY_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Technicians,
    Calendar,
    Dispatches,
    DispatchHistory,
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub primary_key: &'static [&'static str],
}

static TECHNICIANS: TableSpec = TableSpec {
    name: "technicians",
    primary_key: &["technician_id"],
};

static CALENDAR: TableSpec = TableSpec {
    name: "technician_calendar",
    primary_key: &["technician_id", "date"],
};

static DISPATCHES: TableSpec = TableSpec {
    name: "current_dispatches",
    primary_key: &["dispatch_id"],
};

static DISPATCH_HISTORY: TableSpec = TableSpec {
    name: "dispatch_history",
    primary_key: &["history_id"],
};

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Technicians,
        Table::Calendar,
        Table::Dispatches,
        Table::DispatchHistory,
    ];

    pub fn spec(self) -> &'static TableSpec {
        match self {
            Table::Technicians => &TECHNICIANS,
            Table::Calendar => &CALENDAR,
            Table::Dispatches => &DISPATCHES,
            Table::DispatchHistory => &DISPATCH_HISTORY,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Resolves a caller-supplied table name against the audited tables.
    ///
    /// Unknown names are rejected outright. There is no fallback to an `id`
    /// key column for tables outside this list, so no statement is ever built
    /// around a caller-chosen table name.
    pub fn parse(raw: &str) -> Result<Table> {
        let raw = raw.trim();
        Table::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(raw))
            .ok_or_else(|| EngineError::invalid("table", format!("'{raw}' is not an audited table")))
    }

    /// Current column names, including any added after the schema was applied.
    pub fn columns(self, conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", self.name()))?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(1))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn check_fields(self, conn: &Connection, snapshot: &Snapshot) -> Result<()> {
        let columns = self.columns(conn)?;
        if let Some(bad) = snapshot.keys().find(|k| !columns.iter().any(|c| c == *k)) {
            return Err(EngineError::invalid(
                "fields",
                format!("'{bad}' is not a column of {}", self.name()),
            ));
        }
        Ok(())
    }

    /// Splits a record id into one value per key column.
    pub fn key_values(self, record_id: &str) -> Result<Vec<String>> {
        let pk = self.spec().primary_key;
        let parts: Vec<String> = record_id
            .splitn(pk.len(), KEY_SEPARATOR)
            .map(|p| p.to_string())
            .collect();
        if parts.len() != pk.len() || parts.iter().any(|p| p.is_empty()) {
            return Err(EngineError::invalid(
                "record_id",
                format!(
                    "'{record_id}' does not name a {} row (expected {})",
                    self.name(),
                    pk.join("|")
                ),
            ));
        }
        Ok(parts)
    }

    /// Builds the record id from the key columns of a full snapshot.
    pub fn record_id_of(self, snapshot: &Snapshot) -> Result<String> {
        let mut parts = Vec::new();
        for col in self.spec().primary_key {
            let part = match snapshot.get(*col) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(EngineError::invalid(
                        "fields",
                        format!("{} row is missing key column '{col}'", self.name()),
                    ))
                }
            };
            parts.push(part);
        }
        Ok(parts.join(&KEY_SEPARATOR.to_string()))
    }

    fn key_clause(self, first_param: usize) -> String {
        self.spec()
            .primary_key
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", first_param + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Reads the whole row, every column the table has right now.
    pub fn fetch(self, conn: &Connection, record_id: &str) -> Result<Option<Snapshot>> {
        let keys = self.key_values(record_id)?;
        let sql = format!("SELECT * FROM {} WHERE {}", self.name(), self.key_clause(1));
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let snapshot = stmt
            .query_row(params_from_iter(keys.iter()), |row| {
                let mut snap = Snapshot::new();
                for (i, col) in names.iter().enumerate() {
                    snap.insert(col.clone(), sql_to_json(row.get_ref(i)?));
                }
                Ok(snap)
            })
            .optional()?;
        Ok(snapshot)
    }

    /// Returns rows affected.
    pub fn insert(self, conn: &Connection, snapshot: &Snapshot) -> Result<usize> {
        self.check_fields(conn, snapshot)?;
        if snapshot.is_empty() {
            return Err(EngineError::invalid("fields", "nothing to insert"));
        }
        let columns: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name(),
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<SqlValue> = snapshot.values().map(json_to_sql).collect();
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    /// Writes the given fields onto one row. Returns rows affected.
    pub fn update(self, conn: &Connection, record_id: &str, fields: &Snapshot) -> Result<usize> {
        self.check_fields(conn, fields)?;
        if fields.is_empty() {
            return Err(EngineError::invalid("fields", "nothing to update"));
        }
        let keys = self.key_values(record_id)?;
        let assignments: Vec<String> = fields
            .keys()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.name(),
            assignments.join(", "),
            self.key_clause(fields.len() + 1)
        );
        let mut values: Vec<SqlValue> = fields.values().map(json_to_sql).collect();
        values.extend(keys.into_iter().map(SqlValue::Text));
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    /// Returns rows affected.
    pub fn delete(self, conn: &Connection, record_id: &str) -> Result<usize> {
        let keys = self.key_values(record_id)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.name(), self.key_clause(1));
        Ok(conn.execute(&sql, params_from_iter(keys.iter()))?)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

pub fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::SCHEMA_SQL;
    use serde_json::json;

    #[test]
    fn parse_accepts_only_audited_tables() {
        assert_eq!(Table::parse("technicians").unwrap(), Table::Technicians);
        assert_eq!(Table::parse(" TECHNICIAN_CALENDAR ").unwrap(), Table::Calendar);
        assert!(Table::parse("change_history").is_err());
        assert!(Table::parse("technicians; drop table x").is_err());
    }

    #[test]
    fn composite_keys_split_on_separator() {
        let keys = Table::Calendar.key_values("T1|2025-06-02").unwrap();
        assert_eq!(keys, vec!["T1".to_string(), "2025-06-02".to_string()]);
        assert!(Table::Calendar.key_values("T1").is_err());
        assert_eq!(Table::Technicians.key_values("T1").unwrap(), vec!["T1".to_string()]);
    }

    #[test]
    fn record_id_is_built_from_key_columns() {
        let snap = json!({"technician_id": "T9", "date": "2025-06-03", "max_assignments": 8});
        let snap = snap.as_object().unwrap().clone();
        assert_eq!(Table::Calendar.record_id_of(&snap).unwrap(), "T9|2025-06-03");

        let row = json!({"history_id": 12, "action": "completed"});
        let row = row.as_object().unwrap().clone();
        assert_eq!(Table::DispatchHistory.record_id_of(&row).unwrap(), "12");
    }

    #[test]
    fn fields_are_checked_against_live_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let snap = json!({"name": "A", "password": "x"});
        let snap = snap.as_object().unwrap().clone();
        assert!(matches!(
            Table::Technicians.check_fields(&conn, &snap),
            Err(EngineError::InvalidInput { field: "fields", .. })
        ));

        conn.execute_batch("alter table technicians add column password text").unwrap();
        assert!(Table::Technicians.check_fields(&conn, &snap).is_ok());
    }

    #[test]
    fn json_values_map_onto_sqlite_types() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(8)), SqlValue::Integer(8));
        assert_eq!(json_to_sql(&json!(40.5)), SqlValue::Real(40.5));
        assert_eq!(json_to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(sql_to_json(ValueRef::Real(-73.9)), json!(-73.9));
        assert_eq!(sql_to_json(ValueRef::Text(b"NY")), json!("NY"));
    }
}
