use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::errors::{EngineError, Result};

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

// Thread-local connection slots, one per database path.
thread_local! {
    static DB_CONNS: RefCell<HashMap<String, Connection>> = RefCell::new(HashMap::new());
}

#[derive(Clone, Debug)]
pub struct Database {
    path: String,
    busy_timeout: Duration,
}

impl Database {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Provides this thread's connection to the closure, opening it on first use.
    /// Must not be re-entered from inside `f`.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        DB_CONNS
            .try_with(|cell| {
                let mut slots = cell.borrow_mut();
                if !slots.contains_key(&self.path) {
                    let conn = self.open()?;
                    slots.insert(self.path.clone(), conn);
                }
                let conn = slots
                    .get_mut(&self.path)
                    .ok_or_else(|| EngineError::Internal("connection slot missing".into()))?;
                f(conn)
            })
            .map_err(|_| EngineError::Internal("thread-local connection unavailable".into()))?
    }

    /// Runs `f` inside an IMMEDIATE transaction: the write lock is taken up
    /// front so reads inside `f` are serialized against concurrent writers.
    /// Commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    if e.is_business_failure() {
                        log::debug!("transaction rolled back: {e}");
                    } else {
                        log::error!("transaction rolled back: {e}");
                    }
                    tx.rollback()?;
                    Err(e)
                }
            }
        })
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        log::debug!("opened connection to {}", self.path);
        Ok(conn)
    }
}

/// Apply the embedded schema. Safe to call repeatedly.
pub fn init_db(db: &Database) -> Result<()> {
    db.with_conn(|conn| {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    })?;

    log::info!("database initialized at {}", db.path());
    Ok(())
}
