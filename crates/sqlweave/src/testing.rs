//! A scripted in-memory driver for exercising pools, sessions and hooks
//! without a database.
//!
//! ```rust,ignore
//! let driver = RecordingDriver::new().with_rows("FROM users", ["id"], vec![vec![Value::Int(1)]]);
//! let engine = Engine::new(driver.clone(), EngineConfig::default());
//! // ... run code against `engine` ...
//! assert_eq!(driver.commits(), 1);
//! ```

use crate::driver::{Connection, Cursor, Driver, MemoryCursor};
use crate::error::{OrmError, OrmResult};
use crate::sql::{ParamStyle, Params};
use crate::value::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call the driver received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect { conn: usize },
    Execute { conn: usize, sql: String, params: Params },
    ExecuteMany { conn: usize, sql: String, batch: usize },
    Commit { conn: usize },
    Rollback { conn: usize },
    Close { conn: usize },
}

impl Call {
    pub fn conn(&self) -> usize {
        match self {
            Call::Connect { conn }
            | Call::Execute { conn, .. }
            | Call::ExecuteMany { conn, .. }
            | Call::Commit { conn }
            | Call::Rollback { conn }
            | Call::Close { conn } => *conn,
        }
    }
}

struct Canned {
    pattern: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    next_conn: usize,
    canned: Vec<Canned>,
    failures: Vec<(String, String)>,
    fail_connect: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

/// A driver that records every call and serves canned results.
///
/// Clones share their recording, so keep one handle for assertions and give
/// another to the engine.
#[derive(Clone)]
pub struct RecordingDriver {
    state: Arc<Mutex<Recorder>>,
    paramstyle: ParamStyle,
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Recorder::default())),
            paramstyle: ParamStyle::Qmark,
        }
    }

    pub fn with_paramstyle(mut self, style: ParamStyle) -> Self {
        self.paramstyle = style;
        self
    }

    /// Serve `rows` for every statement containing `pattern`.
    pub fn with_rows<C>(self, pattern: &str, columns: C, rows: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.lock().canned.push(Canned {
            pattern: pattern.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        });
        self
    }

    /// Fail every statement containing `pattern` with a driver error.
    pub fn fail_on(self, pattern: &str, message: &str) -> Self {
        self.lock()
            .failures
            .push((pattern.to_string(), message.to_string()));
        self
    }

    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.lock().fail_commit = fail;
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.lock().fail_rollback = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    /// Executed statements in order, batches included.
    pub fn statements(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Execute { sql, .. } | Call::ExecuteMany { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn connections_opened(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect { .. }))
    }

    pub fn connections_closed(&self) -> usize {
        self.count(|c| matches!(c, Call::Close { .. }))
    }

    pub fn commits(&self) -> usize {
        self.count(|c| matches!(c, Call::Commit { .. }))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|c| matches!(c, Call::Rollback { .. }))
    }
}

impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn paramstyle(&self) -> ParamStyle {
        self.paramstyle
    }

    fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(OrmError::Connection("connection refused".to_string()));
        }
        state.next_conn += 1;
        let conn = state.next_conn;
        state.calls.push(Call::Connect { conn });
        Ok(Box::new(RecordingConnection {
            id: conn,
            driver: self.clone(),
        }))
    }
}

struct RecordingConnection {
    id: usize,
    driver: RecordingDriver,
}

impl Connection for RecordingConnection {
    fn execute(&mut self, sql: &str, params: &Params) -> OrmResult<Box<dyn Cursor>> {
        let mut state = self.driver.lock();
        state.calls.push(Call::Execute {
            conn: self.id,
            sql: sql.to_string(),
            params: params.clone(),
        });
        if let Some((_, message)) = state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(OrmError::driver(message.clone()));
        }
        match state.canned.iter().find(|c| sql.contains(c.pattern.as_str())) {
            Some(canned) => Ok(Box::new(MemoryCursor::from_values(
                canned.columns.clone(),
                canned.rows.clone(),
            ))),
            None => Ok(Box::new(MemoryCursor::affected(1))),
        }
    }

    fn execute_many(&mut self, sql: &str, params: &[Params]) -> OrmResult<u64> {
        let mut state = self.driver.lock();
        state.calls.push(Call::ExecuteMany {
            conn: self.id,
            sql: sql.to_string(),
            batch: params.len(),
        });
        if let Some((_, message)) = state.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(OrmError::driver(message.clone()));
        }
        Ok(params.len() as u64)
    }

    fn commit(&mut self) -> OrmResult<()> {
        let mut state = self.driver.lock();
        state.calls.push(Call::Commit { conn: self.id });
        if state.fail_commit {
            return Err(OrmError::driver("commit failed"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> OrmResult<()> {
        let mut state = self.driver.lock();
        state.calls.push(Call::Rollback { conn: self.id });
        if state.fail_rollback {
            return Err(OrmError::driver("rollback failed"));
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> OrmResult<()> {
        self.driver.lock().calls.push(Call::Close { conn: self.id });
        Ok(())
    }
}
