use crate::error::OrmError;
use crate::row::Row;
use crate::sql::Params;
use std::fmt;
use std::time::Duration;

/// The type of SQL operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, pragmas, transaction control and anything else.
    Other,
}

impl QueryType {
    /// Detect the statement type from its text.
    ///
    /// Leading comments and parentheses are skipped. For `WITH` statements the
    /// keyword after the last top-level CTE body decides.
    pub fn from_sql(sql: &str) -> Self {
        use crate::sql::{starts_with_keyword, strip_sql_prefix};

        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryType::Select
        } else if starts_with_keyword(trimmed, "INSERT") || starts_with_keyword(trimmed, "REPLACE")
        {
            QueryType::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryType::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::after_ctes(trimmed)
        } else {
            QueryType::Other
        }
    }

    fn after_ctes(sql: &str) -> Self {
        use crate::sql::starts_with_keyword;

        let bytes = sql.as_bytes();
        let mut depth: i32 = 0;
        let mut body_end = 0;
        let mut in_str = false;
        for (i, b) in bytes.iter().enumerate() {
            match b {
                b'\'' => in_str = !in_str,
                b'(' if !in_str => depth += 1,
                b')' if !in_str => {
                    depth -= 1;
                    if depth == 0 {
                        body_end = i + 1;
                    }
                }
                _ => {}
            }
        }

        let rest = sql[body_end..].trim_start();
        if starts_with_keyword(rest, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(rest, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(rest, "DELETE") {
            QueryType::Delete
        } else {
            QueryType::Select
        }
    }
}

/// What a hook sees of the statement about to run.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Statement text exactly as it will be sent to the driver.
    pub sql: String,
    /// Bound parameters. Empty for batch executions.
    pub params: Params,
    /// Number of parameter sets for `execute_many`, `None` for single executions.
    pub batch_size: Option<usize>,
    pub query_type: QueryType,
    /// Id of the session running the statement.
    pub session_id: u64,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        let sql = sql.into();
        Self {
            query_type: QueryType::from_sql(&sql),
            sql,
            params,
            batch_size: None,
            session_id: 0,
        }
    }

    /// Context for a statement executed once per parameter set.
    pub fn batch(sql: impl Into<String>, batch_size: usize) -> Self {
        Self {
            batch_size: Some(batch_size),
            ..Self::new(sql, Params::default())
        }
    }

    pub fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// Maximum length for error messages in `QueryResult::Error`.
const MAX_ERROR_LEN: usize = 512;

/// Outcome of an execution, reported to [`QueryHook::after_execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// The driver ran the statement.
    Executed { rows_affected: u64 },
    /// A `before_execute` hook cancelled the statement.
    Cancelled,
    /// The driver failed and an error hook substituted these many rows.
    Recovered(usize),
    /// The driver failed (message truncated to 512 bytes).
    Error(String),
}

impl QueryResult {
    /// Create an error result, truncating the message to avoid monitoring data explosion.
    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.len() > MAX_ERROR_LEN {
            Self::Error(format!("{}...", super::truncate_sql_bytes(&msg, MAX_ERROR_LEN)))
        } else {
            Self::Error(msg)
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Executed { rows_affected } => write!(f, "{rows_affected} affected"),
            QueryResult::Cancelled => f.write_str("cancelled"),
            QueryResult::Recovered(n) => write!(f, "recovered with {n} rows"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Decision of a `before_execute` hook.
#[derive(Debug, Clone)]
pub enum HookAction {
    /// Run the statement as is.
    Continue,
    /// Run a different statement. For batch executions only `sql` is used.
    Replace { sql: String, params: Params },
    /// Skip the statement; the caller gets an empty, cancelled result.
    Cancel,
}

/// Decision of an error hook.
#[derive(Debug, Clone)]
pub enum ErrorAction {
    /// Return the error to the caller.
    Propagate,
    /// Swallow the error; the caller gets an empty result.
    Suppress,
    /// Swallow the error and serve these rows instead.
    Replace(Vec<Row>),
}

/// Connection and transaction lifecycle signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The driver opened a new physical connection.
    ConnectionOpened { conn_id: u64 },
    /// A connection was handed out by the pool.
    CheckedOut { conn_id: u64 },
    /// A connection went back to the idle list.
    CheckedIn { conn_id: u64 },
    /// A physical connection was closed.
    ConnectionClosed { conn_id: u64 },
    Commit { session_id: u64 },
    Rollback { session_id: u64 },
    /// Rolling back after a failure failed too; the original error is still returned.
    RollbackFailed { session_id: u64, message: String },
}

/// Trait for hooking into statement execution and the connection lifecycle.
///
/// Hooks run in registration order. A hook can rewrite or cancel a statement
/// before it runs and can recover from driver failures.
pub trait QueryHook: Send + Sync {
    /// Called before a statement is sent to the driver.
    fn before_execute(&self, ctx: &QueryContext) -> HookAction {
        let _ = ctx;
        HookAction::Continue
    }

    /// Called once the statement ran, was cancelled, or failed.
    fn after_execute(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}

    /// Called when the driver fails. The first hook not returning
    /// [`ErrorAction::Propagate`] decides.
    fn handle_error(&self, ctx: &QueryContext, error: &OrmError) -> ErrorAction {
        let _ = (ctx, error);
        ErrorAction::Propagate
    }

    fn on_event(&self, _event: &LifecycleEvent) {}
}
