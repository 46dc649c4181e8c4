//! Driver boundary.
//!
//! A [`Driver`] produces [`Connection`]s; executing a statement on a
//! connection returns an owned [`Cursor`]. Cursors never borrow their
//! connection, so result sets can outlive the call that produced them.

use crate::error::OrmResult;
use crate::row::Row;
use crate::sql::{ParamStyle, Params};
use std::collections::VecDeque;
use std::sync::Arc;

/// Rows produced by one statement execution.
pub trait Cursor {
    /// Next row, or `None` once exhausted.
    fn fetch_one(&mut self) -> OrmResult<Option<Row>>;

    /// All remaining rows.
    fn fetch_all(&mut self) -> OrmResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows changed by a DML statement; 0 for queries.
    fn rows_affected(&self) -> u64;

    /// Release the cursor. Further fetches return no rows.
    fn close(&mut self) {}

    /// Whether the execution was cancelled by a hook and never reached the driver.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A raw database connection.
///
/// Connections follow implicit-transaction semantics: the first statement
/// after a `commit`/`rollback` opens a new transaction.
pub trait Connection: Send {
    fn execute(&mut self, sql: &str, params: &Params) -> OrmResult<Box<dyn Cursor>>;

    /// Execute one statement for every parameter set; returns total rows affected.
    fn execute_many(&mut self, sql: &str, params: &[Params]) -> OrmResult<u64> {
        let mut total = 0;
        for p in params {
            let mut cursor = self.execute(sql, p)?;
            total += cursor.rows_affected();
            cursor.close();
        }
        Ok(total)
    }

    fn commit(&mut self) -> OrmResult<()>;

    fn rollback(&mut self) -> OrmResult<()>;

    fn close(self: Box<Self>) -> OrmResult<()>;
}

/// A connection factory.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Placeholder dialect the driver expects.
    fn paramstyle(&self) -> ParamStyle;

    fn connect(&self) -> OrmResult<Box<dyn Connection>>;
}

/// A cursor over rows already held in memory.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    rows: VecDeque<Row>,
    rows_affected: u64,
    cancelled: bool,
}

impl MemoryCursor {
    pub fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Build rows sharing one set of column names.
    pub fn from_values<C, R>(columns: C, rows: impl IntoIterator<Item = R>) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<crate::Value>,
    {
        let columns: Arc<[String]> = columns.into_iter().map(Into::into).collect();
        Self::new(
            rows.into_iter()
                .map(|r| Row::new(columns.clone(), r.into_iter().map(Into::into).collect())),
        )
    }

    /// A result for a statement that returned no rows.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// The result of an execution cancelled before reaching the driver.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Cursor for MemoryCursor {
    fn fetch_one(&mut self) -> OrmResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> OrmResult<Vec<Row>> {
        Ok(self.rows.drain(..).collect())
    }

    fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    fn close(&mut self) {
        self.rows.clear();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
