//! Result sets over driver cursors.
//!
//! [`ResultSet`] streams rows one at a time, optionally through a loader.
//! [`CompositeResultSet`] rebuilds nested records from joined rows whose
//! column names follow the `relation__column` convention.

mod composite;

#[cfg(test)]
mod tests;

pub use composite::{CompositeResultSet, CompositionMap, Loader, RowId};

use crate::driver::Cursor;
use crate::error::OrmResult;
use crate::row::Row;
use crate::value::Value;

/// A lazily consumed result.
///
/// The cursor is closed as soon as it is exhausted, when the result set is
/// dropped, or after [`first`](Self::first).
pub struct ResultSet<T = Row> {
    cursor: Option<Box<dyn Cursor>>,
    loader: Box<dyn FnMut(Row) -> OrmResult<T>>,
    rows_affected: u64,
    cancelled: bool,
}

impl ResultSet<Row> {
    pub fn new(cursor: Box<dyn Cursor>) -> Self {
        Self::with_loader(cursor, |row: Row| -> OrmResult<Row> { Ok(row) })
    }

    /// First column of the first row.
    pub fn scalar(self) -> OrmResult<Option<Value>> {
        Ok(self
            .first()?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// First column of every row.
    pub fn scalars(self) -> OrmResult<Vec<Value>> {
        let mut out = Vec::new();
        for row in self {
            if let Some(value) = row?.into_values().into_iter().next() {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Convert every row with `loader`.
    pub fn map<U>(mut self, loader: impl FnMut(Row) -> OrmResult<U> + 'static) -> ResultSet<U> {
        let cursor = self.cursor.take();
        ResultSet {
            cursor,
            loader: Box::new(loader),
            rows_affected: self.rows_affected,
            cancelled: self.cancelled,
        }
    }
}

impl<T> ResultSet<T> {
    pub fn with_loader(
        cursor: Box<dyn Cursor>,
        loader: impl FnMut(Row) -> OrmResult<T> + 'static,
    ) -> Self {
        Self {
            rows_affected: cursor.rows_affected(),
            cancelled: cursor.is_cancelled(),
            cursor: Some(cursor),
            loader: Box::new(loader),
        }
    }

    /// Next item, or `None` once the cursor is exhausted.
    pub fn fetch(&mut self) -> OrmResult<Option<T>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.fetch_one() {
            Ok(Some(row)) => (self.loader)(row).map(Some),
            Ok(None) => {
                self.close();
                Ok(None)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// The first item; the rest of the result is discarded.
    pub fn first(mut self) -> OrmResult<Option<T>> {
        let item = self.fetch();
        self.close();
        item
    }

    /// Every remaining item.
    pub fn all(mut self) -> OrmResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.fetch()? {
            out.push(item);
        }
        Ok(out)
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Whether a hook cancelled the statement before it ran.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl<T> Iterator for ResultSet<T> {
    type Item = OrmResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch().transpose()
    }
}

impl<T> Drop for ResultSet<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for ResultSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("closed", &self.is_closed())
            .field("rows_affected", &self.rows_affected)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
