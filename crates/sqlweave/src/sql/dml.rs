use super::node::{Column, List, Operand, Sql, and, list, tuple};
use crate::error::{OrmError, OrmResult};

fn collect<K: Into<String>, V: Into<Operand>>(
    values: impl IntoIterator<Item = (K, V)>,
) -> Vec<(String, Operand)> {
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// `INSERT INTO table (cols) VALUES (..)`.
///
/// Returns `None` when there is nothing to insert. Values that are SQL
/// nodes are embedded as-is; other values are bound under the column name.
pub fn insert<K: Into<String>, V: Into<Operand>>(
    table: impl Into<Sql>,
    values: impl IntoIterator<Item = (K, V)>,
) -> Option<Sql> {
    let values = collect(values);
    if values.is_empty() {
        return None;
    }
    let (columns, values): (Vec<Sql>, Vec<Sql>) = values
        .into_iter()
        .map(|(col, v)| {
            let bound = v.into_named_sql(&col);
            (Sql::Raw(col), bound)
        })
        .unzip();
    Some(Sql::concat([
        Sql::raw("INSERT INTO"),
        table.into(),
        tuple(columns),
        Sql::raw("VALUES"),
        tuple(values),
    ]))
}

/// `UPDATE table SET col = .., ..`; `None` when there is nothing to set.
///
/// Chain `.where_(..)` to restrict the rows.
pub fn update<K: Into<String>, V: Into<Operand>>(
    table: impl Into<Sql>,
    values: impl IntoIterator<Item = (K, V)>,
) -> Option<Sql> {
    let values = collect(values);
    if values.is_empty() {
        return None;
    }
    let assignments: Vec<Sql> = values
        .into_iter()
        .map(|(col, v)| {
            let bound = v.into_named_sql(&col);
            Sql::raw(col).eq(bound)
        })
        .collect();
    Some(Sql::concat([
        Sql::raw("UPDATE"),
        table.into(),
        Sql::raw("SET"),
        list(assignments),
    ]))
}

/// `DELETE FROM table WHERE col = .. AND ..`.
///
/// Returns `None` for an empty mapping rather than deleting every row.
pub fn delete<K: Into<String>, V: Into<Operand>>(
    table: impl Into<Sql>,
    conditions: impl IntoIterator<Item = (K, V)>,
) -> Option<Sql> {
    let conditions = collect(conditions);
    if conditions.is_empty() {
        return None;
    }
    let conditions: Vec<Sql> = conditions
        .into_iter()
        .map(|(col, v)| {
            let bound = v.into_named_sql(&col);
            Sql::raw(col).eq(bound)
        })
        .collect();
    Some(Sql::delete_from(table).where_(Sql::List(List::new(conditions, "AND", false))))
}

/// A primary key value, single or composite.
#[derive(Debug, Clone)]
pub enum PrimaryKey {
    Single(Operand),
    Composite(Vec<Operand>),
}

impl PrimaryKey {
    pub fn single(value: impl Into<Operand>) -> Self {
        PrimaryKey::Single(value.into())
    }

    pub fn composite<V: Into<Operand>>(values: impl IntoIterator<Item = V>) -> Self {
        PrimaryKey::Composite(values.into_iter().map(Into::into).collect())
    }
}

/// Condition matching a single row by primary key.
///
/// A composite key requires a [`PrimaryKey::Composite`] value of the same
/// arity.
pub fn primary_key_condition(columns: &[Column], pk: PrimaryKey) -> OrmResult<Sql> {
    match (columns, pk) {
        ([], _) => Err(OrmError::composition("Missing primary key")),
        ([col], PrimaryKey::Single(value)) => Ok(col.eq(value)),
        ([col], PrimaryKey::Composite(mut values)) if values.len() == 1 => {
            Ok(col.eq(values.remove(0)))
        }
        (_, PrimaryKey::Single(_)) => Err(OrmError::composition(
            "Primary key is a composite and requires a tuple",
        )),
        (cols, PrimaryKey::Composite(values)) if values.len() != cols.len() => {
            Err(OrmError::composition(format!(
                "Primary key has {} columns but {} values were given",
                cols.len(),
                values.len()
            )))
        }
        (cols, PrimaryKey::Composite(values)) => Ok(and(
            cols.iter().zip(values).map(|(col, value)| col.eq(value)),
        )),
    }
}
