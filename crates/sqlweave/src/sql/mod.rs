//! Composable SQL statements.
//!
//! Statements are trees of [`Sql`] nodes. Rendering walks the tree once,
//! collecting every bound value through a [`ParameterCollector`] so values
//! never end up in the statement text:
//!
//! ```ignore
//! use sqlweave::sql::{Column, ColumnList, ParamStyle, Sql, Statement, and};
//!
//! let cols = ColumnList::new(["id", "name"]).with_table("u");
//! let cond = and([Column::new("age").gt(18), Column::new("name").like("a%")]);
//! let q = Sql::select(cols).from_("users u").where_(cond);
//!
//! let out = q.render(ParamStyle::Qmark)?;
//! assert_eq!(
//!     out.sql,
//!     "SELECT u.id, u.name FROM users u WHERE (age > ? AND name LIKE ?)"
//! );
//! ```

mod builder;
mod dml;
mod node;
mod params;
mod render;
mod template;

#[cfg(test)]
mod tests;

pub use builder::QueryBuilder;
pub use dml::{PrimaryKey, delete, insert, primary_key_condition, update};
pub use node::{
    Column, ColumnList, Identifier, List, Operand, Sql, and, case, func, list, or, param, raw,
    tuple,
};
pub use params::{ParamStyle, ParameterCollector, Params};
pub use render::{Rendered, Statement, render};
pub use template::{Locals, SqlTemplate};

/// Split a script into statements on `;` outside single-quoted strings.
///
/// Statements are trimmed and empty ones dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_str = false;
    for ch in script.chars() {
        match ch {
            '\'' => {
                in_str = !in_str;
                current.push(ch);
            }
            ';' if !in_str => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    out.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let stmt = current.trim();
    if !stmt.is_empty() {
        out.push(stmt.to_string());
    }
    out
}

/// Strip leading whitespace, SQL comments (`--` and `/* */`), and parentheses
/// from a SQL string to find the first meaningful keyword.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(stripped) = s.strip_prefix('(') {
            s = stripped;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) => prefix.eq_ignore_ascii_case(keyword),
        None => false,
    }
}
