//! Inline statement templates.
//!
//! Two kinds of blocks are recognized inside literal SQL text:
//! - `{name}` splices the local `name` into the statement: SQL locals render
//!   inline (their parameters are collected), values are written as text.
//! - `%(name)s` binds the local `name` as a parameter named after it.
//!
//! Literal braces are written `{{` and `}}`. Text between blocks is trimmed
//! and joined with single spaces, like [`Sql::Composite`].
//!
//! ```ignore
//! let tpl = SqlTemplate::parse("SELECT * FROM {table} WHERE id = %(id)s")?
//!     .with("table", raw("users"))
//!     .with("id", 1);
//! let out = tpl.render(ParamStyle::Qmark)?;
//! assert_eq!(out.sql, "SELECT * FROM users WHERE id = ?");
//! ```

use super::node::{Operand, Sql};
use super::params::{ParamStyle, ParameterCollector};
use super::render::Rendered;
use crate::error::{OrmError, OrmResult};
use std::collections::BTreeMap;

pub type Locals = BTreeMap<String, Operand>;

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Splice(String),
    Bind(String),
}

#[derive(Debug, Clone)]
pub struct SqlTemplate {
    parts: Vec<Part>,
    locals: Locals,
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqlTemplate {
    /// Parse template text. Fails on unterminated or malformed blocks.
    pub fn parse(text: &str) -> OrmResult<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some((idx, ch)) = rest
            .char_indices()
            .find(|&(_, ch)| matches!(ch, '{' | '}' | '%'))
        {
            literal.push_str(&rest[..idx]);
            let tail = &rest[idx..];
            match ch {
                '{' if tail.starts_with("{{") => {
                    literal.push('{');
                    rest = &tail[2..];
                }
                '}' if tail.starts_with("}}") => {
                    literal.push('}');
                    rest = &tail[2..];
                }
                '{' => {
                    let end = tail.find('}').ok_or_else(|| {
                        OrmError::composition(format!("unterminated template block at '{tail}'"))
                    })?;
                    let name = tail[1..end].trim();
                    Self::check_name(name, &tail[..=end])?;
                    Self::flush(&mut parts, &mut literal);
                    parts.push(Part::Splice(name.to_string()));
                    rest = &tail[end + 1..];
                }
                '%' if tail.starts_with("%(") => {
                    let end = tail.find(")s").ok_or_else(|| {
                        OrmError::composition(format!("unterminated template block at '{tail}'"))
                    })?;
                    let name = tail[2..end].trim();
                    Self::check_name(name, &tail[..end + 2])?;
                    Self::flush(&mut parts, &mut literal);
                    parts.push(Part::Bind(name.to_string()));
                    rest = &tail[end + 2..];
                }
                _ => {
                    literal.push(ch);
                    rest = &tail[ch.len_utf8()..];
                }
            }
        }
        literal.push_str(rest);
        Self::flush(&mut parts, &mut literal);

        Ok(Self {
            parts,
            locals: Locals::new(),
        })
    }

    fn check_name(name: &str, block: &str) -> OrmResult<()> {
        if valid_name(name) {
            Ok(())
        } else {
            Err(OrmError::composition(format!(
                "invalid template block '{block}': expected a local name"
            )))
        }
    }

    fn flush(parts: &mut Vec<Part>, literal: &mut String) {
        let text = literal.trim();
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        literal.clear();
    }

    /// Provide a local used by `{name}` and `%(name)s` blocks.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.locals.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Operand>) {
        self.locals.insert(name.into(), value.into());
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Names referenced by the template, in order of appearance.
    pub fn names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Splice(n) | Part::Bind(n) => Some(n.as_str()),
                Part::Text(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Render with `overrides` taking precedence over the template's locals.
    pub fn render_locals(
        &self,
        overrides: &Locals,
        style: ParamStyle,
    ) -> OrmResult<Rendered> {
        let mut collector = ParameterCollector::new(style);
        let sql = self.write(&mut collector, Some(overrides))?;
        Ok(Rendered::new(sql, collector.into_params()))
    }

    fn lookup<'a>(&'a self, name: &str, overrides: Option<&'a Locals>) -> OrmResult<&'a Operand> {
        overrides
            .and_then(|o| o.get(name))
            .or_else(|| self.locals.get(name))
            .ok_or_else(|| OrmError::composition(format!("template local '{name}' is not defined")))
    }

    pub(crate) fn write(
        &self,
        c: &mut ParameterCollector,
        overrides: Option<&Locals>,
    ) -> OrmResult<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let text = match part {
                Part::Text(text) => text.clone(),
                Part::Splice(name) => match self.lookup(name, overrides)? {
                    Operand::Sql(sql) => sql.write(c)?,
                    Operand::Value(value) => value.to_string(),
                },
                Part::Bind(name) => match self.lookup(name, overrides)? {
                    Operand::Value(value) => c.add(value.clone(), Some(name)),
                    Operand::Sql(Sql::Param { value, .. }) => c.add(value.clone(), Some(name)),
                    Operand::Sql(_) => {
                        return Err(OrmError::composition(format!(
                            "template local '{name}' is SQL and cannot be bound as a parameter"
                        )));
                    }
                },
            };
            if !text.is_empty() {
                out.push(text);
            }
        }
        Ok(out.join(" "))
    }
}
