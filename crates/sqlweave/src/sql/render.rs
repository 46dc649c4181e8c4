use super::builder::QueryBuilder;
use super::node::{Column, ColumnList, List, Sql};
use super::params::{ParamStyle, ParameterCollector, Params};
use super::template::SqlTemplate;
use crate::error::{OrmError, OrmResult};

/// A rendered statement: SQL text plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Params,
}

impl Rendered {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Anything that can be turned into statement text and parameters.
pub trait Statement {
    /// Render with caller-supplied parameters that placeholders may reference.
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered>;

    /// Render with no external parameters.
    fn render(&self, style: ParamStyle) -> OrmResult<Rendered> {
        self.render_with(Params::default(), style)
    }
}

/// Render a statement, returning `(text, params)`.
pub fn render(
    stmt: &(impl Statement + ?Sized),
    params: Params,
    style: ParamStyle,
) -> OrmResult<Rendered> {
    stmt.render_with(params, style)
}

impl Statement for Sql {
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered> {
        let mut collector = ParameterCollector::with_params(style, params)?;
        let sql = self.write(&mut collector)?;
        Ok(Rendered::new(sql, collector.into_params()))
    }
}

impl Statement for SqlTemplate {
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered> {
        let mut collector = ParameterCollector::with_params(style, params)?;
        let sql = self.write(&mut collector, None)?;
        Ok(Rendered::new(sql, collector.into_params()))
    }
}

impl Statement for QueryBuilder {
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered> {
        self.to_sql_node().render_with(params, style)
    }
}

/// Plain text is sent as-is; parameters pass through unchanged.
impl Statement for str {
    fn render_with(&self, params: Params, _style: ParamStyle) -> OrmResult<Rendered> {
        Ok(Rendered::new(self, params))
    }
}

impl Statement for String {
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered> {
        self.as_str().render_with(params, style)
    }
}

impl Statement for Rendered {
    fn render_with(&self, params: Params, _style: ParamStyle) -> OrmResult<Rendered> {
        if !params.is_empty() {
            return Err(OrmError::parameter(
                "statement is already rendered with its own parameters",
            ));
        }
        Ok(self.clone())
    }
}

impl<T: Statement + ?Sized> Statement for &T {
    fn render_with(&self, params: Params, style: ParamStyle) -> OrmResult<Rendered> {
        (**self).render_with(params, style)
    }
}

impl Sql {
    /// Render the text for a qmark driver, discarding parameters.
    pub fn to_sql(&self) -> OrmResult<String> {
        Ok(self.render(ParamStyle::Qmark)?.sql)
    }

    pub(crate) fn write(&self, c: &mut ParameterCollector) -> OrmResult<String> {
        match self {
            Sql::Raw(text) => Ok(text.clone()),
            Sql::Identifier(ident) => Ok(ident.to_string()),
            Sql::Column(col) => col.write(c),
            Sql::Columns(cols) => cols.write(c),
            Sql::Param { value, name } => Ok(c.add(value.clone(), name.as_deref())),
            Sql::Placeholder(name) => c.placeholder_for(name),
            Sql::List(list) => list.write(c),
            Sql::Composite(parts) => {
                let mut out = Vec::with_capacity(parts.len());
                for part in parts {
                    let text = part.write(c)?;
                    if !text.is_empty() {
                        out.push(text);
                    }
                }
                Ok(out.join(" "))
            }
            Sql::Function { name, args } => {
                let mut out = Vec::with_capacity(args.len());
                for arg in args {
                    out.push(arg.write(c)?);
                }
                Ok(format!("{}({})", name.to_uppercase(), out.join(", ")))
            }
            Sql::Template(tpl) => tpl.write(c, None),
        }
    }
}

impl Column {
    fn write(&self, c: &mut ParameterCollector) -> OrmResult<String> {
        if let Some(expr) = &self.expr {
            let expr = expr.write(c)?;
            return Ok(format!("({expr}) AS {}", self.alias_or_name()));
        }
        let qualified = self.qualified();
        if self.alias.is_some() || self.prefix.is_some() {
            Ok(format!("{qualified} AS {}", self.alias_or_name()))
        } else {
            Ok(qualified)
        }
    }
}

impl ColumnList {
    fn write(&self, c: &mut ParameterCollector) -> OrmResult<String> {
        if self.renders_wildcard() {
            return Ok(match &self.table {
                Some(table) => format!("{table}.*"),
                None => "*".to_string(),
            });
        }
        let mut out = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            out.push(col.write(c)?);
        }
        Ok(out.join(", "))
    }
}

impl List {
    fn write(&self, c: &mut ParameterCollector) -> OrmResult<String> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let text = item.write(c)?;
            if !text.is_empty() {
                out.push(text);
            }
        }
        if out.is_empty() {
            return Ok(String::new());
        }
        let joined = out.join(&self.separator());
        if self.wrap {
            Ok(format!("({joined})"))
        } else {
            Ok(joined)
        }
    }
}
