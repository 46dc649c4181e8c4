use super::template::SqlTemplate;
use crate::value::Value;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, Not};

/// A composable piece of SQL.
///
/// Nodes never perform I/O. Values only enter a statement through
/// [`Sql::Param`], so they always become placeholders in the rendered text.
#[derive(Debug, Clone)]
pub enum Sql {
    /// Literal SQL text.
    Raw(String),
    Identifier(Identifier),
    Column(Column),
    Columns(ColumnList),
    /// A bound value with an optional preferred name.
    Param { value: Value, name: Option<String> },
    /// Reference to an externally supplied parameter by name.
    Placeholder(String),
    List(List),
    /// Parts joined by single spaces, empty parts skipped.
    Composite(Vec<Sql>),
    /// `NAME(arg, ...)`
    Function { name: String, args: Vec<Sql> },
    Template(Box<SqlTemplate>),
}

/// The right-hand side of an operator: either more SQL or a value to bind.
#[derive(Debug, Clone)]
pub enum Operand {
    Sql(Sql),
    Value(Value),
}

impl Operand {
    pub fn into_sql(self) -> Sql {
        match self {
            Operand::Sql(sql) => sql,
            Operand::Value(value) => Sql::Param { value, name: None },
        }
    }

    /// Like [`into_sql`](Self::into_sql), but names the bound parameter.
    pub fn into_named_sql(self, name: &str) -> Sql {
        match self {
            Operand::Sql(sql) => sql,
            Operand::Value(value) => Sql::Param {
                value,
                name: Some(name.to_string()),
            },
        }
    }
}

macro_rules! impl_operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_operand_from_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    &str,
    String,
    &String,
    Vec<u8>,
    chrono::NaiveDateTime,
    uuid::Uuid,
    serde_json::Value,
);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Value(Value::from(v))
    }
}

impl From<Sql> for Operand {
    fn from(sql: Sql) -> Self {
        Operand::Sql(sql)
    }
}

impl From<Column> for Operand {
    fn from(col: Column) -> Self {
        Operand::Sql(col.reference())
    }
}

impl From<&Column> for Operand {
    fn from(col: &Column) -> Self {
        Operand::Sql(col.reference())
    }
}

impl From<Identifier> for Operand {
    fn from(ident: Identifier) -> Self {
        Operand::Sql(Sql::Identifier(ident))
    }
}

/// An SQL identifier that can be aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    pub alias: Option<String>,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {alias}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A column, optionally table-qualified, aliased, or prefixed.
///
/// A prefix is prepended to the output alias (`kids__` + `id` renders
/// `kids.id AS kids__id`), which is how eager-loaded columns are named.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub table: Option<String>,
    pub prefix: Option<String>,
    pub alias: Option<String>,
    /// When set, the column is the expression `(expr) AS name`.
    pub expr: Option<Box<Sql>>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            prefix: None,
            alias: None,
            expr: None,
        }
    }

    /// A virtual column computed from an expression.
    pub fn expr(expr: impl Into<Sql>, alias: impl Into<String>) -> Self {
        Self {
            expr: Some(Box::new(expr.into())),
            ..Self::new(alias)
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn prefixed(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Name of this column in a result row.
    pub fn alias_or_name(&self) -> String {
        let name = self.alias.as_deref().unwrap_or(&self.name);
        match &self.prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }

    /// `table.name`, or just `name`.
    pub fn qualified(&self) -> String {
        match &self.table {
            Some(table) => format!("{table}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// This column as used in a condition: qualified, never aliased.
    pub fn reference(&self) -> Sql {
        Sql::Raw(self.qualified())
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column::new(name)
    }
}

macro_rules! delegate_ops_to_reference {
    ($($method:ident),* $(,)?) => {
        impl Column {
            $(
                pub fn $method(&self, other: impl Into<Operand>) -> Sql {
                    self.reference().$method(other)
                }
            )*

            pub fn in_values<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Sql {
                self.reference().in_values(values)
            }

            pub fn is_null(&self) -> Sql {
                self.reference().is_null()
            }

            pub fn is_not_null(&self) -> Sql {
                self.reference().is_not_null()
            }
        }
    };
}

delegate_ops_to_reference!(eq, ne, lt, le, gt, ge, in_, not_in, like, ilike);

/// A list of columns. Renders as a comma separated list.
///
/// With no columns (or `wildcard` forced on) it renders `table.*` / `*`;
/// with `wildcard` forced off an empty list renders nothing.
#[derive(Debug, Clone, Default)]
pub struct ColumnList {
    pub columns: Vec<Column>,
    pub table: Option<String>,
    pub prefix: Option<String>,
    pub wildcard: Option<bool>,
}

impl ColumnList {
    pub fn new<C: Into<Column>>(columns: impl IntoIterator<Item = C>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Qualify every column with `table`.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        for col in &mut self.columns {
            col.table = Some(table.clone());
        }
        self.table = Some(table);
        self
    }

    /// Prefix every column's output alias.
    pub fn prefixed(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        for col in &mut self.columns {
            col.prefix = Some(prefix.clone());
        }
        self.prefix = Some(prefix);
        self
    }

    pub fn wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = Some(wildcard);
        self
    }

    pub fn push(&mut self, col: impl Into<Column>) {
        let mut col = col.into();
        if let Some(table) = &self.table {
            col.table = Some(table.clone());
        }
        if let Some(prefix) = &self.prefix {
            col.prefix = Some(prefix.clone());
        }
        self.columns.push(col);
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn renders_wildcard(&self) -> bool {
        match self.wildcard {
            Some(forced) => forced,
            None => self.columns.is_empty(),
        }
    }
}

impl<'a> IntoIterator for &'a ColumnList {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Items joined by a separator, optionally wrapped in parentheses.
///
/// A `,` separator renders as `, `; any other separator is surrounded by
/// spaces. Empty items are skipped and an empty list renders nothing.
#[derive(Debug, Clone)]
pub struct List {
    pub items: Vec<Sql>,
    pub joinstr: String,
    pub wrap: bool,
}

impl List {
    pub fn new(items: Vec<Sql>, joinstr: impl Into<String>, wrap: bool) -> Self {
        Self {
            items,
            joinstr: joinstr.into(),
            wrap,
        }
    }

    pub(crate) fn separator(&self) -> String {
        match self.joinstr.trim() {
            "," => ", ".to_string(),
            "" => " ".to_string(),
            other => format!(" {other} "),
        }
    }

    fn is_boolean(&self, op: &str) -> bool {
        self.wrap && self.joinstr.eq_ignore_ascii_case(op)
    }
}

/// A comma separated list.
pub fn list<S: Into<Sql>>(items: impl IntoIterator<Item = S>) -> Sql {
    Sql::List(List::new(items.into_iter().map(Into::into).collect(), ",", false))
}

/// A parenthesized comma separated list.
pub fn tuple<S: Into<Sql>>(items: impl IntoIterator<Item = S>) -> Sql {
    Sql::List(List::new(items.into_iter().map(Into::into).collect(), ",", true))
}

/// Conditions joined with `AND`; renders nothing when empty.
pub fn and<S: Into<Sql>>(items: impl IntoIterator<Item = S>) -> Sql {
    Sql::List(List::new(items.into_iter().map(Into::into).collect(), "AND", true))
}

/// Conditions joined with `OR`; renders nothing when empty.
pub fn or<S: Into<Sql>>(items: impl IntoIterator<Item = S>) -> Sql {
    Sql::List(List::new(items.into_iter().map(Into::into).collect(), "OR", true))
}

/// Literal SQL text.
pub fn raw(text: impl Into<String>) -> Sql {
    Sql::Raw(text.into())
}

/// A value bound as a parameter.
pub fn param(value: impl Into<Value>) -> Sql {
    Sql::Param {
        value: value.into(),
        name: None,
    }
}

/// A function call; non-SQL arguments are bound as parameters.
pub fn func<A: Into<Operand>>(name: impl Into<String>, args: impl IntoIterator<Item = A>) -> Sql {
    Sql::Function {
        name: name.into(),
        args: args.into_iter().map(|a| a.into().into_sql()).collect(),
    }
}

/// `CASE WHEN .. THEN .. [ELSE ..] END`
pub fn case<W, T>(whens: impl IntoIterator<Item = (W, T)>, else_: Option<Operand>) -> Sql
where
    W: Into<Sql>,
    T: Into<Operand>,
{
    let mut parts = vec![Sql::raw("CASE")];
    for (when, then) in whens {
        parts.push(Sql::Composite(vec![
            Sql::raw("WHEN"),
            when.into(),
            Sql::raw("THEN"),
            then.into().into_sql(),
        ]));
    }
    if let Some(else_) = else_ {
        parts.push(Sql::raw("ELSE"));
        parts.push(else_.into_sql());
    }
    parts.push(Sql::raw("END"));
    Sql::Composite(parts)
}

impl Sql {
    pub fn raw(text: impl Into<String>) -> Sql {
        Sql::Raw(text.into())
    }

    /// An empty composite that renders nothing.
    pub fn empty() -> Sql {
        Sql::Composite(Vec::new())
    }

    pub fn param(value: impl Into<Value>) -> Sql {
        param(value)
    }

    /// A value bound under a preferred name.
    pub fn named_param(name: impl Into<String>, value: impl Into<Value>) -> Sql {
        Sql::Param {
            value: value.into(),
            name: Some(name.into()),
        }
    }

    /// Reference an externally supplied parameter by name.
    pub fn placeholder(name: impl Into<String>) -> Sql {
        Sql::Placeholder(name.into())
    }

    pub fn ident(name: impl Into<String>) -> Sql {
        Sql::Identifier(Identifier::new(name))
    }

    /// Parts joined by single spaces.
    pub fn concat<S: Into<Sql>>(parts: impl IntoIterator<Item = S>) -> Sql {
        Sql::Composite(parts.into_iter().map(Into::into).collect())
    }

    /// Whether this node renders to nothing.
    ///
    /// Only structural emptiness counts: parameters, columns and functions
    /// are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Sql::Raw(text) => text.trim().is_empty(),
            Sql::Composite(parts) => parts.iter().all(Sql::is_empty),
            Sql::List(list) => list.items.iter().all(Sql::is_empty),
            Sql::Columns(cols) => cols.is_empty() && !cols.renders_wildcard(),
            Sql::Template(tpl) => tpl.is_empty(),
            _ => false,
        }
    }

    /// Append a part, flattening into an existing composite.
    pub fn push(&mut self, part: impl Into<Sql>) -> &mut Self {
        let part = part.into();
        match self {
            Sql::Composite(parts) => parts.push(part),
            _ => {
                let this = std::mem::replace(self, Sql::empty());
                *self = Sql::Composite(vec![this, part]);
            }
        }
        self
    }

    /// `self <operator> other`, binding `other` unless it is SQL.
    pub fn op(self, operator: &str, other: impl Into<Operand>) -> Sql {
        Sql::Composite(vec![self, Sql::raw(operator), other.into().into_sql()])
    }

    pub fn eq(self, other: impl Into<Operand>) -> Sql {
        self.op("=", other)
    }

    pub fn ne(self, other: impl Into<Operand>) -> Sql {
        self.op("!=", other)
    }

    pub fn lt(self, other: impl Into<Operand>) -> Sql {
        self.op("<", other)
    }

    pub fn le(self, other: impl Into<Operand>) -> Sql {
        self.op("<=", other)
    }

    pub fn gt(self, other: impl Into<Operand>) -> Sql {
        self.op(">", other)
    }

    pub fn ge(self, other: impl Into<Operand>) -> Sql {
        self.op(">=", other)
    }

    pub fn in_(self, other: impl Into<Operand>) -> Sql {
        self.op("IN", other)
    }

    pub fn not_in(self, other: impl Into<Operand>) -> Sql {
        self.op("NOT IN", other)
    }

    pub fn like(self, other: impl Into<Operand>) -> Sql {
        self.op("LIKE", other)
    }

    pub fn ilike(self, other: impl Into<Operand>) -> Sql {
        self.op("ILIKE", other)
    }

    /// `self IN (?, ?, ...)`. An empty set renders the false condition `1 = 0`.
    pub fn in_values<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Sql {
        let items: Vec<Sql> = values.into_iter().map(param).collect();
        if items.is_empty() {
            return Sql::raw("1 = 0");
        }
        self.in_(tuple(items))
    }

    pub fn is_null(self) -> Sql {
        Sql::Composite(vec![self, Sql::raw("IS NULL")])
    }

    pub fn is_not_null(self) -> Sql {
        Sql::Composite(vec![self, Sql::raw("IS NOT NULL")])
    }

    /// `(self AND other)`, flattening chains of `and`.
    pub fn and(self, other: impl Into<Sql>) -> Sql {
        self.combine("AND", other.into())
    }

    /// `(self OR other)`, flattening chains of `or`.
    pub fn or(self, other: impl Into<Sql>) -> Sql {
        self.combine("OR", other.into())
    }

    fn combine(self, op: &str, other: Sql) -> Sql {
        match self {
            Sql::List(mut list) if list.is_boolean(op) => {
                list.items.push(other);
                Sql::List(list)
            }
            this => Sql::List(List::new(vec![this, other], op, true)),
        }
    }

    /// Append a keyword followed by a part.
    pub fn keyword(mut self, keyword: &str, part: impl Into<Sql>) -> Sql {
        self.push(Sql::raw(keyword));
        self.push(part);
        self
    }

    /// `SELECT <columns>`
    pub fn select(columns: impl Into<Sql>) -> Sql {
        Sql::Composite(vec![Sql::raw("SELECT"), columns.into()])
    }

    /// `INSERT INTO <table>`
    pub fn insert_into(table: impl Into<Sql>) -> Sql {
        Sql::Composite(vec![Sql::raw("INSERT INTO"), table.into()])
    }

    /// `DELETE FROM <table>`
    pub fn delete_from(table: impl Into<Sql>) -> Sql {
        Sql::Composite(vec![Sql::raw("DELETE FROM"), table.into()])
    }

    pub fn from_(self, table: impl Into<Sql>) -> Sql {
        self.keyword("FROM", table)
    }

    pub fn join(self, table: impl Into<Sql>) -> Sql {
        self.keyword("JOIN", table)
    }

    pub fn left_join(self, table: impl Into<Sql>) -> Sql {
        self.keyword("LEFT JOIN", table)
    }

    pub fn on(self, condition: impl Into<Sql>) -> Sql {
        self.keyword("ON", condition)
    }

    /// `WHERE <condition>`, skipped entirely when the condition is empty.
    pub fn where_(self, condition: impl Into<Sql>) -> Sql {
        let condition = condition.into();
        if condition.is_empty() {
            return self;
        }
        self.keyword("WHERE", condition)
    }

    pub fn group_by(self, columns: impl Into<Sql>) -> Sql {
        self.keyword("GROUP BY", columns)
    }

    /// `HAVING <condition>`, skipped when the condition is empty.
    pub fn having(self, condition: impl Into<Sql>) -> Sql {
        let condition = condition.into();
        if condition.is_empty() {
            return self;
        }
        self.keyword("HAVING", condition)
    }

    pub fn order_by(self, columns: impl Into<Sql>) -> Sql {
        self.keyword("ORDER BY", columns)
    }

    pub fn limit(self, n: impl Into<Operand>) -> Sql {
        self.keyword("LIMIT", n.into().into_sql())
    }

    pub fn offset(self, n: impl Into<Operand>) -> Sql {
        self.keyword("OFFSET", n.into().into_sql())
    }

    pub fn set(self, assignments: impl Into<Sql>) -> Sql {
        self.keyword("SET", assignments)
    }

    pub fn values(self, values: impl Into<Sql>) -> Sql {
        self.keyword("VALUES", values)
    }

    pub fn returning(self, columns: impl Into<Sql>) -> Sql {
        self.keyword("RETURNING", columns)
    }
}

impl From<&str> for Sql {
    fn from(text: &str) -> Self {
        Sql::Raw(text.to_string())
    }
}

impl From<String> for Sql {
    fn from(text: String) -> Self {
        Sql::Raw(text)
    }
}

impl From<Column> for Sql {
    fn from(col: Column) -> Self {
        Sql::Column(col)
    }
}

impl From<&Column> for Sql {
    fn from(col: &Column) -> Self {
        Sql::Column(col.clone())
    }
}

impl From<ColumnList> for Sql {
    fn from(cols: ColumnList) -> Self {
        Sql::Columns(cols)
    }
}

impl From<Identifier> for Sql {
    fn from(ident: Identifier) -> Self {
        Sql::Identifier(ident)
    }
}

impl From<List> for Sql {
    fn from(list: List) -> Self {
        Sql::List(list)
    }
}

impl From<SqlTemplate> for Sql {
    fn from(tpl: SqlTemplate) -> Self {
        Sql::Template(Box::new(tpl))
    }
}

impl<T: Into<Sql>> BitAnd<T> for Sql {
    type Output = Sql;

    fn bitand(self, rhs: T) -> Sql {
        self.and(rhs)
    }
}

impl<T: Into<Sql>> BitOr<T> for Sql {
    type Output = Sql;

    fn bitor(self, rhs: T) -> Sql {
        self.or(rhs)
    }
}

impl Not for Sql {
    type Output = Sql;

    fn not(self) -> Sql {
        Sql::Composite(vec![Sql::raw("NOT"), self])
    }
}

impl<T: Into<Sql>> Add<T> for Sql {
    type Output = Sql;

    fn add(mut self, rhs: T) -> Sql {
        self.push(rhs);
        self
    }
}
