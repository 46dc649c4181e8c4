use super::node::{List, Operand, Sql, list};

/// A SELECT builder whose components always render in SQL order.
///
/// `join` and `where_` accumulate; every other component replaces the
/// previous value. Conditions are joined with `AND`.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    select: Vec<Sql>,
    from: Vec<Sql>,
    joins: Vec<Sql>,
    conditions: Vec<Sql>,
    group_by: Vec<Sql>,
    having: Vec<Sql>,
    order_by: Vec<Sql>,
    limit: Option<Sql>,
    offset: Option<Sql>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<S: Into<Sql>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_<S: Into<Sql>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.from = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Append a raw join clause (`JOIN t ON ..`, `LEFT JOIN ..`).
    pub fn join(mut self, clause: impl Into<Sql>) -> Self {
        self.joins.push(clause.into());
        self
    }

    pub fn inner_join(self, table: impl Into<Sql>, on: impl Into<Sql>) -> Self {
        self.join(Sql::concat([Sql::raw("JOIN"), table.into(), Sql::raw("ON"), on.into()]))
    }

    pub fn left_join(self, table: impl Into<Sql>, on: impl Into<Sql>) -> Self {
        self.join(Sql::concat([
            Sql::raw("LEFT JOIN"),
            table.into(),
            Sql::raw("ON"),
            on.into(),
        ]))
    }

    /// Add a condition; empty conditions are ignored.
    pub fn where_(mut self, condition: impl Into<Sql>) -> Self {
        let condition = condition.into();
        if !condition.is_empty() {
            self.conditions.push(condition);
        }
        self
    }

    pub fn clear_where(mut self) -> Self {
        self.conditions.clear();
        self
    }

    pub fn clear_joins(mut self) -> Self {
        self.joins.clear();
        self
    }

    pub fn group_by<S: Into<Sql>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, condition: impl Into<Sql>) -> Self {
        let condition = condition.into();
        self.having = if condition.is_empty() {
            Vec::new()
        } else {
            vec![condition]
        };
        self
    }

    pub fn order_by<S: Into<Sql>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, n: impl Into<Operand>) -> Self {
        self.limit = Some(n.into().into_sql());
        self
    }

    pub fn offset(mut self, n: impl Into<Operand>) -> Self {
        self.offset = Some(n.into().into_sql());
        self
    }

    /// The statement as a node tree.
    pub fn to_sql_node(&self) -> Sql {
        fn conditions(items: &[Sql]) -> Sql {
            Sql::List(List::new(items.to_vec(), "AND", false))
        }

        let mut out = Sql::empty();
        if self.select.is_empty() {
            out.push(Sql::raw("SELECT *"));
        } else {
            out.push(Sql::raw("SELECT"));
            out.push(list(self.select.clone()));
        }
        if !self.from.is_empty() {
            out.push(Sql::raw("FROM"));
            out.push(list(self.from.clone()));
        }
        for join in &self.joins {
            out.push(join.clone());
        }
        if !self.conditions.is_empty() {
            out.push(Sql::raw("WHERE"));
            out.push(conditions(&self.conditions));
        }
        if !self.group_by.is_empty() {
            out.push(Sql::raw("GROUP BY"));
            out.push(list(self.group_by.clone()));
        }
        if !self.having.is_empty() {
            out.push(Sql::raw("HAVING"));
            out.push(conditions(&self.having));
        }
        if !self.order_by.is_empty() {
            out.push(Sql::raw("ORDER BY"));
            out.push(list(self.order_by.clone()));
        }
        if let Some(limit) = &self.limit {
            out.push(Sql::raw("LIMIT"));
            out.push(limit.clone());
        }
        if let Some(offset) = &self.offset {
            out.push(Sql::raw("OFFSET"));
            out.push(offset.clone());
        }
        out
    }
}

impl From<QueryBuilder> for Sql {
    fn from(qb: QueryBuilder) -> Self {
        qb.to_sql_node()
    }
}
