use super::Session;
use crate::driver::{Cursor, MemoryCursor};
use crate::error::{OrmError, OrmResult};
use crate::monitor::{ErrorAction, HookAction, QueryContext, QueryHook, QueryResult, QueryType};
use crate::record::FromRecord;
use crate::resultset::{CompositeResultSet, CompositionMap, ResultSet};
use crate::row::{FromRow, Row};
use crate::sql::{Params, Statement, split_statements};
use crate::value::Value;
use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

/// A transaction scope on a [`Session`].
///
/// Only the outermost non-virtual transaction of a session commits or rolls
/// back the connection; nested ones are virtual and end without effect.
/// Transactions end innermost first. A transaction dropped while still open
/// rolls back.
pub struct Transaction {
    session: Session,
    frame: u64,
    is_virtual: bool,
    ended: Cell<bool>,
}

impl Transaction {
    pub(crate) fn new(session: Session, frame: u64, is_virtual: bool) -> Self {
        Self {
            session,
            frame,
            is_virtual,
            ended: Cell::new(false),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    pub fn commit(&self) -> OrmResult<()> {
        self.finish(true)
    }

    pub fn rollback(&self) -> OrmResult<()> {
        self.finish(false)
    }

    fn finish(&self, commit: bool) -> OrmResult<()> {
        if self.ended.get() {
            return Err(OrmError::TransactionEnded);
        }
        let result = self.session.end_frame(self.frame, commit, true);
        if !matches!(result, Err(OrmError::Misuse(_))) {
            self.ended.set(true);
        }
        result
    }

    /// Run `f`, then commit on success or roll back on failure unless `f`
    /// already ended the transaction.
    pub(crate) fn scope<R>(self, f: impl FnOnce(&Transaction) -> OrmResult<R>) -> OrmResult<R> {
        match f(&self) {
            Ok(value) => {
                if !self.is_ended() {
                    self.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                if !self.is_ended() {
                    if let Err(rollback) = self.rollback() {
                        self.session.report_rollback_failure(&err, &rollback);
                    }
                }
                Err(err)
            }
        }
    }

    /// Run `f` in a nested (virtual) transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&Transaction) -> OrmResult<R>) -> OrmResult<R> {
        self.ensure_open()?;
        self.session.transaction(f)
    }

    fn ensure_open(&self) -> OrmResult<()> {
        if self.ended.get() {
            return Err(OrmError::TransactionEnded);
        }
        if self.session.is_ended() {
            return Err(OrmError::SessionEnded);
        }
        Ok(())
    }

    fn after(
        hooks: &dyn QueryHook,
        ctx: &QueryContext,
        started: Option<Instant>,
        result: QueryResult,
    ) {
        let elapsed = started.map(|s| s.elapsed()).unwrap_or(Duration::ZERO);
        hooks.after_execute(ctx, elapsed, &result);
    }

    /// Render and execute a statement, returning its raw cursor.
    ///
    /// Rendering errors surface before any connection is touched. Hooks may
    /// rewrite or cancel the statement and recover from driver failures;
    /// unrecovered failures carry the statement and its parameters.
    pub fn cursor(&self, stmt: impl Statement, params: Params) -> OrmResult<Box<dyn Cursor>> {
        self.ensure_open()?;
        let engine = self.session.engine();
        let rendered = stmt.render_with(params, engine.paramstyle())?;
        let hooks = engine.hooks();

        let mut ctx =
            QueryContext::new(rendered.sql, rendered.params).with_session(self.session.id());
        match hooks.before_execute(&ctx) {
            HookAction::Continue => {}
            HookAction::Replace { sql, params } => {
                ctx.query_type = QueryType::from_sql(&sql);
                ctx.sql = sql;
                ctx.params = params;
            }
            HookAction::Cancel => {
                Self::after(hooks.as_ref(), &ctx, None, QueryResult::Cancelled);
                return Ok(Box::new(MemoryCursor::cancelled()));
            }
        }

        let started = Instant::now();
        let executed = self
            .session
            .with_connection(|conn| conn.execute(&ctx.sql, &ctx.params))?;
        match executed {
            Ok(cursor) => {
                let rows_affected = cursor.rows_affected();
                Self::after(
                    hooks.as_ref(),
                    &ctx,
                    Some(started),
                    QueryResult::Executed { rows_affected },
                );
                Ok(cursor)
            }
            Err(err) => match hooks.handle_error(&ctx, &err) {
                ErrorAction::Propagate => {
                    Self::after(
                        hooks.as_ref(),
                        &ctx,
                        Some(started),
                        QueryResult::error(err.to_string()),
                    );
                    Err(OrmError::execution(ctx.sql, ctx.params.to_string(), err))
                }
                ErrorAction::Suppress => {
                    Self::after(hooks.as_ref(), &ctx, Some(started), QueryResult::Recovered(0));
                    Ok(Box::new(MemoryCursor::default()))
                }
                ErrorAction::Replace(rows) => {
                    Self::after(
                        hooks.as_ref(),
                        &ctx,
                        Some(started),
                        QueryResult::Recovered(rows.len()),
                    );
                    Ok(Box::new(MemoryCursor::new(rows)))
                }
            },
        }
    }

    /// Execute a statement and return the number of affected rows.
    pub fn execute(&self, stmt: impl Statement, params: Params) -> OrmResult<u64> {
        let mut cursor = self.cursor(stmt, params)?;
        let affected = cursor.rows_affected();
        cursor.close();
        Ok(affected)
    }

    /// Execute one statement for every parameter set.
    ///
    /// The statement itself must not embed bound values; hooks see it once
    /// with the batch size and may only replace its text.
    pub fn execute_many(&self, stmt: impl Statement, batch: &[Params]) -> OrmResult<u64> {
        self.ensure_open()?;
        let engine = self.session.engine();
        let rendered = stmt.render_with(Params::default(), engine.paramstyle())?;
        if !rendered.params.is_empty() {
            return Err(OrmError::parameter(
                "execute_many statements cannot embed bound values",
            ));
        }
        let hooks = engine.hooks();

        let mut ctx =
            QueryContext::batch(rendered.sql, batch.len()).with_session(self.session.id());
        match hooks.before_execute(&ctx) {
            HookAction::Continue => {}
            HookAction::Replace { sql, .. } => {
                ctx.query_type = QueryType::from_sql(&sql);
                ctx.sql = sql;
            }
            HookAction::Cancel => {
                Self::after(hooks.as_ref(), &ctx, None, QueryResult::Cancelled);
                return Ok(0);
            }
        }

        let started = Instant::now();
        let executed = self
            .session
            .with_connection(|conn| conn.execute_many(&ctx.sql, batch))?;
        match executed {
            Ok(rows_affected) => {
                Self::after(
                    hooks.as_ref(),
                    &ctx,
                    Some(started),
                    QueryResult::Executed { rows_affected },
                );
                Ok(rows_affected)
            }
            Err(err) => match hooks.handle_error(&ctx, &err) {
                ErrorAction::Propagate => {
                    Self::after(
                        hooks.as_ref(),
                        &ctx,
                        Some(started),
                        QueryResult::error(err.to_string()),
                    );
                    Err(OrmError::execution(
                        ctx.sql,
                        format!("{} parameter sets", batch.len()),
                        err,
                    ))
                }
                ErrorAction::Suppress | ErrorAction::Replace(_) => {
                    Self::after(hooks.as_ref(), &ctx, Some(started), QueryResult::Recovered(0));
                    Ok(0)
                }
            },
        }
    }

    /// Execute every `;`-separated statement of a script in order.
    pub fn execute_script(&self, script: &str) -> OrmResult<()> {
        for stmt in split_statements(script) {
            self.execute(stmt, Params::default())?;
        }
        Ok(())
    }

    /// Stream the rows of a query.
    pub fn fetch(&self, stmt: impl Statement, params: Params) -> OrmResult<ResultSet> {
        Ok(ResultSet::new(self.cursor(stmt, params)?))
    }

    pub fn fetch_all(&self, stmt: impl Statement, params: Params) -> OrmResult<Vec<Row>> {
        self.fetch(stmt, params)?.all()
    }

    /// The first row, if any; the rest of the result is discarded.
    pub fn fetch_one(&self, stmt: impl Statement, params: Params) -> OrmResult<Option<Row>> {
        self.fetch(stmt, params)?.first()
    }

    /// First column of the first row.
    pub fn fetch_scalar(&self, stmt: impl Statement, params: Params) -> OrmResult<Option<Value>> {
        self.fetch(stmt, params)?.scalar()
    }

    /// First column of every row.
    pub fn fetch_scalars(&self, stmt: impl Statement, params: Params) -> OrmResult<Vec<Value>> {
        self.fetch(stmt, params)?.scalars()
    }

    /// Stream rows converted with [`FromRow`].
    pub fn fetch_as<T: FromRow + 'static>(
        &self,
        stmt: impl Statement,
        params: Params,
    ) -> OrmResult<ResultSet<T>> {
        Ok(self.fetch(stmt, params)?.map(|row| T::from_row(&row)))
    }

    /// Stream nested records rebuilt from a joined query.
    pub fn fetch_composite(
        &self,
        stmt: impl Statement,
        params: Params,
        map: CompositionMap,
    ) -> OrmResult<CompositeResultSet> {
        let cursor = self.cursor(stmt, params)?;
        let separator = self.session.engine().config().separator.clone();
        Ok(CompositeResultSet::new(cursor, map).separator(separator))
    }

    /// [`fetch_composite`](Self::fetch_composite) hydrating top-level records into `T`.
    pub fn fetch_hydrated<T: FromRecord + 'static>(
        &self,
        stmt: impl Statement,
        params: Params,
        map: CompositionMap,
    ) -> OrmResult<CompositeResultSet<T>> {
        Ok(self.fetch_composite(stmt, params, map)?.hydrate::<T>())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.ended.get() || self.session.is_ended() {
            return;
        }
        self.ended.set(true);
        tracing::warn!(
            target: "sqlweave.sql",
            session = self.session.id(),
            is_virtual = self.is_virtual,
            "transaction dropped while open, rolling back"
        );
        match self.session.end_frame(self.frame, false, false) {
            Ok(()) | Err(OrmError::TransactionEnded) | Err(OrmError::SessionEnded) => {}
            Err(e) => {
                tracing::error!(
                    target: "sqlweave.sql",
                    session = self.session.id(),
                    error = %e,
                    "rollback on drop failed"
                );
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session.id())
            .field("virtual", &self.is_virtual)
            .field("ended", &self.ended.get())
            .finish()
    }
}
