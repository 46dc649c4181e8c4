use super::types::{
    ErrorAction, HookAction, LifecycleEvent, QueryContext, QueryHook, QueryResult, QueryType,
};
use crate::error::OrmError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A composite hook that runs multiple hooks in sequence.
///
/// Replacements chain: each hook sees the statement as rewritten by the
/// hooks before it. The first `Cancel` stops the chain.
#[derive(Clone, Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn QueryHook>>,
}

impl CompositeHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook.
    #[allow(clippy::should_implement_trait)]
    pub fn add<H: QueryHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Add an Arc-wrapped hook.
    pub fn add_arc(mut self, hook: Arc<dyn QueryHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn QueryHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for CompositeHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeHook")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl QueryHook for CompositeHook {
    fn before_execute(&self, ctx: &QueryContext) -> HookAction {
        let mut current: Option<QueryContext> = None;
        for hook in &self.hooks {
            match hook.before_execute(current.as_ref().unwrap_or(ctx)) {
                HookAction::Continue => {}
                HookAction::Replace { sql, params } => {
                    let next = current.get_or_insert_with(|| ctx.clone());
                    next.query_type = QueryType::from_sql(&sql);
                    next.sql = sql;
                    next.params = params;
                }
                HookAction::Cancel => return HookAction::Cancel,
            }
        }
        match current {
            Some(next) => HookAction::Replace {
                sql: next.sql,
                params: next.params,
            },
            None => HookAction::Continue,
        }
    }

    fn after_execute(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        for hook in &self.hooks {
            hook.after_execute(ctx, duration, result);
        }
    }

    fn handle_error(&self, ctx: &QueryContext, error: &OrmError) -> ErrorAction {
        for hook in &self.hooks {
            match hook.handle_error(ctx, error) {
                ErrorAction::Propagate => {}
                action => return action,
            }
        }
        ErrorAction::Propagate
    }

    fn on_event(&self, event: &LifecycleEvent) {
        for hook in &self.hooks {
            hook.on_event(event);
        }
    }
}

/// A hook that tracks execution statistics.
#[derive(Debug, Default)]
pub struct StatsHook {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    cancelled_queries: AtomicU64,
    recovered_queries: AtomicU64,
    total_duration_nanos: AtomicU64,
    select_count: AtomicU64,
    insert_count: AtomicU64,
    update_count: AtomicU64,
    delete_count: AtomicU64,
    commit_count: AtomicU64,
    rollback_count: AtomicU64,
    connections_opened: AtomicU64,
    max_duration_nanos: AtomicU64,
    slowest_query: Mutex<Option<String>>,
}

/// Collected execution statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    /// Statements that reached `after_execute`, cancelled ones included.
    pub total_queries: u64,
    pub failed_queries: u64,
    pub cancelled_queries: u64,
    /// Failures an error hook recovered from.
    pub recovered_queries: u64,
    pub total_duration: Duration,
    pub select_count: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    /// Physical commits.
    pub commit_count: u64,
    /// Physical rollbacks.
    pub rollback_count: u64,
    pub connections_opened: u64,
    pub max_duration: Duration,
    pub slowest_query: Option<String>,
}

impl StatsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> QueryStats {
        QueryStats {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            cancelled_queries: self.cancelled_queries.load(Ordering::Relaxed),
            recovered_queries: self.recovered_queries.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            select_count: self.select_count.load(Ordering::Relaxed),
            insert_count: self.insert_count.load(Ordering::Relaxed),
            update_count: self.update_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            commit_count: self.commit_count.load(Ordering::Relaxed),
            rollback_count: self.rollback_count.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            max_duration: Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed)),
            slowest_query: self.slowest().clone(),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.total_queries,
            &self.failed_queries,
            &self.cancelled_queries,
            &self.recovered_queries,
            &self.total_duration_nanos,
            &self.select_count,
            &self.insert_count,
            &self.update_count,
            &self.delete_count,
            &self.commit_count,
            &self.rollback_count,
            &self.connections_opened,
            &self.max_duration_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.slowest() = None;
    }

    fn slowest(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slowest_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryHook for StatsHook {
    fn after_execute(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        let duration_nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

        self.total_queries.fetch_add(1, Ordering::Relaxed);
        let prev_total = self
            .total_duration_nanos
            .fetch_add(duration_nanos, Ordering::Relaxed);
        if prev_total.checked_add(duration_nanos).is_none() {
            self.total_duration_nanos.store(u64::MAX, Ordering::Relaxed);
        }

        match result {
            QueryResult::Executed { .. } => {}
            QueryResult::Cancelled => {
                self.cancelled_queries.fetch_add(1, Ordering::Relaxed);
                return;
            }
            QueryResult::Recovered(_) => {
                self.recovered_queries.fetch_add(1, Ordering::Relaxed);
            }
            QueryResult::Error(_) => {
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
            }
        }

        let counter = match ctx.query_type {
            QueryType::Select => &self.select_count,
            QueryType::Insert => &self.insert_count,
            QueryType::Update => &self.update_count,
            QueryType::Delete => &self.delete_count,
            QueryType::Other => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        // Update max duration + slowest query only when we actually become the new max.
        let mut current_max = self.max_duration_nanos.load(Ordering::Relaxed);
        while duration_nanos > current_max {
            match self.max_duration_nanos.compare_exchange_weak(
                current_max,
                duration_nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    *self.slowest() = Some(ctx.sql.clone());
                    break;
                }
                Err(updated) => current_max = updated,
            }
        }
    }

    fn on_event(&self, event: &LifecycleEvent) {
        let counter = match event {
            LifecycleEvent::Commit { .. } => &self.commit_count,
            LifecycleEvent::Rollback { .. } => &self.rollback_count,
            LifecycleEvent::ConnectionOpened { .. } => &self.connections_opened,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
