use super::truncate_sql_bytes;
use super::types::{HookAction, LifecycleEvent, QueryContext, QueryHook};
use tracing::Level;

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// A `tracing`-based hook that emits every statement before it runs, plus
/// `COMMIT` and `ROLLBACK` when a session ends its physical transaction.
///
/// Engines install one automatically when `EngineConfig::log_level` is set.
#[derive(Debug, Clone)]
pub struct TracingSqlHook {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Also emit bound parameter values.
    pub with_params: bool,
}

impl Default for TracingSqlHook {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
            with_params: false,
        }
    }
}

impl TracingSqlHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn with_params(mut self, with_params: bool) -> Self {
        self.with_params = with_params;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryHook for TracingSqlHook {
    fn before_execute(&self, ctx: &QueryContext) -> HookAction {
        let sql = self.truncate_sql(&ctx.sql);
        match (self.with_params, ctx.batch_size) {
            (_, Some(batch_size)) => emit_at_level!(
                self.level,
                target: "sqlweave.sql",
                query_type = ?ctx.query_type,
                session = ctx.session_id,
                batch_size,
                sql = %sql,
            ),
            (true, None) => emit_at_level!(
                self.level,
                target: "sqlweave.sql",
                query_type = ?ctx.query_type,
                session = ctx.session_id,
                param_count = ctx.param_count(),
                params = %ctx.params,
                sql = %sql,
            ),
            (false, None) => emit_at_level!(
                self.level,
                target: "sqlweave.sql",
                query_type = ?ctx.query_type,
                session = ctx.session_id,
                param_count = ctx.param_count(),
                sql = %sql,
            ),
        }
        HookAction::Continue
    }

    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Commit { session_id } => emit_at_level!(
                self.level,
                target: "sqlweave.sql",
                session = *session_id,
                sql = "COMMIT",
            ),
            LifecycleEvent::Rollback { session_id } => emit_at_level!(
                self.level,
                target: "sqlweave.sql",
                session = *session_id,
                sql = "ROLLBACK",
            ),
            _ => {}
        }
    }
}
