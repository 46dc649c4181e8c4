//! Execution hooks.
//!
//! Hooks observe every statement a transaction runs and every connection
//! lifecycle change. They can rewrite or cancel a statement before it runs
//! and recover from driver failures:
//!
//! ```rust,ignore
//! use sqlweave::monitor::{HookAction, QueryContext, QueryHook, QueryType};
//!
//! struct ReadOnly;
//!
//! impl QueryHook for ReadOnly {
//!     fn before_execute(&self, ctx: &QueryContext) -> HookAction {
//!         match ctx.query_type {
//!             QueryType::Select => HookAction::Continue,
//!             _ => HookAction::Cancel,
//!         }
//!     }
//! }
//!
//! let engine = Engine::from_uri("sqlite://app.db")?.with_hook(ReadOnly);
//! ```

mod hooks;
mod tracing_hook;
mod types;


pub use hooks::{CompositeHook, QueryStats, StatsHook};
pub use tracing_hook::TracingSqlHook;
pub use types::{
    ErrorAction, HookAction, LifecycleEvent, QueryContext, QueryHook, QueryResult, QueryType,
};

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
