//! # sqlweave
//!
//! Composable SQL, eager-load row reconstruction and pooled sessions over
//! synchronous drivers.
//!
//! ## Features
//!
//! - **Composable SQL**: statements are trees of [`Sql`] nodes rendered in any
//!   paramstyle; values are always bound, never inlined
//! - **Templates**: `{name}` splices and `%(name)s` binds a local in [`sql::SqlTemplate`];
//!   `{{` / `}}` escape literal braces
//! - **DML helpers**: mapping-driven `INSERT` / `UPDATE` / `DELETE`
//! - **Composite rows**: rebuild one-to-many and one-to-one graphs from flat
//!   `LEFT JOIN` results with [`CompositionMap`]
//! - **Sessions**: lazily connected sessions, nested virtual transactions and
//!   per-thread ambient session discovery
//! - **Hooks**: inspect, rewrite, cancel or recover statements with [`monitor::QueryHook`]
//!
//! ## Quick start
//!
//! ```ignore
//! use sqlweave::{Engine, params};
//! use sqlweave::sql::{Column, ColumnList, Sql, Statement};
//!
//! let engine = Engine::from_uri("sqlite://app.db?max_pool_conns=4")?;
//!
//! let adults = Sql::select(ColumnList::new(["id", "name"]))
//!     .from_("users")
//!     .where_(Column::new("age").ge(18));
//!
//! let names: Vec<(i64, String)> =
//!     engine.transaction(|tx| tx.fetch_as::<(i64, String)>(&adults, params!())?.all())?;
//! ```

pub mod driver;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod record;
pub mod resultset;
pub mod row;
pub mod sql;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Column-name separator between relation path and field in composite results.
pub const DEFAULT_SEPARATOR: &str = "__";

pub use driver::{Connection, Cursor, Driver, MemoryCursor};
pub use engine::{
    ConnectUri, Engine, EngineConfig, LogLevel, Session, Transaction, after_commit,
    current_session, ensure_session, ensure_transaction, session_depth, transaction,
};
pub use error::{OrmError, OrmResult};
pub use monitor::{ErrorAction, HookAction, QueryContext, QueryHook, QueryResult};
pub use record::{Field, FromRecord, Record};
pub use resultset::{CompositeResultSet, CompositionMap, ResultSet};
pub use row::{FromRow, Row, RowAccess, RowExt};
pub use sql::{ParamStyle, Params, Sql, SqlTemplate, Statement};
pub use value::{FromValue, Value};

#[cfg(feature = "sqlite")]
pub use drivers::SqliteDriver;
