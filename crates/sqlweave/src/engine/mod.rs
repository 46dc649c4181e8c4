//! Engines, pooled connections, sessions and transactions.
//!
//! An [`Engine`] owns a driver, a [`Pool`] and the registered hooks. Work
//! happens in a [`Session`], which borrows one connection from the pool the
//! first time it runs a statement, and inside [`Transaction`]s opened on the
//! session:
//!
//! ```rust,ignore
//! use sqlweave::{Engine, params};
//!
//! let engine = Engine::from_uri("sqlite://:memory:?max_pool_conns=4")?;
//! engine.transaction(|tx| {
//!     tx.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", params!())?;
//!     tx.execute("INSERT INTO users (name) VALUES (?)", params!["alice"])?;
//!     Ok(())
//! })?;
//! ```
//!
//! Sessions with an open transaction are discoverable per thread through
//! [`current_session`], so helpers can join the caller's transaction without
//! being handed it.

mod config;
mod context;
mod pool;
mod session;
mod transaction;


pub use config::{ConnectUri, EngineConfig, LogLevel};
pub use context::{
    after_commit, current_session, ensure_session, ensure_transaction, session_depth, transaction,
};
pub use pool::{Pool, PoolConnection};
pub use session::Session;
pub use transaction::Transaction;

use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::monitor::{CompositeHook, QueryHook, TracingSqlHook};
use crate::sql::ParamStyle;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Registered hooks, copied on write so executions never hold the lock.
#[derive(Default)]
pub(crate) struct Hooks {
    current: RwLock<Arc<CompositeHook>>,
}

impl Hooks {
    pub(crate) fn snapshot(&self) -> Arc<CompositeHook> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add(&self, hook: Arc<dyn QueryHook>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = CompositeHook::clone(&current);
        next.push(hook);
        *current = Arc::new(next);
    }
}

struct EngineInner {
    id: u64,
    config: EngineConfig,
    paramstyle: ParamStyle,
    pool: Pool,
    hooks: Arc<Hooks>,
}

/// A connection factory and the entry point for sessions.
///
/// Cheap to clone and shareable across threads; sessions themselves stay on
/// the thread that opened them.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(driver: impl Driver + 'static, config: EngineConfig) -> Self {
        Self::from_driver(Arc::new(driver), config)
    }

    pub fn from_driver(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        let hooks = Arc::new(Hooks::default());
        if let Some(level) = config.log_level {
            hooks.add(Arc::new(
                TracingSqlHook::new()
                    .level(level.as_tracing())
                    .with_params(true),
            ));
        }
        let paramstyle = config.paramstyle.unwrap_or_else(|| driver.paramstyle());
        let pool = Pool::new(driver, config.pool, config.max_conns(), hooks.clone());
        Self {
            inner: Arc::new(EngineInner {
                id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                paramstyle,
                pool,
                hooks,
            }),
        }
    }

    /// Build an engine from a `driver://target?option=value` URI.
    ///
    /// Engine options (`pool`, `max_pool_conns`, `paramstyle`, `log_level`,
    /// `separator`) are taken from the query string; the remaining options go
    /// to the driver. The built-in driver names are `sqlite` and `sqlite3`.
    pub fn from_uri(uri: &str) -> OrmResult<Self> {
        Self::from_uri_with(uri, EngineConfig::default())
    }

    /// [`from_uri`](Self::from_uri) starting from `config` instead of the defaults.
    #[cfg_attr(not(feature = "sqlite"), allow(unused_variables, unreachable_code))]
    pub fn from_uri_with(uri: &str, mut config: EngineConfig) -> OrmResult<Self> {
        let uri = ConnectUri::parse(uri)?;
        let driver_options = config.apply_options(uri.options.clone())?;
        let driver: Arc<dyn Driver> = match uri.driver.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" | "sqlite3" => Arc::new(crate::drivers::sqlite::SqliteDriver::from_options(
                &uri.target,
                driver_options,
            )?),
            other => return Err(OrmError::Config(format!("unknown driver '{other}'"))),
        };
        Ok(Self::from_driver(driver, config))
    }

    /// Register a hook.
    pub fn with_hook(self, hook: impl QueryHook + 'static) -> Self {
        self.add_hook(Arc::new(hook));
        self
    }

    /// Register a shared hook. Hooks run in registration order.
    pub fn add_hook(&self, hook: Arc<dyn QueryHook>) {
        self.inner.hooks.add(hook);
    }

    pub(crate) fn hooks(&self) -> Arc<CompositeHook> {
        self.inner.hooks.snapshot()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether both handles refer to the same engine.
    pub fn same(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Placeholder dialect statements are rendered in.
    pub fn paramstyle(&self) -> ParamStyle {
        self.inner.paramstyle
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// Check a connection out of the pool. See [`Pool::connect`].
    pub fn connect(&self, from_pool: bool) -> OrmResult<PoolConnection> {
        self.inner.pool.connect(from_pool)
    }

    /// Give a connection back. See [`Pool::disconnect`].
    pub fn disconnect(&self, conn: PoolConnection, force: bool) -> OrmResult<()> {
        self.inner.pool.disconnect(conn, force)
    }

    /// Close every pooled connection, for shutdown.
    pub fn disconnect_all(&self) -> OrmResult<()> {
        self.inner.pool.disconnect_all()
    }

    /// A new session. No connection is taken until it runs a statement.
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Run `f` with a new session that is current for this thread while `f`
    /// runs and is closed afterwards.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> OrmResult<R>) -> OrmResult<R> {
        self.run_session(self.session(), f)
    }

    /// Run `f` in a transaction that commits on success.
    ///
    /// Joins the thread's current session when it belongs to this engine;
    /// otherwise a session is opened for the duration of `f`.
    pub fn transaction<R>(&self, f: impl FnOnce(&Transaction) -> OrmResult<R>) -> OrmResult<R> {
        match current_session() {
            Some(session) if session.engine().same(self) => session.transaction(f),
            _ => self.run_session(self.session(), |session| session.transaction(f)),
        }
    }

    pub(crate) fn run_session<R>(
        &self,
        session: Session,
        f: impl FnOnce(&Session) -> OrmResult<R>,
    ) -> OrmResult<R> {
        let guard = context::ContextGuard::enter(&session);
        let result = f(&session);
        drop(guard);
        let closed = session.close();
        match result {
            Ok(value) => closed.map(|()| value),
            Err(err) => {
                if let Err(close_err) = closed {
                    tracing::error!(
                        target: "sqlweave.pool",
                        session = session.id(),
                        error = %close_err,
                        "failed to close session after error"
                    );
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.inner.id)
            .field("paramstyle", &self.inner.paramstyle)
            .field("pool", &self.inner.pool)
            .finish()
    }
}
