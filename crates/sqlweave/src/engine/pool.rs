use super::Hooks;
use crate::driver::{Connection, Driver};
use crate::error::{OrmError, OrmResult};
use crate::monitor::{LifecycleEvent, QueryHook};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Connection ids are unique per process so a connection can never be
/// mistaken for one of another pool.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

type Slot = Arc<Mutex<Option<Box<dyn Connection>>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Box<dyn Connection>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection handed out by a [`Pool`].
///
/// The pool keeps a handle on every checked-out connection so
/// [`Pool::disconnect_all`] can close it; using a handle afterwards fails with
/// a connection error.
pub struct PoolConnection {
    id: u64,
    slot: Slot,
}

impl PoolConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the physical connection was already closed.
    pub fn is_closed(&self) -> bool {
        lock_slot(&self.slot).is_none()
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Connection) -> R) -> OrmResult<R> {
        let mut guard = lock_slot(&self.slot);
        match guard.as_mut() {
            Some(conn) => Ok(f(conn.as_mut())),
            None => Err(OrmError::Connection(format!(
                "connection {} is closed",
                self.id
            ))),
        }
    }
}

impl fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<(u64, Slot)>,
    active: HashMap<u64, Slot>,
    /// Connections being opened outside the lock; they count toward the cap.
    opening: usize,
}

/// Produces connections and tracks which ones are idle or checked out.
///
/// All list updates happen under one mutex, so concurrent `connect` and
/// `disconnect` calls never lease the same connection twice.
pub struct Pool {
    driver: Arc<dyn Driver>,
    pooling: bool,
    max_conns: Option<usize>,
    hooks: Arc<Hooks>,
    state: Mutex<PoolState>,
}

impl Pool {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        pooling: bool,
        max_conns: Option<usize>,
        hooks: Arc<Hooks>,
    ) -> Self {
        Self {
            driver,
            pooling,
            max_conns,
            hooks,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn is_pooling(&self) -> bool {
        self.pooling
    }

    pub fn max_conns(&self) -> Option<usize> {
        self.max_conns
    }

    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LifecycleEvent) {
        self.hooks.snapshot().on_event(&event);
    }

    fn open(&self) -> OrmResult<(u64, Slot)> {
        let conn = self.driver.connect()?;
        let id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "sqlweave.pool",
            conn_id = id,
            driver = self.driver.name(),
            "connection opened"
        );
        self.emit(LifecycleEvent::ConnectionOpened { conn_id: id });
        Ok((id, Arc::new(Mutex::new(Some(conn)))))
    }

    fn close_slot(&self, id: u64, slot: &Slot) -> OrmResult<()> {
        let Some(conn) = lock_slot(slot).take() else {
            return Ok(());
        };
        self.close_conn(id, conn)
    }

    fn close_conn(&self, id: u64, conn: Box<dyn Connection>) -> OrmResult<()> {
        let result = conn.close();
        tracing::debug!(target: "sqlweave.pool", conn_id = id, "connection closed");
        self.emit(LifecycleEvent::ConnectionClosed { conn_id: id });
        result
    }

    /// Get a connection.
    ///
    /// With `from_pool == false` or pooling disabled a new untracked
    /// connection is opened and the caller is responsible for closing it.
    /// Otherwise an idle connection is reused, or a new one opened while the
    /// number of checked-out connections is below the cap.
    pub fn connect(&self, from_pool: bool) -> OrmResult<PoolConnection> {
        if !from_pool || !self.pooling {
            let (id, slot) = self.open()?;
            return Ok(PoolConnection { id, slot });
        }

        {
            let mut state = self.lock();
            if let Some((id, slot)) = state.idle.pop_front() {
                state.active.insert(id, slot.clone());
                drop(state);
                tracing::debug!(target: "sqlweave.pool", conn_id = id, "connection checked out");
                self.emit(LifecycleEvent::CheckedOut { conn_id: id });
                return Ok(PoolConnection { id, slot });
            }
            if let Some(max) = self.max_conns {
                if state.active.len() + state.opening >= max {
                    return Err(OrmError::Capacity { max });
                }
            }
            state.opening += 1;
        }

        let opened = self.open();
        let mut state = self.lock();
        state.opening -= 1;
        let (id, slot) = opened?;
        state.active.insert(id, slot.clone());
        drop(state);
        tracing::debug!(target: "sqlweave.pool", conn_id = id, "connection checked out");
        self.emit(LifecycleEvent::CheckedOut { conn_id: id });
        Ok(PoolConnection { id, slot })
    }

    /// Give a connection back.
    ///
    /// The connection returns to the idle list unless `force` is set or
    /// pooling is disabled, in which case it is closed. Returning a live
    /// connection this pool did not hand out is a misuse error.
    pub fn disconnect(&self, conn: PoolConnection, force: bool) -> OrmResult<()> {
        let tracked = self.lock().active.remove(&conn.id).is_some();

        if force || !self.pooling {
            return self.close_slot(conn.id, &conn.slot);
        }
        if conn.is_closed() {
            return Ok(());
        }
        if !tracked {
            return Err(OrmError::misuse(format!(
                "connection {} is not checked out from this pool",
                conn.id
            )));
        }

        self.lock().idle.push_back((conn.id, conn.slot));
        tracing::debug!(target: "sqlweave.pool", conn_id = conn.id, "connection checked in");
        self.emit(LifecycleEvent::CheckedIn { conn_id: conn.id });
        Ok(())
    }

    /// Close every idle and checked-out connection.
    ///
    /// Handles still held by sessions stay valid objects but fail on use.
    /// Every connection is closed even if some fail; the first failure is
    /// returned.
    pub fn disconnect_all(&self) -> OrmResult<()> {
        // Slots are emptied before the pool lock is released, so a concurrent
        // `disconnect` of a drained connection finds it closed.
        let conns: Vec<(u64, Box<dyn Connection>)> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state
                .idle
                .drain(..)
                .chain(state.active.drain())
                .filter_map(|(id, slot)| {
                    let conn = lock_slot(&slot).take();
                    conn.map(|conn| (id, conn))
                })
                .collect()
        };
        tracing::debug!(target: "sqlweave.pool", count = conns.len(), "closing all connections");

        let mut first_err = None;
        for (id, conn) in conns {
            if let Err(e) = self.close_conn(id, conn) {
                tracing::error!(target: "sqlweave.pool", conn_id = id, error = %e, "failed to close connection");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Pool")
            .field("driver", &self.driver.name())
            .field("pooling", &self.pooling)
            .field("max_conns", &self.max_conns)
            .field("idle", &state.idle.len())
            .field("active", &state.active.len())
            .finish()
    }
}
