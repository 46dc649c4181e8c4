use super::context;
use super::pool::PoolConnection;
use super::{Engine, Transaction};
use crate::driver::Connection;
use crate::error::{OrmError, OrmResult};
use crate::monitor::{LifecycleEvent, QueryHook};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

type Callback = Box<dyn FnOnce()>;

struct Frame {
    id: u64,
    is_virtual: bool,
}

#[derive(Default)]
struct SessionState {
    conn: Option<PoolConnection>,
    ended: bool,
    stack: Vec<Frame>,
    next_frame: u64,
    on_commit: Vec<Callback>,
}

struct SessionInner {
    id: u64,
    engine: Engine,
    virtual_tx: Cell<bool>,
    state: RefCell<SessionState>,
}

/// A unit of work bound to at most one connection.
///
/// The connection is acquired from the engine's pool on the first statement,
/// not when the session is created. Cloning a session yields another handle
/// to the same session; it is closed once explicitly or when the last handle
/// goes away.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                engine,
                virtual_tx: Cell::new(false),
                state: RefCell::new(SessionState::default()),
            }),
        }
    }

    /// Make every transaction of this session virtual. The caller then
    /// commits the session itself.
    pub fn virtual_tx(self, virtual_tx: bool) -> Self {
        self.inner.virtual_tx.set(virtual_tx);
        self
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn is_ended(&self) -> bool {
        self.inner.state.borrow().ended
    }

    /// Whether the session currently holds a connection.
    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().conn.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        !self.inner.state.borrow().stack.is_empty()
    }

    /// Number of open transactions, virtual ones included.
    pub fn depth(&self) -> usize {
        self.inner.state.borrow().stack.len()
    }

    /// Acquire a connection now instead of on the first statement.
    pub fn connect(&self) -> OrmResult<()> {
        {
            let state = self.inner.state.borrow();
            if state.ended {
                return Err(OrmError::SessionEnded);
            }
            if state.conn.is_some() {
                return Ok(());
            }
        }
        let conn = self.inner.engine.pool().connect(true)?;
        self.inner.state.borrow_mut().conn = Some(conn);
        Ok(())
    }

    pub(crate) fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> R,
    ) -> OrmResult<R> {
        self.connect()?;
        let state = self.inner.state.borrow();
        match state.conn.as_ref() {
            Some(conn) => conn.with(f),
            None => Err(OrmError::SessionEnded),
        }
    }

    /// Commit the physical transaction.
    ///
    /// A no-op on the connection when none was acquired. Callbacks
    /// registered with [`on_commit`](Self::on_commit) run afterwards.
    pub fn commit(&self) -> OrmResult<()> {
        self.inner.commit()
    }

    /// Roll back the physical transaction and discard commit callbacks.
    pub fn rollback(&self) -> OrmResult<()> {
        self.inner.rollback()
    }

    /// Roll back uncommitted work and return the connection to the pool.
    ///
    /// Open transactions of this session end with it. Closing twice is a no-op.
    pub fn close(&self) -> OrmResult<()> {
        let result = self.inner.close();
        context::remove_all(self.inner.id);
        result
    }

    /// Register `f` to run once after the next physical commit.
    pub fn on_commit(&self, f: impl FnOnce() + 'static) -> OrmResult<()> {
        let mut state = self.inner.state.borrow_mut();
        if state.ended {
            return Err(OrmError::SessionEnded);
        }
        state.on_commit.push(Box::new(f));
        Ok(())
    }

    /// Open a transaction.
    ///
    /// The transaction is virtual if another one is already open, or if the
    /// session was created with virtual transactions. Only the outermost
    /// real transaction commits or rolls back the connection.
    pub fn begin(&self) -> OrmResult<Transaction> {
        self.begin_frame(false)
    }

    /// Open a transaction that never touches the connection.
    pub fn begin_virtual(&self) -> OrmResult<Transaction> {
        self.begin_frame(true)
    }

    fn begin_frame(&self, virtual_requested: bool) -> OrmResult<Transaction> {
        let (frame, is_virtual, outermost) = {
            let mut state = self.inner.state.borrow_mut();
            if state.ended {
                return Err(OrmError::SessionEnded);
            }
            let outermost = state.stack.is_empty();
            let is_virtual = virtual_requested || self.inner.virtual_tx.get() || !outermost;
            state.next_frame += 1;
            let frame = state.next_frame;
            state.stack.push(Frame {
                id: frame,
                is_virtual,
            });
            (frame, is_virtual, outermost)
        };
        if outermost {
            context::push(self);
        }
        Ok(Transaction::new(self.clone(), frame, is_virtual))
    }

    /// End a transaction frame.
    ///
    /// With `strict`, only the innermost open frame may end. Without it the
    /// frame is removed wherever it is, which is what dropping does.
    pub(crate) fn end_frame(&self, frame: u64, commit: bool, strict: bool) -> OrmResult<()> {
        let (is_virtual, outermost) = {
            let mut state = self.inner.state.borrow_mut();
            let Some(idx) = state.stack.iter().rposition(|f| f.id == frame) else {
                return Err(OrmError::TransactionEnded);
            };
            if strict && idx + 1 != state.stack.len() {
                return Err(OrmError::misuse(
                    "transactions must end innermost first",
                ));
            }
            let removed = state.stack.remove(idx);
            (removed.is_virtual, state.stack.is_empty())
        };

        let result = match (is_virtual, commit) {
            (true, _) => Ok(()),
            (false, true) => self.commit().or_else(|err| {
                self.inner.rollback_after_failure(&err);
                Err(err)
            }),
            (false, false) => self.rollback(),
        };
        if outermost {
            context::pop(self.inner.id);
        }
        result
    }

    /// Run `f` in a transaction: commit if it succeeds, roll back if it fails.
    ///
    /// `f` may end the transaction itself.
    pub fn transaction<R>(&self, f: impl FnOnce(&Transaction) -> OrmResult<R>) -> OrmResult<R> {
        let tx = self.begin()?;
        tx.scope(f)
    }

    /// [`transaction`](Self::transaction) with a virtual transaction.
    pub fn virtual_transaction<R>(
        &self,
        f: impl FnOnce(&Transaction) -> OrmResult<R>,
    ) -> OrmResult<R> {
        let tx = self.begin_virtual()?;
        tx.scope(f)
    }

    /// Report a failed error-path rollback without replacing `original`.
    pub(crate) fn report_rollback_failure(&self, original: &OrmError, rollback: &OrmError) {
        self.inner.report_rollback_failure(original, rollback);
    }
}

impl SessionInner {
    fn emit(&self, event: LifecycleEvent) {
        self.engine.hooks().on_event(&event);
    }

    fn commit(&self) -> OrmResult<()> {
        let (committed, callbacks) = {
            let mut state = self.state.borrow_mut();
            if state.ended {
                return Err(OrmError::SessionEnded);
            }
            let committed = match state.conn.as_ref() {
                Some(conn) => {
                    conn.with(|c| c.commit())??;
                    true
                }
                None => false,
            };
            (committed, std::mem::take(&mut state.on_commit))
        };
        if committed {
            self.emit(LifecycleEvent::Commit { session_id: self.id });
        }
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    fn rollback(&self) -> OrmResult<()> {
        let rolled_back = {
            let mut state = self.state.borrow_mut();
            if state.ended {
                return Err(OrmError::SessionEnded);
            }
            state.on_commit.clear();
            match state.conn.as_ref() {
                Some(conn) => {
                    conn.with(|c| c.rollback())??;
                    true
                }
                None => false,
            }
        };
        if rolled_back {
            self.emit(LifecycleEvent::Rollback { session_id: self.id });
        }
        Ok(())
    }

    fn rollback_after_failure(&self, original: &OrmError) {
        if let Err(rollback) = self.rollback() {
            self.report_rollback_failure(original, &rollback);
        }
    }

    fn report_rollback_failure(&self, original: &OrmError, rollback: &OrmError) {
        tracing::error!(
            target: "sqlweave.sql",
            session = self.id,
            error = %original,
            rollback_error = %rollback,
            "rollback failed"
        );
        self.emit(LifecycleEvent::RollbackFailed {
            session_id: self.id,
            message: rollback.to_string(),
        });
    }

    fn close(&self) -> OrmResult<()> {
        if self.state.borrow().ended {
            return Ok(());
        }
        let rolled_back = self.rollback();
        let conn = {
            let mut state = self.state.borrow_mut();
            state.ended = true;
            state.stack.clear();
            state.on_commit.clear();
            state.conn.take()
        };
        let Some(conn) = conn else {
            return rolled_back;
        };
        // A connection that failed to roll back is not fit for reuse.
        let force = rolled_back.is_err();
        let released = self.engine.pool().disconnect(conn, force);
        rolled_back.and(released)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(target: "sqlweave.pool", session = self.id, error = %e, "failed to close session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("connected", &state.conn.is_some())
            .field("depth", &state.stack.len())
            .field("ended", &state.ended)
            .finish()
    }
}
