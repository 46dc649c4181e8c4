//! The per-thread stack of sessions in scope.
//!
//! A session is pushed while its outermost transaction is open and while an
//! [`Engine::with_session`] block runs. Each thread has its own stack, so two
//! threads never see each other's ambient transaction.

use super::{Engine, Session, Transaction};
use crate::error::{OrmError, OrmResult};
use std::cell::RefCell;

thread_local! {
    static STACK: RefCell<Vec<Session>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn push(session: &Session) {
    STACK.with(|stack| stack.borrow_mut().push(session.clone()));
}

/// Remove the innermost entry of `session_id`.
pub(crate) fn pop(session_id: u64) {
    // Dropping the removed session may close it, which touches the stack again.
    let removed = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack
            .iter()
            .rposition(|s| s.id() == session_id)
            .map(|idx| stack.remove(idx))
    });
    drop(removed);
}

/// Remove every entry of `session_id`.
pub(crate) fn remove_all(session_id: u64) {
    let removed: Vec<Session> = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let (gone, kept): (Vec<Session>, Vec<Session>) =
            stack.drain(..).partition(|s| s.id() == session_id);
        *stack = kept;
        gone
    });
    drop(removed);
}

/// Pops its session from the stack when dropped.
pub(crate) struct ContextGuard {
    session_id: u64,
}

impl ContextGuard {
    pub(crate) fn enter(session: &Session) -> Self {
        push(session);
        Self {
            session_id: session.id(),
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        pop(self.session_id);
    }
}

/// The session in scope in this thread.
pub fn current_session() -> Option<Session> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Number of sessions in scope in this thread.
pub fn session_depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// Run `f` with a usable session.
///
/// Reuses the current session if there is one. Otherwise a session of
/// `engine` is opened with virtual transactions only and closed afterwards,
/// which rolls back anything it did. Without either, fails with
/// [`OrmError::MissingSession`].
pub fn ensure_session<R>(
    engine: Option<&Engine>,
    f: impl FnOnce(&Session) -> OrmResult<R>,
) -> OrmResult<R> {
    if let Some(session) = current_session() {
        return f(&session);
    }
    let engine = engine.ok_or(OrmError::MissingSession)?;
    let session = engine.session().virtual_tx(true);
    engine.run_session(session, f)
}

/// Run `f` inside a virtual transaction of the current or a temporary session.
///
/// Meant for leaf helpers that must work both inside an explicit
/// transaction and standalone.
pub fn ensure_transaction<R>(
    engine: Option<&Engine>,
    f: impl FnOnce(&Transaction) -> OrmResult<R>,
) -> OrmResult<R> {
    ensure_session(engine, |session| session.virtual_transaction(f))
}

/// Run `f` in a transaction that commits on success.
///
/// With an engine this is [`Engine::transaction`]: it nests into the current
/// session only when that session belongs to `engine`. Without one it nests
/// into the current session, whatever its engine.
pub fn transaction<R>(
    engine: Option<&Engine>,
    f: impl FnOnce(&Transaction) -> OrmResult<R>,
) -> OrmResult<R> {
    match engine {
        Some(engine) => engine.transaction(f),
        None => current_session()
            .ok_or(OrmError::MissingSession)?
            .transaction(f),
    }
}

/// Register `f` to run after the current session's next physical commit.
///
/// Discarded if the session rolls back first.
pub fn after_commit(f: impl FnOnce() + 'static) -> OrmResult<()> {
    current_session()
        .ok_or(OrmError::MissingSession)?
        .on_commit(f)
}
