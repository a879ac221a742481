//! Thread-scoped, re-entrant session scopes.
//!
//! The first [`ConnectionScope`] a thread opens on a pool checks a session
//! out; scopes opened while it is alive, on the same thread and pool, reuse
//! it. The session goes back to the pool when the outermost scope drops.
//! Different threads never share a session, and scopes on different pools
//! are independent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::driver::Session;
use crate::error::Result;
use crate::pool::{PooledSession, TaosPool};

struct Slot {
    session: Rc<PooledSession>,
    depth: usize,
}

thread_local! {
    static SCOPES: RefCell<HashMap<u64, Slot>> = RefCell::new(HashMap::new());
}

static NEXT_SCOPE_KEY: AtomicU64 = AtomicU64::new(1);

/// Identifies one pool in the per-thread scope table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeKey(u64);

impl ScopeKey {
    pub fn new() -> Self {
        Self(NEXT_SCOPE_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ScopeKey {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard over the calling thread's session for one pool.
///
/// Derefs to the session. Not `Send`: the guard and the session it pins
/// belong to the thread that opened it.
pub struct ConnectionScope {
    key: ScopeKey,
    session: Rc<PooledSession>,
    _not_send: PhantomData<*const ()>,
}

impl ConnectionScope {
    /// Enters a scope, acquiring a session only if this thread has no open
    /// scope on `pool` yet.
    ///
    /// # Errors
    /// Propagates [`TaosPool::acquire`] failures. Nothing is recorded for the
    /// thread when acquisition fails.
    pub fn enter(key: ScopeKey, pool: &TaosPool) -> Result<Self> {
        let reused = SCOPES.with(|scopes| {
            scopes.borrow_mut().get_mut(&key.0).map(|slot| {
                slot.depth += 1;
                Rc::clone(&slot.session)
            })
        });
        if let Some(session) = reused {
            return Ok(Self::new(key, session));
        }

        // Acquire outside the borrow: this may block on other threads
        let session = Rc::new(pool.acquire()?);
        SCOPES.with(|scopes| {
            scopes.borrow_mut().insert(
                key.0,
                Slot {
                    session: Rc::clone(&session),
                    depth: 1,
                },
            );
        });
        tracing::trace!(scope = key.0, "Session bound to thread");
        Ok(Self::new(key, session))
    }

    fn new(key: ScopeKey, session: Rc<PooledSession>) -> Self {
        Self {
            key,
            session,
            _not_send: PhantomData,
        }
    }

    /// Nesting depth of the thread's scope on this pool, counting this one.
    pub fn depth(&self) -> usize {
        depth(self.key)
    }

    pub fn session(&self) -> &dyn Session {
        &**self
    }
}

impl Deref for ConnectionScope {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        &***self.session
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        let released = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let Some(slot) = scopes.get_mut(&self.key.0) else {
                return None;
            };
            slot.depth -= 1;
            if slot.depth == 0 {
                scopes.remove(&self.key.0)
            } else {
                None
            }
        });
        // Dropping the slot (outside the borrow) returns the session once
        // this guard's own handle goes too
        if released.is_some() {
            tracing::trace!(scope = self.key.0, "Session released from thread");
        }
        drop(released);
    }
}

/// Current nesting depth of the calling thread's scope for `key`, 0 if none.
pub fn depth(key: ScopeKey) -> usize {
    SCOPES.with(|scopes| scopes.borrow().get(&key.0).map_or(0, |slot| slot.depth))
}
