//! Checked-out session handle that returns itself to the pool.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crm_sdk::{RemoteSession, SessionId};
use tracing::debug;

use crate::error::Result;
use crate::pool::PoolShared;

const PRESENT: &str = "PooledSession holds its session until consumed";

/// A session checked out of a [`SessionPool`](crate::SessionPool).
///
/// Derefs to [`RemoteSession`]. When the handle goes out of scope, on a normal return,
/// an early `?` return or a panic, the session goes back to the pool's idle set.
pub struct PooledSession {
    session: Option<RemoteSession>,
    pool: Arc<PoolShared>,
}

impl PooledSession {
    pub(crate) fn new(session: RemoteSession, pool: Arc<PoolShared>) -> Self {
        Self {
            session: Some(session),
            pool,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session.as_ref().expect(PRESENT).id()
    }

    /// Take the session out of the handle without returning it to the pool.
    ///
    /// The session still counts against capacity; hand it back later with
    /// [`SessionPool::release`](crate::SessionPool::release).
    pub fn detach(mut self) -> RemoteSession {
        self.session.take().expect(PRESENT)
    }

    /// Log the session out and free its slot instead of returning it.
    pub async fn discard(mut self) -> Result<()> {
        let session = self.session.take().expect(PRESENT);
        debug!("Discarding session {}", session.id());
        self.pool.free_slot();
        session.logout().await?;
        Ok(())
    }
}

impl Deref for PooledSession {
    type Target = RemoteSession;

    fn deref(&self) -> &RemoteSession {
        self.session.as_ref().expect(PRESENT)
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut RemoteSession {
        self.session.as_mut().expect(PRESENT)
    }
}

impl fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
