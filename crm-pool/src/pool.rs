//! Session pool for sharing authenticated CRM sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crm_sdk::{RemoteApiFactory, RemoteSession, SessionId};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::pooled::PooledSession;

/// State shared between the pool and every checked-out session.
pub(crate) struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn RemoteApiFactory>,
    idle: DashMap<SessionId, RemoteSession>,
    /// Sessions alive: idle, checked out, or being logged in.
    total: AtomicUsize,
}

impl PoolShared {
    pub(crate) fn release(&self, session: RemoteSession) {
        debug!("Session {} returned to pool", session.id());
        self.idle.insert(session.id(), session);
    }

    pub(crate) fn free_slot(&self) {
        self.total.fetch_sub(1, Ordering::SeqCst);
    }

    /// Remove and return any idle session.
    fn take_idle(&self) -> Option<RemoteSession> {
        loop {
            let id = self.idle.iter().next().map(|entry| *entry.key())?;
            if let Some((_, session)) = self.idle.remove(&id) {
                return Some(session);
            }
            // Another caller took it between the lookup and the remove.
        }
    }

    fn try_reserve(&self) -> bool {
        let capacity = self.config.capacity;
        self.total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < capacity).then_some(n + 1))
            .is_ok()
    }
}

/// A counted capacity slot not yet backed by a checked-out session.
///
/// Dropping it without [`commit`](Self::commit) gives the slot back, so a failed or
/// cancelled login never leaks capacity.
struct SlotReservation<'a> {
    shared: &'a PoolShared,
    armed: bool,
}

impl<'a> SlotReservation<'a> {
    fn new(shared: &'a PoolShared) -> Self {
        Self { shared, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.free_slot();
        }
    }
}

/// Pool of authenticated sessions.
///
/// Cloning the pool is cheap; clones share the same sessions and capacity.
#[derive(Clone)]
pub struct SessionPool {
    shared: Arc<PoolShared>,
}

impl SessionPool {
    /// Create an empty pool. Sessions are opened lazily by [`acquire`](Self::acquire).
    ///
    /// # Errors
    /// Returns [`PoolError::Config`] if `config` fails validation.
    pub fn new(config: PoolConfig, factory: Arc<dyn RemoteApiFactory>) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating session pool with capacity={} acquire_timeout={:?}",
            config.capacity, config.acquire_timeout
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                idle: DashMap::new(),
                total: AtomicUsize::new(0),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check out a session, waiting for a free slot if the pool is saturated.
    ///
    /// Idle sessions younger than `max_session_age` are handed out as-is; older ones
    /// are logged out and replaced. Without an idle session a new one is opened while
    /// capacity allows. Otherwise the call sleeps `retry_interval` between attempts
    /// until `deadline`, which defaults to now plus `acquire_timeout` from the moment
    /// the pool is first found saturated. Waiters are not served in order.
    ///
    /// # Errors
    /// - [`PoolError::Timeout`] when the deadline passes with no slot free.
    /// - [`PoolError::Sdk`] when logging in a new session fails. The slot is released
    ///   and nothing is retried.
    pub async fn acquire(&self, deadline: Option<Instant>) -> Result<PooledSession> {
        let started = Instant::now();
        let mut deadline = deadline;

        loop {
            if let Some(session) = self.shared.take_idle() {
                if session.age() < self.shared.config.max_session_age {
                    debug!("Reusing idle session {}", session.id());
                    return Ok(self.checkout(session));
                }

                // The stale session's slot carries over to its replacement.
                let reservation = SlotReservation::new(&self.shared);
                info!("Session {} is {:?} old, replacing it", session.id(), session.age());
                let stale_id = session.id();
                if let Err(e) = session.logout().await {
                    warn!("Failed to log out stale session {}: {}", stale_id, e);
                }
                return self.open(reservation).await;
            }

            if self.shared.try_reserve() {
                return self.open(SlotReservation::new(&self.shared)).await;
            }

            let deadline = *deadline
                .get_or_insert_with(|| Instant::now() + self.shared.config.acquire_timeout);
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Session pool exhausted: {} sessions checked out",
                    self.shared.config.capacity
                );
                return Err(PoolError::Timeout(now - started));
            }

            sleep(self.shared.config.retry_interval.min(deadline - now)).await;
        }
    }

    /// Open a new session into a reserved slot.
    async fn open(&self, reservation: SlotReservation<'_>) -> Result<PooledSession> {
        let client = self.shared.factory.create_client();
        match RemoteSession::connect(client, &self.shared.config.credentials).await {
            Ok(session) => {
                reservation.commit();
                debug!("Opened session {}", session.id());
                Ok(self.checkout(session))
            }
            Err(e) => {
                error!("Failed to open session: {}", e);
                Err(e.into())
            }
        }
    }

    fn checkout(&self, session: RemoteSession) -> PooledSession {
        PooledSession::new(session, Arc::clone(&self.shared))
    }

    /// Put a session back into the idle set.
    ///
    /// Only sessions checked out from this pool (and detached from their
    /// [`PooledSession`]) should be released here; they already count against capacity.
    pub fn release(&self, session: RemoteSession) {
        self.shared.release(session);
    }

    /// Log out every idle session. Checked-out sessions are left alone.
    ///
    /// Returns how many sessions logged out cleanly. Logout failures are logged and
    /// skipped.
    pub async fn shutdown(&self) -> usize {
        let ids: Vec<SessionId> = self.shared.idle.iter().map(|entry| *entry.key()).collect();
        info!("Shutting down session pool, {} idle sessions", ids.len());

        let mut logged_out = 0;
        for id in ids {
            let Some((_, session)) = self.shared.idle.remove(&id) else {
                continue;
            };
            self.shared.free_slot();

            match session.logout().await {
                Ok(()) => logged_out += 1,
                Err(e) => warn!("Failed to log out session {} during shutdown: {}", id, e),
            }
        }

        logged_out
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        let total_count = self.shared.total.load(Ordering::SeqCst);
        let idle_count = self.shared.idle.len();

        PoolStats {
            capacity: self.shared.config.capacity,
            total_count,
            idle_count,
            active_count: total_count.saturating_sub(idle_count),
        }
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub total_count: usize,
    pub idle_count: usize,
    pub active_count: usize,
}
