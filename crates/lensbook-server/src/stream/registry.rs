//! Process-wide bookkeeping of open stream sessions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::info;

use lensbook_proto::UserId;

use super::session::{CloseReason, SessionId, SessionInfo, StreamSession};
use super::StreamError;

/// Default session limit.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Tracks open sessions without owning them.
///
/// Sessions register themselves on open and unregister on close, so an entry
/// never outlives its session's `close`. `active` counts reserved slots and is
/// what the limit is enforced against.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Weak<StreamSession>>,
    active: AtomicUsize,
    max_sessions: usize,
    total_opened: AtomicU64,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            active: AtomicUsize::new(0),
            max_sessions,
            total_opened: AtomicU64::new(0),
        }
    }

    /// Track a newly opened session.
    pub fn register(&self, session: &Arc<StreamSession>) -> Result<(), StreamError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max_sessions).then_some(active + 1)
            })
            .map_err(|_| StreamError::TooManySessions(self.max_sessions))?;
        self.sessions.insert(session.id(), Arc::downgrade(session));
        self.total_opened.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop tracking a session. Unknown ids are ignored.
    pub fn unregister(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<StreamSession>> {
        self.sessions.get(id).and_then(|entry| entry.value().upgrade())
    }

    /// Open sessions belonging to `user`.
    pub fn sessions_for_user(&self, user: &UserId) -> Vec<Arc<StreamSession>> {
        self.live()
            .into_iter()
            .filter(|session| session.user_id() == *user)
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Sessions opened since startup.
    pub fn total_opened(&self) -> u64 {
        self.total_opened.load(Ordering::Relaxed)
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.live().iter().map(|session| session.info()).collect();
        sessions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        sessions
    }

    /// Close every registered session. Returns how many were closed.
    pub fn shutdown_all(&self) -> usize {
        // Collect first; close() unregisters and must not run under a shard lock.
        let sessions = self.live();
        let closed = sessions
            .iter()
            .filter(|session| session.close(CloseReason::Shutdown))
            .count();
        self.sessions.retain(|_, session| {
            let live = session.strong_count() > 0;
            if !live {
                self.active.fetch_sub(1, Ordering::AcqRel);
            }
            live
        });
        info!(closed, "stream sessions shut down");
        closed
    }

    fn live(&self) -> Vec<Arc<StreamSession>> {
        self.sessions
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}
