//! Registry of live and finished shell sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use shell_mcp_core::config::DEFAULT_JOB_TTL_MS;
use shell_mcp_core::{Error, Result, SessionId, SessionStatus};
use tracing::debug;

use crate::session::{FinishedSession, Session, SessionSnapshot};

/// Finished session plus its eviction deadline.
#[derive(Debug, Clone)]
struct RetainedSession {
    record: FinishedSession,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct RegistryInner {
    running: HashMap<SessionId, Arc<Session>>,
    finished: HashMap<SessionId, RetainedSession>,
}

/// Central ledger of sessions, split into a running pool and a finished
/// pool.
///
/// A session lives in exactly one pool at a time. The transition from
/// running to finished happens atomically under the registry lock, so
/// concurrent lookups never see a session in both pools or in neither.
/// Finished records are retained for a configurable TTL and pruned lazily
/// on the next registry access after expiry.
#[derive(Debug)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    ttl: Mutex<Duration>,
}

impl SessionRegistry {
    /// Create a registry with the given finished-session retention.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            ttl: Mutex::new(ttl),
        }
    }

    /// Register a freshly spawned session in the running pool.
    pub fn add(&self, session: Arc<Session>) -> Result<()> {
        let id = session.id();
        let mut inner = self.lock_inner();
        if inner.running.contains_key(&id) || inner.finished.contains_key(&id) {
            return Err(Error::DuplicateSession(id));
        }
        debug!(session_id = %id, command = session.command(), "session registered");
        inner.running.insert(id, session);
        Ok(())
    }

    /// Look up a live session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut inner = self.lock_inner();
        Self::prune(&mut inner);
        inner.running.get(&id).cloned()
    }

    /// Look up a finished session record.
    pub fn get_finished(&self, id: SessionId) -> Option<FinishedSession> {
        let mut inner = self.lock_inner();
        Self::prune(&mut inner);
        inner.finished.get(&id).map(|r| r.record.clone())
    }

    /// Record a process exit and move the session to the finished pool.
    ///
    /// Idempotent: the first caller wins and later calls (a kill racing the
    /// natural exit, say) leave the recorded outcome untouched. Returns the
    /// finished record either way when the session is known.
    pub fn mark_exited(
        &self,
        session: &Arc<Session>,
        exit_code: Option<i32>,
        exit_signal: Option<String>,
        status: SessionStatus,
    ) -> Option<FinishedSession> {
        let id = session.id();
        let ttl = *self.lock_ttl();
        let mut inner = self.lock_inner();
        if let Some(retained) = inner.finished.get(&id) {
            return Some(retained.record.clone());
        }
        // First exit record wins; a second caller still completes the pool
        // move in case the first was interrupted
        let _ = session.record_exit(exit_code, exit_signal);
        let record = session.into_finished(status, epoch_ms());
        debug!(
            session_id = %id,
            status = %status,
            exit_code = ?record.exit_code,
            exit_signal = ?record.exit_signal,
            "session finished"
        );
        inner.running.remove(&id);
        inner.finished.insert(
            id,
            RetainedSession {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Some(record)
    }

    /// Snapshots of all live sessions, newest first.
    pub fn list_running(&self) -> Vec<SessionSnapshot> {
        let mut inner = self.lock_inner();
        Self::prune(&mut inner);
        let mut sessions: Vec<SessionSnapshot> =
            inner.running.values().map(|s| s.snapshot()).collect();
        sessions.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        sessions
    }

    /// Records of all finished sessions still within their TTL, newest
    /// first by end time.
    pub fn list_finished(&self) -> Vec<FinishedSession> {
        let mut inner = self.lock_inner();
        Self::prune(&mut inner);
        let mut records: Vec<FinishedSession> =
            inner.finished.values().map(|r| r.record.clone()).collect();
        records.sort_by(|a, b| b.ended_at_ms.cmp(&a.ended_at_ms));
        records
    }

    /// Remove a session from whichever pool holds it.
    ///
    /// Does not kill the process; callers terminate it first when removing
    /// a live session.
    pub fn delete(&self, id: SessionId) -> bool {
        let mut inner = self.lock_inner();
        inner.running.remove(&id).is_some() || inner.finished.remove(&id).is_some()
    }

    /// Replace the finished-session retention window.
    ///
    /// Applies to sessions finishing after the call; records already in the
    /// finished pool keep their original deadline.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.lock_ttl() = ttl;
    }

    /// Current finished-session retention window.
    pub fn ttl(&self) -> Duration {
        *self.lock_ttl()
    }

    /// Number of live sessions.
    pub fn running_count(&self) -> usize {
        self.lock_inner().running.len()
    }

    fn prune(inner: &mut RegistryInner) {
        let now = Instant::now();
        inner.finished.retain(|id, retained| {
            let keep = retained.expires_at > now;
            if !keep {
                debug!(session_id = %id, "finished session expired");
            }
            keep
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_ttl(&self) -> MutexGuard<'_, Duration> {
        match self.ttl.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_JOB_TTL_MS))
    }
}

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutputStream;

    fn make_session() -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::new(),
            "sleep 5".to_string(),
            "/tmp".to_string(),
            epoch_ms(),
            Some(1),
            30_000,
            None,
        ))
    }

    #[test]
    fn test_add_and_get() {
        let registry = SessionRegistry::default();
        let session = make_session();
        let id = session.id();
        registry.add(Arc::clone(&session)).unwrap();
        assert!(registry.get(id).is_some());
        assert!(registry.get_finished(id).is_none());
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let registry = SessionRegistry::default();
        let session = make_session();
        registry.add(Arc::clone(&session)).unwrap();
        let err = registry.add(session).unwrap_err();
        assert!(matches!(err, Error::DuplicateSession(_)));
    }

    #[test]
    fn test_mark_exited_moves_pools() {
        let registry = SessionRegistry::default();
        let session = make_session();
        let id = session.id();
        registry.add(Arc::clone(&session)).unwrap();

        let record = registry
            .mark_exited(&session, Some(0), None, SessionStatus::Completed)
            .unwrap();
        assert_eq!(record.exit_code, Some(0));
        assert!(registry.get(id).is_none());
        assert!(registry.get_finished(id).is_some());
    }

    #[test]
    fn test_mark_exited_first_wins() {
        let registry = SessionRegistry::default();
        let session = make_session();
        registry.add(Arc::clone(&session)).unwrap();

        registry.mark_exited(&session, Some(1), None, SessionStatus::Failed);
        let record = registry
            .mark_exited(
                &session,
                None,
                Some("SIGKILL".to_string()),
                SessionStatus::Completed,
            )
            .unwrap();
        // First exit record is preserved
        assert_eq!(record.exit_code, Some(1));
        assert_eq!(record.status, SessionStatus::Failed);
    }

    #[test]
    fn test_list_running_newest_first() {
        let registry = SessionRegistry::default();
        let older = Arc::new(Session::new(
            SessionId::new(),
            "first".to_string(),
            "/tmp".to_string(),
            100,
            None,
            30_000,
            None,
        ));
        let newer = Arc::new(Session::new(
            SessionId::new(),
            "second".to_string(),
            "/tmp".to_string(),
            200,
            None,
            30_000,
            None,
        ));
        registry.add(older).unwrap();
        registry.add(newer).unwrap();

        let listing = registry.list_running();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].command, "second");
        assert_eq!(listing[1].command, "first");
    }

    #[test]
    fn test_delete_from_either_pool() {
        let registry = SessionRegistry::default();
        let live = make_session();
        let live_id = live.id();
        registry.add(Arc::clone(&live)).unwrap();

        let done = make_session();
        let done_id = done.id();
        registry.add(Arc::clone(&done)).unwrap();
        registry.mark_exited(&done, Some(0), None, SessionStatus::Completed);

        assert!(registry.delete(live_id));
        assert!(registry.delete(done_id));
        assert!(!registry.delete(SessionId::new()));
    }

    #[test]
    fn test_ttl_expiry_prunes_finished() {
        let registry = SessionRegistry::new(Duration::from_millis(0));
        let session = make_session();
        let id = session.id();
        registry.add(Arc::clone(&session)).unwrap();
        registry.mark_exited(&session, Some(0), None, SessionStatus::Completed);

        // Zero TTL: the record expires on the next access
        assert!(registry.get_finished(id).is_none());
        assert!(registry.list_finished().is_empty());
    }

    #[test]
    fn test_set_ttl_applies_to_later_finishes() {
        let registry = SessionRegistry::new(Duration::from_secs(600));
        registry.set_ttl(Duration::from_millis(0));
        assert_eq!(registry.ttl(), Duration::from_millis(0));

        let session = make_session();
        let id = session.id();
        registry.add(Arc::clone(&session)).unwrap();
        registry.mark_exited(&session, Some(0), None, SessionStatus::Completed);
        assert!(registry.get_finished(id).is_none());
    }

    #[test]
    fn test_finished_record_keeps_output() {
        let registry = SessionRegistry::default();
        let session = make_session();
        let id = session.id();
        registry.add(Arc::clone(&session)).unwrap();
        session.append_output(OutputStream::Stdout, "payload\n");
        registry.mark_exited(&session, Some(0), None, SessionStatus::Completed);

        let record = registry.get_finished(id).unwrap();
        assert_eq!(record.aggregated, "payload\n");
        assert_eq!(record.tail, "payload\n");
    }
}
