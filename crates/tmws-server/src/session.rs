use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};
use uuid::Uuid;

use tmws_core::{Result, SessionId, TmwsError, MAX_SESSIONS};
use tmws_registry::AgentContext;

/// Sessions with no traffic for this long are dropped.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Per-connection runtime state. Never persisted.
pub struct Session {
    pub id: SessionId,
    pub context: AgentContext,
    pub connected_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl Session {
    pub fn new(initial_agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context: AgentContext::new(initial_agent_id),
            connected_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Tracks all live sessions. The map itself is sharded (dashmap); each
/// session is additionally guarded so its tool requests process one at a
/// time, in arrival order.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<DashMap<SessionId, Arc<TokioMutex<Session>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session, enforcing the concurrent-session cap.
    pub fn open(&self, initial_agent_id: &str) -> Result<Arc<TokioMutex<Session>>> {
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(TmwsError::RateLimited {
                retry_after_secs: 30,
            });
        }
        let session = Session::new(initial_agent_id);
        let id = session.id;
        let handle = Arc::new(TokioMutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        debug!(session = %id, agent = initial_agent_id, "session opened");
        Ok(handle)
    }

    pub fn close(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session = %id, "session closed");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle past the timeout. Runs from a background task;
    /// transports also time out their own reads.
    pub async fn sweep_idle(&self) {
        let mut stale = Vec::new();
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock() {
                if session.last_activity.elapsed() > IDLE_TIMEOUT {
                    stale.push(*entry.key());
                }
            }
        }
        for id in stale {
            info!(session = %id, "dropping idle session");
            self.sessions.remove(&id);
        }
    }
}
