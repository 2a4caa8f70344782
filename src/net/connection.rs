//! Session identity, state and live-session accounting.
//!
//! ```text
//! Reading ──▶ Intercepted ──▶ Reading ...   (keep-alive)
//!    │
//!    └──▶ Tunneling ──▶ Reading ...          (next request leaves the origin)
//!              └──────▶ Closed               (EOF, or an opaque tunnel)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-unique session number, shown as `conn-N` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What a client session is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for (or parsing) a request head.
    Reading,
    /// Serving requests from handlers.
    Intercepted,
    /// Forwarding to an origin or relaying a tunnel.
    Tunneling,
    Closed,
}

/// Counts live sessions so shutdown knows when it may return.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. It stays counted until the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(live);
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::next(),
            state: SessionState::Reading,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Poll until no session is live or `grace` runs out.
    ///
    /// Returns false if sessions were still live at the deadline.
    pub async fn wait_for_drain(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.active_count() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// One live session.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<AtomicU64>,
    id: ConnectionId,
    state: SessionState,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "Session state change");
            self.state = next;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.transition(SessionState::Closed);
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(live);
    }
}
