//! Per-session single-writer guard.
//!
//! The durable session state is a single-writer resource: two interleaved
//! load → run_turn → save cycles for the same identifier would silently drop
//! one turn's updates. The front-end holds the session's lock across the
//! whole cycle; different sessions proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of per-session-id async locks. Locks are created on first use.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the turn lock for a session. The guard is held for the
    /// duration of the turn and releases on drop; a second caller for the
    /// same id waits here.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of tracked sessions (monitoring).
    pub async fn session_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn sequential_acquire_release() {
        let locks = SessionLocks::new();
        let g1 = locks.acquire("s1").await;
        drop(g1);
        let g2 = locks.acquire("s1").await;
        drop(g2);
    }

    #[tokio::test]
    async fn different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _g1 = locks.acquire("s1").await;
        let _g2 = locks.acquire("s2").await;
        assert_eq!(locks.session_count().await, 2);
    }

    #[tokio::test]
    async fn same_session_waits_for_release() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s1").await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("s1").await;
            42
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 42);
    }
}
