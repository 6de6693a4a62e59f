//! Per-user single-flight guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per user id.
///
/// Every sync invocation holds its user's guard for its whole duration, so two
/// runs for the same user never race on the checkpoint. Runs for different
/// users proceed independently.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map holds an idle entry; guards and waiters keep a clone.
        locks.retain(|id, lock| id == user_id || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Waits for and returns the user's guard.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.entry(user_id).lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_same_user_is_exclusive() {
        let locks = UserLocks::new();
        let guard = locks.lock("u1").await;
        let blocked = tokio::time::timeout(Duration::from_millis(10), locks.lock("u1")).await;
        assert!(blocked.is_err());
        drop(guard);
        let _again = locks.lock("u1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_users_are_independent() {
        let locks = UserLocks::new();
        let _a = locks.lock("u1").await;
        let other = tokio::time::timeout(Duration::from_millis(10), locks.lock("u2")).await;
        assert!(other.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_proceeds_after_release() {
        let locks = UserLocks::new();
        let guard = locks.lock("u1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("u1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = UserLocks::new();
        for user in ["u1", "u2", "u3"] {
            let _guard = locks.lock(user).await;
        }
        assert_eq!(locks.len(), 1);

        let held = locks.lock("u1").await;
        drop(locks.lock("u2").await);
        // u1 is still held, so its entry must survive the prune.
        assert_eq!(locks.len(), 2);
        drop(held);
        drop(locks.lock("u4").await);
        assert_eq!(locks.len(), 1);
    }
}
