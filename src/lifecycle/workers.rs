//! Worker-count barrier.
//!
//! Every accept loop and connection worker is spawned through a
//! [`WorkerGroup`]; shutdown waits on it until the count drops to zero.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Tracks running worker tasks.
///
/// Uses a watch channel so waiters see the count reach zero without polling.
#[derive(Debug, Clone)]
pub struct WorkerGroup {
    count: Arc<watch::Sender<usize>>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record a new worker. Returns a guard that decrements on drop.
    pub fn track(&self) -> WorkerGuard {
        self.count.send_modify(|n| *n += 1);
        WorkerGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Spawn `fut` as a tracked worker. The count is raised before this
    /// returns and lowered when the task ends, panics included.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        })
    }

    /// Get current worker count.
    pub fn active(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until every tracked worker has exited.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a worker's lifetime.
/// Decrements the worker count when dropped.
#[derive(Debug)]
pub struct WorkerGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn worker_group_counts() {
        let group = WorkerGroup::new();
        assert_eq!(group.active(), 0);

        let guard1 = group.track();
        assert_eq!(group.active(), 1);

        let guard2 = group.track();
        assert_eq!(group.active(), 2);

        drop(guard1);
        assert_eq!(group.active(), 1);

        drop(guard2);
        assert_eq!(group.active(), 0);
    }

    #[tokio::test]
    async fn wait_returns_after_last_worker() {
        let group = WorkerGroup::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        group.spawn(async move {
            let _ = release_rx.await;
        });
        assert_eq!(group.active(), 1);

        let waiting = {
            let group = group.clone();
            tokio::spawn(async move { group.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.active(), 0);
    }

    #[tokio::test]
    async fn panicking_worker_is_released() {
        let group = WorkerGroup::new();
        let handle = group.spawn(async { panic!("worker failed") });
        assert!(handle.await.is_err());
        assert_eq!(group.active(), 0);
    }
}
