//! Debounced completion of feature changes.
//!
//! Every add or remove on a running gateway calls [`UpdateManager::schedule`],
//! which pushes a single deadline `window` into the future. The completion
//! callback runs once the deadline passes without another call, so a burst of
//! changes produces one callback.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Called when a burst of changes has settled.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    deadline: Mutex<Option<Instant>>,
    wake: Notify,
}

/// One timer task per manager, reset by every [`schedule`](Self::schedule).
pub struct UpdateManager {
    window: Duration,
    shared: Arc<Shared>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateManager {
    /// Spawn the timer task. Must be called within a tokio runtime.
    pub fn new(window: Duration, callback: UpdateCallback) -> Self {
        let shared = Arc::new(Shared {
            deadline: Mutex::new(None),
            wake: Notify::new(),
        });
        let token = CancellationToken::new();
        let task = tokio::spawn(run(shared.clone(), token.clone(), callback));
        Self {
            window,
            shared,
            token,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start the countdown, or restart it when one is pending.
    pub fn schedule(&self) {
        *self.shared.deadline.lock() = Some(Instant::now() + self.window);
        self.shared.wake.notify_one();
    }

    /// Whether a countdown is pending.
    pub fn is_pending(&self) -> bool {
        self.shared.deadline.lock().is_some()
    }

    /// Stop the timer task and wait for it. A pending countdown is dropped.
    pub async fn close(&self) {
        self.token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            tracing::error!(error = %err, "update timer task failed");
        }
    }
}

impl Drop for UpdateManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("window", &self.window)
            .field("pending", &self.is_pending())
            .finish()
    }
}

async fn run(shared: Arc<Shared>, token: CancellationToken, callback: UpdateCallback) {
    loop {
        let deadline = *shared.deadline.lock();
        match deadline {
            None => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.wake.notified() => {}
                }
            }
            Some(deadline) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        let fire = {
                            let mut pending = shared.deadline.lock();
                            // A schedule() racing the sleep moved the deadline.
                            if *pending == Some(deadline) {
                                pending.take();
                                true
                            } else {
                                false
                            }
                        };
                        if fire {
                            tracing::debug!("feature changes settled");
                            callback();
                        }
                    }
                }
            }
        }
    }
    tracing::trace!("update timer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, UpdateCallback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = fired.clone();
        (
            fired,
            Arc::new(move || {
                hook.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    /// Let the timer task observe the latest state.
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once() {
        let (fired, callback) = counter();
        let manager = UpdateManager::new(Duration::from_millis(10_000), callback);

        for _ in 0..5 {
            manager.schedule();
            settle().await;
            tokio::time::advance(Duration::from_millis(4_000)).await;
            settle().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(manager.is_pending());

        tokio::time::advance(Duration::from_millis(6_001)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!manager.is_pending());

        tokio::time::advance(Duration::from_millis(60_000)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (fired, callback) = counter();
        let manager = UpdateManager::new(Duration::from_millis(100), callback);

        manager.schedule();
        settle().await;
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        manager.schedule();
        settle().await;
        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_pending_countdown() {
        let (fired, callback) = counter();
        let manager = UpdateManager::new(Duration::from_millis(100), callback);
        manager.schedule();
        settle().await;
        manager.close().await;
        manager.close().await;

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
