use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Runs the most recently scheduled task once `delay` passes without another
/// `schedule` call. Earlier pending tasks are dropped.
pub(crate) struct DebounceTimer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            task.await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending task, if any. Returns whether one was waiting.
    pub fn cancel(&self) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_run() {
        let timer = DebounceTimer::new(Duration::from_millis(100));
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let runs = runs.clone();
            timer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            time::sleep(Duration::from_millis(20)).await;
        }
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_run() {
        let timer = DebounceTimer::new(Duration::from_millis(50));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        timer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.cancel());
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
