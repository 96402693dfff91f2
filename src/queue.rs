//! Per-category work queues and the drain-then-sleep consumer loop.
//!
//! Each queue has exactly one producer (the acquisition loop) and one
//! consumer (the category's processor). Queues are unbounded: telemetry
//! is never dropped because a processor is slow.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tokio::time::sleep;

use crate::error::TrackerResult;

/// Processed/failed counters of one consumer loop
#[derive(Debug, Default)]
pub struct QueueStats {
    pub enqueued: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

impl QueueStats {
    pub fn backlog(&self) -> u64 {
        let done = self.processed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        self.enqueued.load(Ordering::Relaxed).saturating_sub(done)
    }
}

/// Producer side of a work queue
pub struct QueueSender<T> {
    tx: Sender<T>,
    stats: Arc<QueueStats>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        QueueSender { tx: self.tx.clone(), stats: self.stats.clone() }
    }
}

impl<T> QueueSender<T> {
    /// Returns false once the consumer side is gone
    pub fn push(&self, item: T) -> bool {
        match self.tx.send(item) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

/// Consumer side of a work queue
pub struct QueueReceiver<T> {
    pub name: &'static str,
    rx: Receiver<T>,
    stats: Arc<QueueStats>,
}

impl<T> QueueReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

pub fn work_queue<T>(name: &'static str) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = unbounded();
    let stats = Arc::new(QueueStats::default());
    (
        QueueSender { tx, stats: stats.clone() },
        QueueReceiver { name, rx, stats },
    )
}

/// Drain the queue, then sleep `idle` when it is empty, until `closing`
/// is set.
///
/// Every item is handled on its own task and awaited before the next one,
/// so ordering is kept while an error or panic in one item only costs
/// that item.
pub async fn run_consumer<T, F, Fut>(
    queue: QueueReceiver<T>,
    closing: Arc<AtomicBool>,
    idle: Duration,
    handle: F,
) where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = TrackerResult<()>> + Send + 'static,
{
    log::debug!("[{}] consumer loop started", queue.name);

    while !closing.load(Ordering::Relaxed) {
        let mut drained = 0u64;
        while let Some(item) = queue.try_recv() {
            drained += 1;
            match tokio::spawn(handle(item)).await {
                Ok(Ok(())) => {
                    queue.stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    queue.stats.failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[{}] failed to process sample: {}", queue.name, e);
                }
                Err(e) => {
                    queue.stats.failed.fetch_add(1, Ordering::Relaxed);
                    if e.is_panic() {
                        log::error!("[{}] processor panicked, sample skipped", queue.name);
                    } else {
                        log::warn!("[{}] processing task cancelled: {}", queue.name, e);
                    }
                }
            }
            if closing.load(Ordering::Relaxed) {
                break;
            }
        }

        if drained == 0 {
            sleep(idle).await;
        }
    }

    log::debug!(
        "[{}] consumer loop stopped ({} processed, {} failed)",
        queue.name,
        queue.stats.processed.load(Ordering::Relaxed),
        queue.stats.failed.load(Ordering::Relaxed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_bad_item_does_not_stop_loop() {
        let (tx, rx) = work_queue::<i32>("test");
        let closing = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for item in [1, -1, 2, 0, 3] {
            assert!(tx.push(item));
        }

        let stats = rx.stats();
        let seen_loop = seen.clone();
        let closing_loop = closing.clone();
        let handle = tokio::spawn(run_consumer(
            rx,
            closing.clone(),
            Duration::from_millis(5),
            move |item: i32| {
                let seen = seen_loop.clone();
                let closing = closing_loop.clone();
                async move {
                    if item == 0 {
                        panic!("boom");
                    }
                    if item < 0 {
                        return Err(TrackerError::Mapping("negative".to_string()));
                    }
                    let mut seen = seen.lock().unwrap();
                    seen.push(item);
                    if item == 3 {
                        closing.store(true, Ordering::Relaxed);
                    }
                    Ok(())
                }
            },
        ));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(stats.processed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.backlog(), 0);
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (tx, rx) = work_queue::<u8>("dropped");
        drop(rx);
        assert!(!tx.push(1));
    }
}
