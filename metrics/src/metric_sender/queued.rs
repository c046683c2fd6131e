use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use web_time::Duration;

use crate::metrics::{Metric, MetricEvent, RawMetric};

use super::MetricEventTx;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("metric queue worker has stopped")]
    Closed,
    #[error("failed to encode metric: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Doubled after every failed attempt
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Default, Debug)]
struct QueueStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Moves sending off the caller's path: events are queued and a background
/// task delivers them to the wrapped sender, retrying with backoff.
///
/// Pushing only fails when the worker is gone. Events that exhaust their
/// retries are logged and counted in [`QueuedMetricTx::failed`].
#[derive(Clone)]
pub struct QueuedMetricTx {
    queue: mpsc::UnboundedSender<MetricEvent<RawMetric>>,
    stats: Arc<QueueStats>,
}

impl QueuedMetricTx {
    /// Starts the delivery task on the current tokio runtime.
    /// The task ends once every clone of the returned sender is dropped.
    pub fn spawn<Tx>(tx: Tx, policy: RetryPolicy) -> (Self, JoinHandle<()>)
    where
        Tx: MetricEventTx + Sync + 'static,
    {
        let (queue, mut rx) = mpsc::unbounded_channel::<MetricEvent<RawMetric>>();
        let stats = Arc::new(QueueStats::default());

        let worker_stats = stats.clone();
        let handle = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                deliver(&tx, ev, policy, &worker_stats).await;
            }
        });

        (Self { queue, stats }, handle)
    }

    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::SeqCst)
    }
}

async fn deliver<Tx: MetricEventTx + Sync>(
    tx: &Tx,
    ev: MetricEvent<RawMetric>,
    policy: RetryPolicy,
    stats: &QueueStats,
) {
    let mut backoff = policy.base_backoff;
    for attempt in 0..=policy.max_retries {
        if let Err(e) = tx.push(ev.clone()).await {
            log::warn!(
                "failed to deliver metric {} (attempt {}): {e}",
                ev.tag,
                attempt + 1
            );
        } else {
            stats.delivered.fetch_add(1, Ordering::SeqCst);
            return;
        }

        if attempt < policy.max_retries {
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }
    stats.failed.fetch_add(1, Ordering::SeqCst);
    log::warn!("dropping metric {} after {} retries", ev.tag, policy.max_retries);
}

impl MetricEventTx for QueuedMetricTx {
    type Error = QueueError;

    async fn push<M: Metric + Send + 'static>(
        &self,
        ev: MetricEvent<M>,
    ) -> Result<(), Self::Error> {
        let ev = ev.erase()?;
        self.queue.send(ev).map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::AtomicU32, Mutex};

    use crate::metrics::{EventSource, ViewRejected};

    use super::*;

    #[derive(Debug, Error)]
    #[error("flaky")]
    struct Flaky;

    #[derive(Clone, Default)]
    struct FlakyTx {
        failures_left: Arc<AtomicU32>,
        received: Arc<Mutex<Vec<String>>>,
    }

    impl MetricEventTx for FlakyTx {
        type Error = Flaky;

        async fn push<M: Metric + Send + 'static>(&self, ev: MetricEvent<M>) -> Result<(), Flaky> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Flaky);
            }
            self.received.lock().unwrap().push(ev.tag);
            Ok(())
        }
    }

    fn rejected() -> MetricEvent<ViewRejected> {
        MetricEvent::new(
            EventSource::ViewTracker,
            ViewRejected {
                video_id: "v".into(),
                viewer_id: "p".into(),
                reason: "duplicate".into(),
            },
        )
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_delivered() {
        let inner = FlakyTx::default();
        inner.failures_left.store(2, Ordering::SeqCst);

        let (tx, handle) = QueuedMetricTx::spawn(inner.clone(), fast_policy(3));
        tx.push(rejected()).await.unwrap();
        let stats = tx.stats.clone();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(stats.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(stats.failed.load(Ordering::SeqCst), 0);
        assert_eq!(*inner.received.lock().unwrap(), vec!["view_rejected"]);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = FlakyTx::default();
        inner.failures_left.store(10, Ordering::SeqCst);

        let (tx, handle) = QueuedMetricTx::spawn(inner.clone(), fast_policy(2));
        tx.push(rejected()).await.unwrap();
        let stats = tx.stats.clone();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(stats.failed.load(Ordering::SeqCst), 1);
        assert_eq!(inner.failures_left.load(Ordering::SeqCst), 7);
        assert!(inner.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_fails_once_worker_is_gone() {
        let (tx, handle) = QueuedMetricTx::spawn(FlakyTx::default(), fast_policy(0));
        handle.abort();
        let _ = handle.await;
        assert!(matches!(tx.push(rejected()).await, Err(QueueError::Closed)));
    }
}
