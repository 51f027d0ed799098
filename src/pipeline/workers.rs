//! Per-aggregate worker router
//!
//! Serialization without locks: each aggregate (actuator, officer, pool)
//! is assigned to exactly one worker by hashing its id, so operations on
//! one aggregate execute in arrival order. Queues are bounded; a full
//! lane surfaces `would_block` to the caller instead of dropping.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A unit of work keyed by its aggregate id.
pub struct AggregateJob<T> {
    pub aggregate_id: String,
    pub payload: T,
}

/// Error surfaced when a worker lane is saturated.
#[derive(Debug, thiserror::Error)]
#[error("worker lane for aggregate {aggregate_id} would block")]
pub struct WouldBlock {
    pub aggregate_id: String,
}

/// Router over a fixed pool of worker lanes.
pub struct AggregateRouter<T> {
    lanes: Vec<mpsc::Sender<AggregateJob<T>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> AggregateRouter<T> {
    /// Spawn `workers` lanes, each draining jobs through `handler`.
    ///
    /// The handler receives jobs for the lane's aggregates strictly in
    /// arrival order. The returned router enqueues; `shutdown` cancels.
    pub fn spawn<F, Fut>(
        workers: usize,
        lane_depth: usize,
        cancel: CancellationToken,
        handler: F,
    ) -> Self
    where
        F: Fn(AggregateJob<T>) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let mut lanes = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker_idx in 0..workers {
            let (tx, mut rx) = mpsc::channel::<AggregateJob<T>>(lane_depth);
            let handler = handler.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!(worker_idx, "aggregate worker shutting down");
                            break;
                        }
                        job = rx.recv() => {
                            let Some(job) = job else { break };
                            handler(job).await;
                        }
                    }
                }
            });
            lanes.push(tx);
            handles.push(handle);
        }
        info!(workers, lane_depth, "Aggregate worker pool started");
        Self { lanes, handles }
    }

    fn lane_for(&self, aggregate_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        aggregate_id.hash(&mut hasher);
        (hasher.finish() as usize) % self.lanes.len()
    }

    /// Enqueue a job on its aggregate's lane.
    ///
    /// Returns `WouldBlock` when the lane is full; callers backpressure.
    pub fn submit(&self, job: AggregateJob<T>) -> Result<(), WouldBlock> {
        let lane = self.lane_for(&job.aggregate_id);
        let aggregate_id = job.aggregate_id.clone();
        self.lanes[lane]
            .try_send(job)
            .map_err(|_| WouldBlock { aggregate_id })
    }

    /// Await worker completion after cancellation.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn same_aggregate_executes_in_order() {
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let seen_clone = seen.clone();
        let router = AggregateRouter::spawn(4, 64, cancel.clone(), move |job: AggregateJob<u32>| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().await.push(job.payload);
            }
        });

        for i in 0..20 {
            router
                .submit(AggregateJob {
                    aggregate_id: "d1".into(),
                    payload: i,
                })
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
        router.join().await;

        let seen = seen.lock().await;
        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test]
    async fn full_lane_returns_would_block() {
        let cancel = CancellationToken::new();
        // Worker sleeps forever so the lane fills up.
        let router = AggregateRouter::spawn(1, 2, cancel.clone(), |_job: AggregateJob<u32>| async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });

        let mut blocked = false;
        for i in 0..10 {
            if router
                .submit(AggregateJob {
                    aggregate_id: "d1".into(),
                    payload: i,
                })
                .is_err()
            {
                blocked = true;
                break;
            }
        }
        assert!(blocked, "lane should saturate");
        cancel.cancel();
    }
}
