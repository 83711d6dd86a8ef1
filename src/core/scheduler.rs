use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::oneshot;

use crate::core::{
    boxes::{BoxError, BoxLease, SandboxBox},
    domain::{ExecutionResult, Job},
    traits::sandbox::{Sandbox, SandboxError},
};

#[derive(Clone, Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    BoxFailed(#[from] BoxError),
    #[error("Job was dropped before a result was delivered")]
    Dropped,
}

#[derive(Debug)]
struct QueueEntry {
    job: Job,
    result_tx: oneshot::Sender<Result<ExecutionResult, BoxError>>,
}

/// Fixed pool of boxes fed from one FIFO queue shared by every submission.
#[derive(Debug)]
pub struct BoxPool {
    boxes: Vec<Arc<SandboxBox>>,
    queue: Mutex<VecDeque<QueueEntry>>,
}

impl BoxPool {
    /// Provisions `size` boxes and returns the pool ready to take jobs.
    #[tracing::instrument(skip(sandbox))]
    pub async fn start(size: usize, sandbox: Arc<dyn Sandbox>) -> Result<Arc<Self>, SandboxError> {
        let mut boxes = Vec::with_capacity(size);
        for id in 0..size {
            sandbox.provision(id).await?;
            boxes.push(Arc::new(SandboxBox::new(id, sandbox.clone())));
        }

        tracing::info!("Started pool of {} boxes", size);
        Ok(Arc::new(Self {
            boxes,
            queue: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn size(&self) -> usize {
        self.boxes.len()
    }

    /// Queues a job and waits until some box has run it.
    pub async fn submit(self: &Arc<Self>, job: Job) -> Result<ExecutionResult, SchedulerError> {
        let (result_tx, result_rx) = oneshot::channel();
        let pending = {
            let mut queue = self.lock_queue();
            queue.push_back(QueueEntry { job, result_tx });
            queue.len()
        };
        tracing::trace!(pending, "Job queued");

        for index in 0..self.boxes.len() {
            self.dispatch(index);
        }

        result_rx.await.map_err(|_| SchedulerError::Dropped)?.map_err(Into::into)
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        // Entries stay consistent even if a holder panicked.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Leases the box and pops the oldest entry as one step. If the queue
    /// turns out empty the lease is dropped while the lock is still held, so
    /// a concurrent `submit` always sees either the entry taken or the box free.
    fn take_work(&self, index: usize) -> Option<(BoxLease, QueueEntry)> {
        let mut queue = self.lock_queue();
        let lease = self.boxes[index].try_lease()?;
        let entry = queue.pop_front()?;
        Some((lease, entry))
    }

    /// Starts a worker on the box if it is idle and there is work queued.
    /// The worker keeps pulling from the queue until it is empty.
    fn dispatch(self: &Arc<Self>, index: usize) {
        let Some(first) = self.take_work(index) else {
            return;
        };

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut next = Some(first);
            while let Some((lease, entry)) = next {
                // A panicking job must not take the worker down with it, or
                // the entries behind it would wait for the next submit.
                let result = AssertUnwindSafe(lease.run(&entry.job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        tracing::error!(box_id = lease.box_id(), "Job panicked");
                        Err(BoxError::Panicked {
                            box_id: lease.box_id(),
                        })
                    });
                if entry.result_tx.send(result).is_err() {
                    tracing::warn!(box_id = lease.box_id(), "Job result receiver went away");
                }
                drop(lease);
                next = pool.take_work(index);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{domain::Status, traits::sandbox::MockSandbox};
    use crate::stubs::sandbox::{SandboxStub, StubBehaviour};
    use futures::future::join_all;
    use std::path::PathBuf;
    use std::time::Duration;

    fn create_job(name: &str) -> Job {
        Job {
            script: PathBuf::from(name),
            time_limit: Some(2.0),
            memory_limit: None,
            mounts: vec![],
        }
    }

    #[tokio::test]
    async fn test_start_provisions_every_box() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_provision().times(4).returning(|_| Ok(()));

        let pool = BoxPool::start(4, Arc::new(sandbox)).await.unwrap();

        assert_eq!(pool.size(), 4);
        assert_eq!(pool.lock_queue().len(), 0);
    }

    #[tokio::test]
    async fn test_start_fails_when_provisioning_fails() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_provision().returning(|_| {
            Err(SandboxError::Io {
                msg: "permission denied".to_string(),
            })
        });

        let result = BoxPool::start(2, Arc::new(sandbox)).await;
        assert!(matches!(result, Err(SandboxError::Io { .. })));
    }

    #[tokio::test]
    async fn test_submit_returns_result() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(10)));
        let pool = BoxPool::start(1, stub.clone()).await.unwrap();

        let result = pool.submit(create_job("hello")).await.unwrap();

        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.stdout, "hello");
        assert_eq!(stub.executed(), vec!["hello".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_more_jobs_than_boxes() {
        for size in 1..=3 {
            let stub = Arc::new(SandboxStub::new(Duration::from_millis(20)));
            let pool = BoxPool::start(size, stub.clone()).await.unwrap();

            let jobs = (0..10).map(|i| {
                let pool = pool.clone();
                async move { pool.submit(create_job(&format!("job-{i}"))).await }
            });
            let results = join_all(jobs).await;

            assert!(results.iter().all(|r| r.is_ok()));
            assert_eq!(stub.executed().len(), 10);
            assert!(stub.peak_concurrency() <= size);
            assert!(!stub.box_overlap_seen());
        }
    }

    #[tokio::test]
    async fn test_single_box_serves_jobs_in_arrival_order() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(5)));
        let pool = BoxPool::start(1, stub.clone()).await.unwrap();

        let names: Vec<String> = (0..6).map(|i| format!("job-{i}")).collect();
        let jobs = names.iter().map(|name| pool.submit(create_job(name)));
        join_all(jobs).await;

        assert_eq!(stub.executed(), names);
    }

    #[tokio::test]
    async fn test_jobs_start_in_arrival_order_across_pool() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(5)));
        let pool = BoxPool::start(3, stub.clone()).await.unwrap();

        let names: Vec<String> = (0..9).map(|i| format!("job-{i}")).collect();
        let jobs = names.iter().map(|name| pool.submit(create_job(name)));
        join_all(jobs).await;

        assert_eq!(stub.started(), names);
    }

    #[tokio::test]
    async fn test_box_failure_is_delivered_and_pool_keeps_working() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(1)));
        stub.fail_next_inits(1);
        let pool = BoxPool::start(1, stub.clone()).await.unwrap();

        let failed = pool.submit(create_job("broken")).await;
        let ok = pool.submit(create_job("fine")).await;

        assert!(matches!(
            failed,
            Err(SchedulerError::BoxFailed(BoxError::InitFailed { .. }))
        ));
        assert_eq!(ok.unwrap().stdout, "fine");
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_strand_queue() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(1)));
        stub.set_behaviour("boom", StubBehaviour::Panics);
        let pool = BoxPool::start(1, stub.clone()).await.unwrap();

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(
                pool.submit(create_job("boom")),
                pool.submit(create_job("after")),
            )
        })
        .await
        .expect("queued job was stranded");

        assert!(matches!(
            first,
            Err(SchedulerError::BoxFailed(BoxError::Panicked { box_id: 0 }))
        ));
        assert_eq!(second.unwrap().stdout, "after");
        assert!(!pool.boxes[0].is_busy());
    }

    #[tokio::test]
    async fn test_queue_drains_after_burst() {
        let stub = Arc::new(SandboxStub::new(Duration::from_millis(2)));
        let pool = BoxPool::start(2, stub.clone()).await.unwrap();

        let jobs = (0..20).map(|i| pool.submit(create_job(&format!("job-{i}"))));
        let results = join_all(jobs).await;

        assert_eq!(results.len(), 20);
        assert_eq!(pool.lock_queue().len(), 0);
    }
}
