//! Runs pipelines as tokio tasks on a bounded pool.

use ahash::AHashMap;
use futures::StreamExt;
use mediax_core::{Operator, Retrievable};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free slot
    Queued,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    /// Retrievables that left the pipeline so far
    pub processed: usize,
    /// Processed retrievables that could not be fully persisted
    pub failed: usize,
}

struct Job {
    info: JobInfo,
    abort: AbortHandle,
    handle: Option<JoinHandle<usize>>,
}

/// Executes pipelines with at most `parallelism` running at once.
///
/// Cancelling a job aborts its task, which drops the pipeline stream and with
/// it every open backend cursor and in-flight request.
#[derive(Clone)]
pub struct ExecutionServer {
    permits: Arc<Semaphore>,
    jobs: Arc<Mutex<AHashMap<JobId, Job>>>,
}

impl ExecutionServer {
    pub fn new(parallelism: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            jobs: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    fn update(jobs: &Mutex<AHashMap<JobId, Job>>, id: JobId, f: impl FnOnce(&mut JobInfo)) {
        if let Some(job) = jobs.lock().get_mut(&id) {
            if job.info.status != JobStatus::Cancelled {
                f(&mut job.info);
            }
        }
    }

    /// Starts draining `pipeline` in the background. Must be called within a
    /// tokio runtime.
    pub fn submit(&self, pipeline: Box<dyn Operator>) -> JobId {
        let id = Uuid::new_v4();
        let name = pipeline.name().to_string();
        let permits = Arc::clone(&self.permits);
        let jobs = Arc::clone(&self.jobs);

        // Registered before the task starts so status updates always find it.
        let mut registry = self.jobs.lock();
        let handle = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return 0;
            };
            Self::update(&jobs, id, |info| info.status = JobStatus::Running);
            debug!("Job {} started", id);
            let mut stream = pipeline.into_stream();
            let mut processed = 0;
            let mut failed = 0;
            while let Some(retrievable) = stream.next().await {
                processed += 1;
                if !retrievable.failed_writes().is_empty() {
                    failed += 1;
                }
                Self::update(&jobs, id, |info| {
                    info.processed = processed;
                    info.failed = failed;
                });
            }
            Self::update(&jobs, id, |info| info.status = JobStatus::Completed);
            if failed > 0 {
                warn!("Job {} completed, {} of {} retrievables not fully persisted", id, failed, processed);
            } else {
                info!("Job {} completed, {} retrievables processed", id, processed);
            }
            processed
        });
        registry.insert(
            id,
            Job {
                info: JobInfo {
                    id,
                    name,
                    status: JobStatus::Queued,
                    processed: 0,
                    failed: 0,
                },
                abort: handle.abort_handle(),
                handle: Some(handle),
            },
        );
        id
    }

    pub fn status(&self, id: JobId) -> Option<JobInfo> {
        self.jobs.lock().get(&id).map(|job| job.info.clone())
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs.lock().values().map(|job| job.info.clone()).collect()
    }

    /// Aborts a queued or running job. Returns `false` for unknown or
    /// finished jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&id) {
            Some(job) if matches!(job.info.status, JobStatus::Queued | JobStatus::Running) => {
                job.abort.abort();
                job.info.status = JobStatus::Cancelled;
                info!("Job {} cancelled", id);
                true
            }
            _ => false,
        }
    }

    /// Waits for a job to end and returns its final state. The job is then
    /// forgotten, so later status queries for it return `None`.
    pub async fn wait(&self, id: JobId) -> Option<JobInfo> {
        let handle = self.jobs.lock().get_mut(&id)?.handle.take();
        let Some(handle) = handle else {
            // Another caller is waiting and evicts the job.
            return self.status(id);
        };
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                warn!("Job {} failed: {}", id, e);
                Self::update(&self.jobs, id, |info| info.status = JobStatus::Cancelled);
            }
        }
        let job = self.jobs.lock().remove(&id)?;
        debug!("Job {} evicted", id);
        Some(job.info)
    }

    /// Runs a pipeline within the pool and collects its output.
    pub async fn collect(&self, pipeline: Box<dyn Operator>) -> Vec<Retrievable> {
        let Ok(_permit) = self.permits.acquire().await else {
            return Vec::new();
        };
        pipeline.into_stream().collect().await
    }

    /// Cancels every unfinished job.
    pub fn shutdown(&self) {
        let ids: Vec<JobId> = self.jobs.lock().keys().copied().collect();
        let cancelled = ids.into_iter().filter(|id| self.cancel(*id)).count();
        info!("Execution server shut down, {} jobs cancelled", cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::ListEnumerator;
    use mediax_core::RetrievableStream;
    use std::time::Duration;

    /// Emits `n` retrievables, one per `delay`.
    struct Slow {
        n: usize,
        delay: Duration,
    }

    impl Operator for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn into_stream(self: Box<Self>) -> RetrievableStream {
            Box::pin(async_stream::stream! {
                for _ in 0..self.n {
                    tokio::time::sleep(self.delay).await;
                    yield Retrievable::new(None);
                }
            })
        }
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let server = ExecutionServer::new(2);
        let items = (0..3).map(|_| Retrievable::new(None)).collect();
        let id = server.submit(Box::new(ListEnumerator::new("list", items)));
        let info = server.wait(id).await.unwrap();
        assert_eq!(info.status, JobStatus::Completed);
        assert_eq!(info.processed, 3);
        assert_eq!(info.name, "list");
        assert_eq!(info.failed, 0);
        assert!(server.wait(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_evicts_finished_jobs() {
        let server = ExecutionServer::new(2);
        let ids: Vec<_> = (0..3)
            .map(|_| server.submit(Box::new(ListEnumerator::new("list", vec![Retrievable::new(None)]))))
            .collect();
        assert_eq!(server.jobs().len(), 3);
        for id in &ids {
            assert_eq!(server.wait(*id).await.unwrap().status, JobStatus::Completed);
            assert!(server.status(*id).is_none());
        }
        assert!(server.jobs().is_empty());
        assert!(server.wait(ids[0]).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_writes_are_counted() {
        let mut lost = Retrievable::new(None);
        lost.add_attribute(mediax_core::RetrievableAttribute::WriteFailed(vec!["caption".into()]));
        let items = vec![Retrievable::new(None), lost, Retrievable::new(None)];
        let server = ExecutionServer::new(1);
        let info = server.wait(server.submit(Box::new(ListEnumerator::new("list", items)))).await.unwrap();
        assert_eq!(info.status, JobStatus::Completed);
        assert_eq!(info.processed, 3);
        assert_eq!(info.failed, 1);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let server = ExecutionServer::new(1);
        let id = server.submit(Box::new(Slow {
            n: 1000,
            delay: Duration::from_millis(10),
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.cancel(id));
        assert!(!server.cancel(id));
        let info = server.wait(id).await.unwrap();
        assert_eq!(info.status, JobStatus::Cancelled);
        assert!(info.processed < 1000);
    }

    #[tokio::test]
    async fn test_parallelism_bounds_running_jobs() {
        let server = ExecutionServer::new(1);
        let slow = || {
            Box::new(Slow {
                n: 100,
                delay: Duration::from_millis(10),
            })
        };
        let first = server.submit(slow());
        let second = server.submit(slow());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.status(first).unwrap().status, JobStatus::Running);
        assert_eq!(server.status(second).unwrap().status, JobStatus::Queued);
        server.shutdown();
        assert_eq!(server.status(second).unwrap().status, JobStatus::Cancelled);
        assert_eq!(server.jobs().len(), 2);
    }

    #[tokio::test]
    async fn test_collect() {
        let server = ExecutionServer::new(1);
        let items = (0..4).map(|_| Retrievable::new(None)).collect();
        let out = server.collect(Box::new(ListEnumerator::new("list", items))).await;
        assert_eq!(out.len(), 4);
    }
}
