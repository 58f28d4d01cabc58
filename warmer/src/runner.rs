use async_trait::async_trait;
use catalog::error::CatalogError;
use catalog::service::{CatalogService, QuerySignature};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// What a warm task actually does once it gets a permit.
#[async_trait]
pub trait WarmExecutor: Send + Sync + 'static {
    async fn warm(&self, signature: &QuerySignature) -> Result<(), CatalogError>;
}

#[async_trait]
impl WarmExecutor for CatalogService {
    async fn warm(&self, signature: &QuerySignature) -> Result<(), CatalogError> {
        self.warm_page(signature).await
    }
}

/// Contract the warm loop expects from its task runner: fire-and-poll with
/// opaque ids. An abandoned task keeps running to completion; it is simply no
/// longer waited for this cycle.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn submit(&self, signature: QuerySignature) -> TaskId;
    async fn status(&self, id: TaskId) -> Option<TaskStatus>;

    /// Drops bookkeeping for finished tasks; called between cycles.
    async fn prune(&self) {}
}

/// In-process runner. The semaphore makes the concurrency bound structural:
/// submission never blocks, execution waits for one of the fixed permits.
pub struct TokioTaskRunner<E> {
    executor: Arc<E>,
    permits: Arc<Semaphore>,
    statuses: Arc<Mutex<HashMap<TaskId, TaskStatus>>>,
}

impl<E: WarmExecutor> TokioTaskRunner<E> {
    pub fn new(executor: Arc<E>, concurrency: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(concurrency)),
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl<E: WarmExecutor> TaskRunner for TokioTaskRunner<E> {
    async fn submit(&self, signature: QuerySignature) -> TaskId {
        let id = Uuid::new_v4();
        self.statuses.lock().await.insert(id, TaskStatus::Pending);

        let executor = self.executor.clone();
        let permits = self.permits.clone();
        let statuses = self.statuses.clone();
        tokio::spawn(async move {
            // Closed only on runner drop, at which point the result is moot.
            let Ok(_permit) = permits.acquire().await else {
                return;
            };
            let status = match executor.warm(&signature).await {
                Ok(()) => TaskStatus::Succeeded,
                Err(e) => {
                    warn!("warm task `{id}` failed: `{e}`");
                    TaskStatus::Failed
                }
            };
            statuses.lock().await.insert(id, status);
        });
        id
    }

    async fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.statuses.lock().await.get(&id).copied()
    }

    async fn prune(&self) {
        self.statuses.lock().await.retain(|_, s| !s.is_terminal());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::service::CatalogScope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct GaugedExecutor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl WarmExecutor for GaugedExecutor {
        async fn warm(&self, _signature: &QuerySignature) -> Result<(), CatalogError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn signature() -> QuerySignature {
        QuerySignature {
            scope: CatalogScope::Active,
            language: "en".to_string(),
            criteria: Default::default(),
            sort: Default::default(),
            limit: 50,
            offset: 0,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_flight_never_exceeds_the_permit_count() {
        let executor = Arc::new(GaugedExecutor {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let runner = TokioTaskRunner::new(executor.clone(), 8);

        let ids: Vec<_> = futures::future::join_all(
            (0..32).map(|_| runner.submit(signature())),
        )
        .await;

        for id in &ids {
            loop {
                match runner.status(*id).await {
                    Some(status) if status.is_terminal() => break,
                    _ => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }
        }

        assert!(executor.peak.load(Ordering::SeqCst) <= 8);
        assert!(executor.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn prune_forgets_finished_tasks_only() {
        struct Instant;
        #[async_trait]
        impl WarmExecutor for Instant {
            async fn warm(&self, _signature: &QuerySignature) -> Result<(), CatalogError> {
                Ok(())
            }
        }

        let runner = TokioTaskRunner::new(Arc::new(Instant), 2);
        let id = runner.submit(signature()).await;
        loop {
            match runner.status(id).await {
                Some(status) if status.is_terminal() => break,
                _ => tokio::task::yield_now().await,
            }
        }
        runner.prune().await;
        assert_eq!(runner.status(id).await, None);
    }
}
