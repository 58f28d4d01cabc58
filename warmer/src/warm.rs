use crate::runner::{TaskId, TaskRunner};
use crate::targets;
use common::config::CONFIG;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between cycles: the cache entries should be refreshed shortly before
/// they expire, never sooner than a short floor so a slow cycle cannot spin.
pub fn cycle_sleep(cache_ttl: Duration, elapsed: Duration) -> Duration {
    let margin = Duration::from_secs(10);
    let floor = Duration::from_secs(10);
    cache_ttl.saturating_sub(elapsed).saturating_sub(margin).max(floor)
}

pub struct WarmLoop<R> {
    runner: Arc<R>,
    languages: Vec<String>,
    sources: Vec<String>,
    cache_ttl: Duration,
    submit_batch: usize,
    submit_pause: Duration,
    poll_attempts: usize,
}

impl<R: TaskRunner> WarmLoop<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            languages: CONFIG.catalog.languages.clone(),
            sources: CONFIG.catalog.sources.clone(),
            cache_ttl: Duration::from_secs(CONFIG.cache.ttl_secs),
            submit_batch: CONFIG.warmer.submit_batch,
            submit_pause: Duration::from_millis(CONFIG.warmer.submit_pause_ms),
            poll_attempts: CONFIG.warmer.poll_attempts,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let started = Instant::now();
            let submitted = self.run_cycle(&cancel).await;
            self.runner.prune().await;

            if cancel.is_cancelled() {
                info!("warm loop cancelled");
                break;
            }

            let pause = cycle_sleep(self.cache_ttl, started.elapsed());
            info!(submitted, "warm cycle done, next in `{pause:?}`");
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("warm loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One full pass over the warm-target list: submit in batches, wait for
    /// each batch within the polling budget, abandon stragglers until the next
    /// cycle. Returns how many targets were submitted.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> usize {
        let targets = targets::enumerate(&self.languages, &self.sources);
        debug!(total = targets.len(), "built warm-target list");

        let mut submitted = 0;
        let mut batches = targets.chunks(self.submit_batch.max(1)).peekable();
        while let Some(batch) = batches.next() {
            if cancel.is_cancelled() {
                break;
            }

            let mut ids: Vec<TaskId> = Vec::with_capacity(batch.len());
            for target in batch {
                ids.push(self.runner.submit(target.clone()).await);
            }
            submitted += ids.len();

            for _ in 0..self.poll_attempts {
                let mut pending = Vec::new();
                for id in ids {
                    match self.runner.status(id).await {
                        Some(status) if status.is_terminal() => {}
                        _ => pending.push(id),
                    }
                }
                ids = pending;
                if ids.is_empty() || cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            if !ids.is_empty() {
                warn!(
                    abandoned = ids.len(),
                    "batch did not finish within the polling budget"
                );
            }

            // the pause spaces batches out; after the last one the cycle
            // sleep takes over
            if batches.peek().is_some() {
                tokio::time::sleep(self.submit_pause).await;
            }
        }
        submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TaskStatus;
    use async_trait::async_trait;
    use catalog::service::QuerySignature;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn cycle_sleep_refreshes_just_before_expiry() {
        let ttl = Duration::from_secs(300);
        assert_eq!(
            cycle_sleep(ttl, Duration::from_secs(40)),
            Duration::from_secs(250)
        );
    }

    #[test]
    fn cycle_sleep_never_drops_below_the_floor() {
        let ttl = Duration::from_secs(300);
        assert_eq!(
            cycle_sleep(ttl, Duration::from_secs(295)),
            Duration::from_secs(10)
        );
        assert_eq!(
            cycle_sleep(ttl, Duration::from_secs(10_000)),
            Duration::from_secs(10)
        );
    }

    struct RecordingRunner {
        submissions: Mutex<Vec<QuerySignature>>,
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn submit(&self, signature: QuerySignature) -> TaskId {
            self.submissions.lock().unwrap().push(signature);
            Uuid::new_v4()
        }

        async fn status(&self, _id: TaskId) -> Option<TaskStatus> {
            Some(TaskStatus::Succeeded)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_submits_every_target_once() {
        let runner = Arc::new(RecordingRunner {
            submissions: Mutex::new(Vec::new()),
        });
        let warm = WarmLoop {
            runner: runner.clone(),
            languages: vec!["en".to_string()],
            sources: vec!["copart".to_string()],
            cache_ttl: Duration::from_secs(300),
            submit_batch: 20,
            submit_pause: Duration::from_millis(100),
            poll_attempts: 30,
        };

        let submitted = warm.run_cycle(&CancellationToken::new()).await;
        let expected = targets::enumerate(
            &["en".to_string()],
            &["copart".to_string()],
        )
        .len();
        assert_eq!(submitted, expected);
        assert_eq!(runner.submissions.lock().unwrap().len(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_runs_between_batches_but_not_after_the_last() {
        let runner = Arc::new(RecordingRunner {
            submissions: Mutex::new(Vec::new()),
        });
        let warm = WarmLoop {
            runner: runner.clone(),
            languages: vec!["en".to_string()],
            sources: vec!["copart".to_string()],
            cache_ttl: Duration::from_secs(300),
            submit_batch: 20,
            submit_pause: Duration::from_millis(100),
            poll_attempts: 30,
        };

        // every task reports terminal on the first status check, so the only
        // time that passes is the inter-batch pause
        let started = Instant::now();
        warm.run_cycle(&CancellationToken::new()).await;
        let batches = targets::enumerate(&["en".to_string()], &["copart".to_string()])
            .len()
            .div_ceil(20);
        assert_eq!(
            started.elapsed(),
            Duration::from_millis(100) * (batches as u32 - 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_mid_cycle() {
        let runner = Arc::new(RecordingRunner {
            submissions: Mutex::new(Vec::new()),
        });
        let warm = WarmLoop {
            runner: runner.clone(),
            languages: vec!["en".to_string()],
            sources: vec![],
            cache_ttl: Duration::from_secs(300),
            submit_batch: 20,
            submit_pause: Duration::from_millis(100),
            poll_attempts: 30,
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(warm.run_cycle(&cancel).await, 0);
    }
}
