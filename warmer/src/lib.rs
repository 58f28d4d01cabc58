pub mod runner;
pub mod sweep;
pub mod targets;
pub mod totals;
pub mod warm;

use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait Task: Send {
    async fn run(&self);

    fn descriptor(&self) -> Option<&'static str> {
        None
    }
}

pub enum ScheduledTask {
    Interval {
        task: Box<dyn Task>,
        interval: tokio::time::Duration,
    },
    IntervalDeferred {
        task: Box<dyn Task>,
        interval: tokio::time::Duration,
    },
}

pub struct Scheduler;

impl Scheduler {
    pub fn run_task(task: ScheduledTask) {
        match task {
            ScheduledTask::Interval { task, interval } => Self::spawn_interval_task(task, interval),
            ScheduledTask::IntervalDeferred { task, interval } => {
                Self::spawn_interval_deferred_task(task, interval)
            }
        }
    }

    fn spawn_interval_task(task: Box<dyn Task>, interval: tokio::time::Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                debug!(
                    "running task with descriptor: `{:?}` and duration: `{:?}`",
                    task.descriptor(),
                    interval,
                );
                task.run().await;
            }
        });
    }

    fn spawn_interval_deferred_task(task: Box<dyn Task>, interval: tokio::time::Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!(
                    "running task with descriptor: `{:?}` and duration: `{:?}`",
                    task.descriptor(),
                    interval,
                );
                task.run().await;
            }
        });
    }
}

pub fn minutes(m: u64) -> tokio::time::Duration {
    tokio::time::Duration::from_secs(m * 60)
}

pub fn hours(h: u64) -> tokio::time::Duration {
    minutes(h * 60)
}

#[cfg(test)]
mod tests {
    use crate::{ScheduledTask, Scheduler, Task};
    use async_trait::async_trait;

    struct NopTask {
        sender: tokio::sync::mpsc::Sender<()>,
    }

    #[async_trait]
    impl Task for NopTask {
        async fn run(&self) {
            let _ = self.sender.send(()).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_tasks_fire_on_schedule() {
        let (tx1, mut rx1) = tokio::sync::mpsc::channel(1);
        let (tx2, mut rx2) = tokio::sync::mpsc::channel(1);

        Scheduler::run_task(ScheduledTask::IntervalDeferred {
            task: Box::new(NopTask { sender: tx1 }),
            interval: tokio::time::Duration::from_secs(3),
        });

        Scheduler::run_task(ScheduledTask::IntervalDeferred {
            task: Box::new(NopTask { sender: tx2 }),
            interval: tokio::time::Duration::from_secs(3),
        });

        tokio::task::yield_now().await;
        tokio::time::advance(tokio::time::Duration::from_secs(2)).await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());

        tokio::time::advance(tokio::time::Duration::from_secs(1)).await;
        assert_eq!(rx1.recv().await, Some(()));
        assert_eq!(rx2.recv().await, Some(()));

        tokio::time::advance(tokio::time::Duration::from_secs(3)).await;
        assert_eq!(rx1.recv().await, Some(()));
        assert_eq!(rx2.recv().await, Some(()));
    }
}
