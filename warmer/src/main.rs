use catalog::service::CatalogService;
use common::cache::ResultCache;
use common::config::CONFIG;
use common::logging::setup_logging;
use common::persistence::PG_POOL;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warmer::runner::TokioTaskRunner;
use warmer::sweep::SweepExpiredTask;
use warmer::totals::TotalsRefreshTask;
use warmer::warm::WarmLoop;
use warmer::{minutes, ScheduledTask, Scheduler};

#[tokio::main]
async fn main() {
    setup_logging("warmer");

    let service = Arc::new(CatalogService::new(
        PG_POOL.clone(),
        ResultCache::from_config(),
    ));

    Scheduler::run_task(ScheduledTask::Interval {
        task: Box::new(TotalsRefreshTask::new(service.clone())),
        interval: tokio::time::Duration::from_secs(CONFIG.warmer.totals_period_secs),
    });
    Scheduler::run_task(ScheduledTask::IntervalDeferred {
        task: Box::new(SweepExpiredTask::new(service.clone())),
        interval: minutes(15),
    });

    let cancellation_token = CancellationToken::new();
    let runner = Arc::new(TokioTaskRunner::new(service, CONFIG.warmer.concurrency));
    let warm_done = tokio::spawn(WarmLoop::new(runner).run(cancellation_token.clone()));

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl c event");
    cancellation_token.cancel();
    info!("exiting");
    let _ = warm_done.await;
    info!("exited");
}
