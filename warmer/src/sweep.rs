use crate::Task;
use async_trait::async_trait;
use catalog::service::CatalogService;
use std::sync::Arc;
use tracing::{info, warn};

const SWEEP_BATCH: i64 = 500;

/// Moves lots whose auction date has passed out of the active shards.
pub struct SweepExpiredTask {
    service: Arc<CatalogService>,
}

impl SweepExpiredTask {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for SweepExpiredTask {
    async fn run(&self) {
        let now = chrono::Utc::now().naive_utc();
        match self.service.mover().sweep_expired(now, SWEEP_BATCH).await {
            Ok(moved) if moved.is_empty() => {}
            Ok(moved) => info!(moved = moved.len(), "swept expired lots to historical"),
            Err(e) => warn!("expired sweep failed: `{e}`"),
        }
    }

    fn descriptor(&self) -> Option<&'static str> {
        Some("expired sweep")
    }
}
