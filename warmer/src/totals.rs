use crate::Task;
use async_trait::async_trait;
use catalog::query::criteria::FilterCriteria;
use catalog::service::{CatalogScope, CatalogService, TotalsSignature};
use common::cache::CacheKey;
use common::config::CONFIG;
use std::sync::Arc;
use tracing::{debug, warn};

/// Refreshes the coarse lot totals (overall and per source) on a short loop.
/// These back landing-page counters, so staleness is acceptable but a cache
/// miss is not.
pub struct TotalsRefreshTask {
    service: Arc<CatalogService>,
    sources: Vec<String>,
}

impl TotalsRefreshTask {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self {
            service,
            sources: CONFIG.catalog.sources.clone(),
        }
    }

    async fn refresh_one(&self, scope: CatalogScope, source: Option<String>) {
        let mut criteria = FilterCriteria::default();
        if let Some(source) = &source {
            criteria.sources = Some(vec![source.clone()]);
        }
        let count = self.service.count_lots(scope, &criteria).await;
        if count.degraded {
            warn!(?scope, ?source, "total is degraded, caching anyway");
        }

        let signature = TotalsSignature { scope, source };
        let key = CacheKey::from_signature(&signature);
        self.service.cache().set_json(key, &count).await;
        debug!(?signature, total = count.total, "refreshed total");
    }
}

#[async_trait]
impl Task for TotalsRefreshTask {
    async fn run(&self) {
        for scope in [CatalogScope::Active, CatalogScope::Historical] {
            self.refresh_one(scope, None).await;
            for source in &self.sources {
                self.refresh_one(scope, Some(source.clone())).await;
            }
        }
    }

    fn descriptor(&self) -> Option<&'static str> {
        Some("totals refresh")
    }
}
