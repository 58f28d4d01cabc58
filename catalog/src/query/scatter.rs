use crate::error::CatalogError;
use crate::partition::Partition;
use crate::query::criteria::{FacetField, FilterCriteria, RangeField, Sort};
use async_trait::async_trait;
use common::persistence::models::LotRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Per-partition data access the executor fans out over. The Postgres
/// implementation lives in `query::pg`; tests drive the executor with an
/// in-memory reader.
#[async_trait]
pub trait PartitionReader: Send + Sync {
    async fn count(
        &self,
        partition: Partition,
        criteria: &FilterCriteria,
    ) -> Result<i64, CatalogError>;

    async fn fetch(
        &self,
        partition: Partition,
        criteria: &FilterCriteria,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LotRow>, CatalogError>;

    async fn min_max(
        &self,
        partition: Partition,
        field: RangeField,
        criteria: &FilterCriteria,
    ) -> Result<Option<(f64, f64)>, CatalogError>;

    async fn facet_counts(
        &self,
        partition: Partition,
        facet: FacetField,
        criteria: &FilterCriteria,
    ) -> Result<Vec<(String, i64)>, CatalogError>;
}

/// Best-effort total. `degraded` marks that at least one partition failed or
/// timed out and contributed nothing, so the total may undercount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardedCount {
    pub total: i64,
    pub degraded: bool,
}

impl ShardedCount {
    pub fn exact(total: i64) -> Self {
        Self {
            total,
            degraded: false,
        }
    }
}

/// One shard's slice of a logical page. Produced by `page_plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub index: usize,
    pub offset: i64,
    pub limit: i64,
}

/// Computes, from per-partition counts, which partitions serve which rows of
/// the logical page `[offset, offset + limit)` over the concatenation of all
/// partitions in list order.
pub fn page_plan(counts: &[i64], limit: i64, mut offset: i64) -> Vec<PageSlice> {
    let mut slices = Vec::new();
    let mut remaining = limit;
    for (index, &count) in counts.iter().enumerate() {
        if remaining <= 0 {
            break;
        }
        if offset >= count {
            offset -= count;
            continue;
        }
        let take = (count - offset).min(remaining);
        slices.push(PageSlice {
            index,
            offset,
            limit: take,
        });
        remaining -= take;
        offset = 0;
    }
    slices
}

/// Executes count/page/min-max/facet operations across a partition list as if
/// it were one table. I/O fans out concurrently; result order always follows
/// the partition list.
pub struct ScatterGather<R> {
    reader: R,
    per_partition_timeout: Duration,
}

impl<R: PartitionReader> ScatterGather<R> {
    pub fn new(reader: R, per_partition_timeout: Duration) -> Self {
        Self {
            reader,
            per_partition_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        tokio::time::timeout(self.per_partition_timeout, fut)
            .await
            .map_err(|_| CatalogError::ShardTimeout(self.per_partition_timeout))?
    }

    async fn counts(
        &self,
        partitions: &[Partition],
        criteria: &FilterCriteria,
    ) -> Vec<Result<i64, CatalogError>> {
        futures::future::join_all(
            partitions
                .iter()
                .map(|&p| self.bounded(self.reader.count(p, criteria))),
        )
        .await
    }

    /// Sum of per-partition counts. A failing partition contributes 0 and
    /// flips the degraded flag; callers must treat the total as best-effort.
    pub async fn count(&self, partitions: &[Partition], criteria: &FilterCriteria) -> ShardedCount {
        let mut total = 0;
        let mut degraded = false;
        for (partition, result) in partitions.iter().zip(self.counts(partitions, criteria).await) {
            match result {
                Ok(count) => total += count,
                Err(e) => {
                    warn!(partition = partition.name(), "count failed: `{e}`");
                    degraded = true;
                }
            }
        }
        ShardedCount { total, degraded }
    }

    /// Fetches the logical page `[offset, offset + limit)` over the
    /// concatenation of the partitions in list order.
    pub async fn fetch_page(
        &self,
        partitions: &[Partition],
        criteria: &FilterCriteria,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> (Vec<LotRow>, ShardedCount) {
        let mut counts = Vec::with_capacity(partitions.len());
        let mut degraded = false;
        for (partition, result) in partitions.iter().zip(self.counts(partitions, criteria).await) {
            match result {
                Ok(count) => counts.push(count),
                Err(e) => {
                    warn!(partition = partition.name(), "page count failed: `{e}`");
                    degraded = true;
                    counts.push(0);
                }
            }
        }
        let total: i64 = counts.iter().sum();

        let plan = page_plan(&counts, limit, offset);
        let fetches = futures::future::join_all(plan.iter().map(|slice| {
            self.bounded(self.reader.fetch(
                partitions[slice.index],
                criteria,
                sort,
                slice.limit,
                slice.offset,
            ))
        }))
        .await;

        let mut lots = Vec::new();
        for (slice, result) in plan.iter().zip(fetches) {
            match result {
                Ok(rows) => lots.extend(rows),
                Err(e) => {
                    warn!(
                        partition = partitions[slice.index].name(),
                        "page fetch failed: `{e}`"
                    );
                    degraded = true;
                }
            }
        }
        (lots, ShardedCount { total, degraded })
    }

    /// Reduced min/max over all partitions; an empty partition contributes
    /// nothing, and so does a failing one.
    pub async fn min_max(
        &self,
        partitions: &[Partition],
        field: RangeField,
        criteria: &FilterCriteria,
    ) -> Option<(f64, f64)> {
        let results = futures::future::join_all(
            partitions
                .iter()
                .map(|&p| self.bounded(self.reader.min_max(p, field, criteria))),
        )
        .await;

        let mut acc: Option<(f64, f64)> = None;
        for (partition, result) in partitions.iter().zip(results) {
            match result {
                Ok(Some((lo, hi))) => {
                    acc = Some(match acc {
                        Some((a, b)) => (a.min(lo), b.max(hi)),
                        None => (lo, hi),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(partition = partition.name(), "min/max failed: `{e}`"),
            }
        }
        acc
    }

    /// Per-value counts for one facet, merged across partitions by summing.
    pub async fn facet_counts(
        &self,
        partitions: &[Partition],
        facet: FacetField,
        criteria: &FilterCriteria,
    ) -> HashMap<String, i64> {
        let results = futures::future::join_all(
            partitions
                .iter()
                .map(|&p| self.bounded(self.reader.facet_counts(p, facet, criteria))),
        )
        .await;

        let mut merged: HashMap<String, i64> = HashMap::new();
        for (partition, result) in partitions.iter().zip(results) {
            match result {
                Ok(rows) => {
                    for (value, count) in rows {
                        *merged.entry(value).or_insert(0) += count;
                    }
                }
                Err(e) => warn!(partition = partition.name(), "facet failed: `{e}`"),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Shard;
    use std::collections::HashSet;

    fn lot(id: i64) -> LotRow {
        LotRow {
            id,
            external_lot_id: id.to_string(),
            vin: None,
            source_slug: "copart".into(),
            vehicle_type_slug: "automobile".into(),
            make_slug: "ford".into(),
            model_slug: "focus".into(),
            series_slug: None,
            color_slug: None,
            status_slug: None,
            seller_slug: None,
            fuel_slug: None,
            transmission_slug: None,
            drive_slug: None,
            engine_name: None,
            engine_cylinders: None,
            engine_size: None,
            year: 2018,
            odometer: 0.0,
            price: 0.0,
            bid: 0.0,
            reserve_price: None,
            buy_now_price: None,
            risk_index: 0,
            auction_date: None,
            thumbnail_url: None,
            is_historical: false,
            created_at: chrono::NaiveDateTime::default(),
            updated_at: chrono::NaiveDateTime::default(),
        }
    }

    /// Fixed per-shard contents, optionally failing whole shards.
    struct MemReader {
        shards: HashMap<Partition, Vec<LotRow>>,
        failing: HashSet<Partition>,
    }

    impl MemReader {
        fn with_sizes(sizes: [usize; 7]) -> Self {
            let mut shards = HashMap::new();
            let mut next_id = 0i64;
            for (i, &size) in sizes.iter().enumerate() {
                let partition = Partition::Active(Shard::new(i as u8 + 1).unwrap());
                let rows = (0..size)
                    .map(|_| {
                        next_id += 1;
                        lot(next_id)
                    })
                    .collect();
                shards.insert(partition, rows);
            }
            Self {
                shards,
                failing: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl PartitionReader for MemReader {
        async fn count(
            &self,
            partition: Partition,
            _criteria: &FilterCriteria,
        ) -> Result<i64, CatalogError> {
            if self.failing.contains(&partition) {
                return Err(CatalogError::UnknownPartition(-1));
            }
            Ok(self.shards.get(&partition).map_or(0, |v| v.len() as i64))
        }

        async fn fetch(
            &self,
            partition: Partition,
            _criteria: &FilterCriteria,
            _sort: Sort,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<LotRow>, CatalogError> {
            if self.failing.contains(&partition) {
                return Err(CatalogError::UnknownPartition(-1));
            }
            let rows = self.shards.get(&partition).cloned().unwrap_or_default();
            Ok(rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn min_max(
            &self,
            partition: Partition,
            _field: RangeField,
            _criteria: &FilterCriteria,
        ) -> Result<Option<(f64, f64)>, CatalogError> {
            let rows = self.shards.get(&partition).cloned().unwrap_or_default();
            let ids: Vec<f64> = rows.iter().map(|l| l.id as f64).collect();
            Ok(ids
                .iter()
                .copied()
                .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    None => Some((v, v)),
                }))
        }

        async fn facet_counts(
            &self,
            partition: Partition,
            _facet: FacetField,
            _criteria: &FilterCriteria,
        ) -> Result<Vec<(String, i64)>, CatalogError> {
            let rows = self.shards.get(&partition).map_or(0, |v| v.len() as i64);
            Ok(if rows > 0 {
                vec![("ford".to_string(), rows)]
            } else {
                vec![]
            })
        }
    }

    fn executor(reader: MemReader) -> ScatterGather<MemReader> {
        ScatterGather::new(reader, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn count_sums_non_trivial_distribution() {
        let exec = executor(MemReader::with_sizes([3, 0, 5, 2, 0, 1, 4]));
        let count = exec
            .count(&Partition::active_partitions(), &FilterCriteria::default())
            .await;
        assert_eq!(count, ShardedCount::exact(15));
    }

    #[tokio::test]
    async fn failing_shard_contributes_zero_and_degrades() {
        let mut reader = MemReader::with_sizes([3, 0, 5, 2, 0, 1, 4]);
        reader
            .failing
            .insert(Partition::Active(Shard::new(3).unwrap()));
        let exec = executor(reader);
        let count = exec
            .count(&Partition::active_partitions(), &FilterCriteria::default())
            .await;
        assert_eq!(count.total, 10);
        assert!(count.degraded);
    }

    #[tokio::test]
    async fn pagination_matches_concatenation_slice() {
        let sizes = [3usize, 0, 5, 2, 0, 1, 4];
        let reader = MemReader::with_sizes(sizes);
        let concatenated: Vec<i64> = Partition::active_partitions()
            .iter()
            .flat_map(|p| reader.shards[p].iter().map(|l| l.id))
            .collect();
        let exec = executor(reader);

        for offset in 0..=15 {
            for limit in [1i64, 3, 7, 15, 100] {
                let (lots, count) = exec
                    .fetch_page(
                        &Partition::active_partitions(),
                        &FilterCriteria::default(),
                        Sort::default(),
                        limit,
                        offset,
                    )
                    .await;
                let ids: Vec<i64> = lots.iter().map(|l| l.id).collect();
                let expected: Vec<i64> = concatenated
                    .iter()
                    .copied()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect();
                assert_eq!(ids, expected, "limit {limit} offset {offset}");
                assert_eq!(count.total, 15);
                assert!(!count.degraded);
            }
        }
    }

    #[tokio::test]
    async fn page_plan_skips_exhausted_shards() {
        let plan = page_plan(&[3, 0, 5], 4, 5);
        assert_eq!(
            plan,
            vec![PageSlice {
                index: 2,
                offset: 2,
                limit: 3,
            }]
        );
    }

    #[tokio::test]
    async fn min_max_ignores_empty_shards() {
        let exec = executor(MemReader::with_sizes([2, 0, 0, 0, 0, 0, 3]));
        let got = exec
            .min_max(
                &Partition::active_partitions(),
                RangeField::Odometer,
                &FilterCriteria::default(),
            )
            .await;
        assert_eq!(got, Some((1.0, 5.0)));
    }

    #[tokio::test]
    async fn facet_counts_merge_by_summing() {
        let exec = executor(MemReader::with_sizes([3, 0, 5, 2, 0, 1, 4]));
        let merged = exec
            .facet_counts(
                &Partition::active_partitions(),
                FacetField::Make,
                &FilterCriteria::default(),
            )
            .await;
        assert_eq!(merged.get("ford"), Some(&15));
    }
}
