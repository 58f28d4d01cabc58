use crate::error::{CatalogError, MoveError};
use crate::ident::{IdAllocator, ShardCursor};
use crate::mover::{Mover, PartitionClass, classify, classify_row, upsert_history_addon};
use crate::partition::Partition;
use crate::query::criteria::{FilterCriteria, Sort};
use crate::query::facets::{self, FacetStats};
use crate::query::pg::PgPartitionReader;
use crate::query::scatter::{ScatterGather, ShardedCount};
use crate::query::sql;
use crate::refdata::{self, ReferenceKind};
use common::cache::{CacheKey, ResultCache};
use common::config::CONFIG;
use common::persistence::PgPool;
use common::persistence::models::{IncomingLot, LotImage, LotRow, NewLotLocator};
use diesel::prelude::*;
use diesel::sql_types::{
    BigInt, Bool, Double, Integer, Nullable, Text, Timestamp,
};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which logical collection a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogScope {
    Active,
    Historical,
    OtherVehicle,
    OtherVehicleHistorical,
}

impl CatalogScope {
    pub fn partitions(&self) -> Vec<Partition> {
        match self {
            CatalogScope::Active => Partition::active_partitions().to_vec(),
            CatalogScope::Historical => vec![Partition::Historical],
            CatalogScope::OtherVehicle => vec![Partition::OtherVehicle],
            CatalogScope::OtherVehicleHistorical => vec![Partition::OtherVehicleHistorical],
        }
    }
}

/// Deterministic cache signature. The warmer builds the exact same struct, so
/// a warmed entry and a live request hash to the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySignature {
    pub scope: CatalogScope,
    pub language: String,
    pub criteria: FilterCriteria,
    pub sort: Sort,
    pub limit: i64,
    pub offset: i64,
}

impl QuerySignature {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_signature(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub lots: Vec<LotRow>,
    pub total: ShardedCount,
    pub facets: FacetStats,
}

impl CatalogPage {
    fn empty() -> Self {
        Self {
            lots: Vec::new(),
            total: ShardedCount::exact(0),
            facets: FacetStats::default(),
        }
    }

    fn degraded() -> Self {
        Self {
            total: ShardedCount {
                total: 0,
                degraded: true,
            },
            ..Self::empty()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotDetail {
    pub lot: LotRow,
    pub images: Vec<LotImage>,
}

/// Signature for the coarse totals the warmer refreshes on its short loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsSignature {
    pub scope: CatalogScope,
    pub source: Option<String>,
}

pub struct CatalogService {
    pool: PgPool,
    cache: ResultCache,
    executor: ScatterGather<PgPartitionReader>,
    mover: Mover,
    request_timeout: Duration,
}

impl CatalogService {
    pub fn new(pool: PgPool, cache: ResultCache) -> Self {
        let reader = PgPartitionReader::new(pool.clone());
        let shard_timeout = Duration::from_millis(CONFIG.catalog.shard_timeout_ms);
        Self {
            executor: ScatterGather::new(reader, shard_timeout),
            mover: Mover::new(pool.clone()),
            request_timeout: Duration::from_millis(CONFIG.catalog.request_timeout_ms),
            pool,
            cache,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    /// One catalog page: lots, best-effort total and facet statistics. Always
    /// produces a page; partial shard failures and the overall soft timeout
    /// degrade the result instead of erroring.
    #[instrument(skip(self, signature), fields(scope = ?signature.scope, language = %signature.language))]
    pub async fn get_catalog_page(
        &self,
        signature: &QuerySignature,
    ) -> Result<CatalogPage, CatalogError> {
        signature.criteria.validate()?;
        if !self.scope_is_consistent(&signature.criteria).await? {
            debug!("model/series scope mismatch, returning empty set");
            return Ok(CatalogPage::empty());
        }

        let key = signature.cache_key();
        if let Some(page) = self.cache.get_json::<CatalogPage>(&key).await {
            debug!("cache hit");
            return Ok(page);
        }

        match tokio::time::timeout(self.request_timeout, self.compute_page(signature)).await {
            Ok(page) => {
                let page = page?;
                self.cache.set_json(key, &page).await;
                Ok(page)
            }
            Err(_) => {
                warn!("catalog page timed out, serving degraded page");
                Ok(CatalogPage::degraded())
            }
        }
    }

    /// Uncached compute path; also what the pre-warmer drives.
    pub async fn compute_page(
        &self,
        signature: &QuerySignature,
    ) -> Result<CatalogPage, CatalogError> {
        let partitions = signature.scope.partitions();
        let (lots, total) = self
            .executor
            .fetch_page(
                &partitions,
                &signature.criteria,
                signature.sort,
                signature.limit,
                signature.offset,
            )
            .await;
        let mut stats = facets::compute(&self.executor, &partitions, &signature.criteria).await;
        self.localize_facets(&mut stats, &signature.language).await;
        Ok(CatalogPage {
            lots,
            total,
            facets: stats,
        })
    }

    /// Computes and caches one page without returning it; warm-target entry
    /// point.
    pub async fn warm_page(&self, signature: &QuerySignature) -> Result<(), CatalogError> {
        let page = self.compute_page(signature).await?;
        self.cache.set_json(signature.cache_key(), &page).await;
        Ok(())
    }

    async fn localize_facets(&self, stats: &mut FacetStats, language: &str) {
        for (field, values) in stats.fields.iter_mut() {
            let slugs: Vec<String> = values.iter().map(|v| v.value.clone()).collect();
            match refdata::labels_for(&self.pool, field, &slugs, language).await {
                Ok(labels) => {
                    for value in values.iter_mut() {
                        if let Some(label) = labels.get(&value.value) {
                            value.label = label.clone();
                        }
                    }
                }
                Err(e) => debug!(field, "facet label lookup failed: `{e}`"),
            }
        }
    }

    /// A model filter must actually belong to one of the requested makes, and
    /// a series to one of the requested models; otherwise the combination is
    /// answered with an empty set rather than an unscoped query.
    async fn scope_is_consistent(&self, criteria: &FilterCriteria) -> Result<bool, CatalogError> {
        if let (Some(models), Some(makes)) = (&criteria.models, &criteria.makes) {
            for model in models {
                let mut under_any = false;
                for make in makes {
                    if refdata::lookup(&self.pool, ReferenceKind::Model, model, Some(make))
                        .await?
                        .is_some()
                    {
                        under_any = true;
                        break;
                    }
                }
                if !under_any {
                    return Ok(false);
                }
            }
        }
        if let (Some(series), Some(models)) = (&criteria.series, &criteria.models) {
            for s in series {
                let mut under_any = false;
                for model in models {
                    if refdata::lookup(&self.pool, ReferenceKind::Series, s, Some(model))
                        .await?
                        .is_some()
                    {
                        under_any = true;
                        break;
                    }
                }
                if !under_any {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Locator-resolved point read. The id prefix is validated first; prefixes
    /// only witness where an id was issued, the locator says where the row
    /// lives now.
    pub async fn get_lot_by_id(&self, lot_id: i64) -> Result<Option<LotDetail>, CatalogError> {
        Partition::of_id(lot_id)?;

        use common::persistence::schema::lot_image::dsl as image;
        use common::persistence::schema::lot_locator::dsl as locator;

        let mut conn = self.pool.get().await?;
        let partition_name: Option<String> = locator::lot_locator
            .find(lot_id)
            .select(locator::partition)
            .first(&mut conn)
            .await
            .optional()?;
        let Some(partition_name) = partition_name else {
            return Ok(None);
        };
        let partition = Partition::from_name(&partition_name)?;
        if !partition.holds_lot_rows() {
            return Ok(None);
        }

        let lot: Option<LotRow> = diesel::sql_query(sql::select_by_id_sql(partition.table_name()))
            .bind::<BigInt, _>(lot_id)
            .get_result(&mut conn)
            .await
            .optional()?;
        let Some(lot) = lot else {
            return Ok(None);
        };

        let images = image::lot_image
            .filter(image::lot_id.eq(lot_id))
            .order(image::sequence_number.asc())
            .select(LotImage::as_select())
            .load(&mut conn)
            .await?;

        Ok(Some(LotDetail { lot, images }))
    }

    /// Moves a lot into its historical counterpart: other-vehicle records go
    /// to the other-vehicle archive, everything else to `Historical`.
    pub async fn move_lot_to_historical(&self, lot_id: i64) -> Result<LotRow, CatalogError> {
        Partition::of_id(lot_id)?;

        use common::persistence::schema::lot_locator::dsl as locator;
        let mut conn = self.pool.get().await?;
        let current: Option<String> = locator::lot_locator
            .find(lot_id)
            .select(locator::partition)
            .first(&mut conn)
            .await
            .optional()?;
        drop(conn);
        let current = current.ok_or(MoveError::NotFound(lot_id))?;

        let target = match Partition::from_name(&current)? {
            Partition::OtherVehicle => Partition::OtherVehicleHistorical,
            _ => Partition::Historical,
        };
        Ok(self.mover.move_to(lot_id, target).await?)
    }

    pub async fn count_lots(
        &self,
        scope: CatalogScope,
        criteria: &FilterCriteria,
    ) -> ShardedCount {
        self.executor.count(&scope.partitions(), criteria).await
    }

    pub async fn delete_lot(&self, lot_id: i64) -> Result<(), CatalogError> {
        Partition::of_id(lot_id)?;
        self.mover.delete(lot_id).await
    }

    /// Classify-on-upsert ingest path. New lots get a fresh id in their
    /// classified partition (round-robin over the pool for fully qualified
    /// automobiles); known lots are updated in place and handed to the mover
    /// when their classification changed.
    #[instrument(skip_all, fields(external = %incoming.external_lot_id))]
    pub async fn upsert_lot(&self, incoming: IncomingLot) -> Result<i64, CatalogError> {
        let incoming = self.resolve_dimensions(incoming).await?;
        let now = chrono::Utc::now().naive_utc();

        use common::persistence::schema::external_ref::dsl as xref;
        let mut conn = self.pool.get().await?;
        let existing: Option<i64> = xref::external_ref
            .filter(xref::source_slug.eq(&incoming.source))
            .filter(xref::external_lot_id.eq(&incoming.external_lot_id))
            .select(xref::lot_id)
            .first(&mut conn)
            .await
            .optional()?;
        drop(conn);

        match existing {
            Some(lot_id) => self.update_existing(lot_id, incoming, now).await,
            None => self.insert_new(incoming, now).await,
        }
    }

    /// Normalizes every dimension name through the get-or-create resolver and
    /// rewrites the payload to carry slugs.
    async fn resolve_dimensions(&self, mut lot: IncomingLot) -> Result<IncomingLot, CatalogError> {
        let pool = &self.pool;
        let resolve = |kind, value: Option<String>, parent: Option<String>| async move {
            Ok::<_, CatalogError>(
                refdata::get_or_create(pool, kind, value.as_deref(), parent.as_deref())
                    .await?
                    .map(|e| e.slug),
            )
        };

        lot.source = resolve(ReferenceKind::Source, Some(lot.source), None)
            .await?
            .unwrap_or_default();
        lot.vehicle_type = resolve(ReferenceKind::VehicleType, Some(lot.vehicle_type), None)
            .await?
            .unwrap_or_default();
        lot.make = resolve(ReferenceKind::Make, Some(lot.make), None)
            .await?
            .unwrap_or_default();
        lot.model = resolve(
            ReferenceKind::Model,
            Some(lot.model),
            Some(lot.make.clone()),
        )
        .await?
        .unwrap_or_default();
        lot.series = resolve(ReferenceKind::Series, lot.series, Some(lot.model.clone())).await?;
        lot.color = resolve(ReferenceKind::Color, lot.color, None).await?;
        lot.status = resolve(ReferenceKind::Status, lot.status, None).await?;
        lot.seller = resolve(ReferenceKind::Seller, lot.seller, None).await?;
        lot.fuel = resolve(ReferenceKind::Fuel, lot.fuel, None).await?;
        lot.transmission = resolve(ReferenceKind::Transmission, lot.transmission, None).await?;
        lot.drive = resolve(ReferenceKind::Drive, lot.drive, None).await?;
        Ok(lot)
    }

    async fn insert_new(
        &self,
        incoming: IncomingLot,
        now: chrono::NaiveDateTime,
    ) -> Result<i64, CatalogError> {
        let class = classify(
            incoming.vin.as_deref(),
            &incoming.vehicle_type,
            incoming.auction_date,
            incoming.thumbnail_url.as_deref(),
            now,
        );

        let mut conn = self.pool.get().await?;
        let lot_id = conn
            .transaction::<i64, CatalogError, _>(|conn| {
                async move {
                    let partition = match class {
                        PartitionClass::ActivePool => {
                            Partition::Active(ShardCursor::advance(conn).await?)
                        }
                        PartitionClass::Fixed(p) => p,
                    };
                    let lot_id = IdAllocator::reserve(conn, partition).await?;

                    insert_lot_row(conn, partition, lot_id, &incoming).await?;

                    if partition.is_historical() {
                        // lots born expired get the addon mirror at birth,
                        // same as lots moved into a historical table later
                        let row: LotRow =
                            diesel::sql_query(sql::select_by_id_sql(partition.table_name()))
                                .bind::<BigInt, _>(lot_id)
                                .get_result(conn)
                                .await?;
                        upsert_history_addon(conn, &row).await?;
                    }

                    diesel::insert_into(common::persistence::schema::lot_locator::table)
                        .values(NewLotLocator {
                            lot_id,
                            partition: partition.name().to_string(),
                        })
                        .execute(conn)
                        .await?;

                    diesel::insert_into(common::persistence::schema::external_ref::table)
                        .values(common::persistence::models::ExternalRef {
                            source_slug: incoming.source.clone(),
                            external_lot_id: incoming.external_lot_id.clone(),
                            lot_id,
                        })
                        .execute(conn)
                        .await?;

                    if !incoming.images.is_empty() {
                        let mut images = incoming.images.clone();
                        for image in images.iter_mut() {
                            image.lot_id = lot_id;
                        }
                        diesel::insert_into(common::persistence::schema::lot_image::table)
                            .values(&images)
                            .execute(conn)
                            .await?;
                    }

                    Ok(lot_id)
                }
                .scope_boxed()
            })
            .await?;

        info!(lot_id, "lot inserted");
        Ok(lot_id)
    }

    async fn update_existing(
        &self,
        lot_id: i64,
        incoming: IncomingLot,
        now: chrono::NaiveDateTime,
    ) -> Result<i64, CatalogError> {
        use common::persistence::schema::lot_locator::dsl as locator;

        let mut conn = self.pool.get().await?;
        let current_name: String = locator::lot_locator
            .find(lot_id)
            .select(locator::partition)
            .first(&mut conn)
            .await?;
        let current = Partition::from_name(&current_name)?;

        update_lot_row(&mut conn, current, lot_id, &incoming).await?;

        let row: LotRow = diesel::sql_query(sql::select_by_id_sql(current.table_name()))
            .bind::<BigInt, _>(lot_id)
            .get_result(&mut conn)
            .await?;
        if row.is_historical {
            // historical rows still mirror price/date updates into the addon
            upsert_history_addon(&mut conn, &row).await?;
        }
        drop(conn);

        let target = match classify_row(&row, now) {
            PartitionClass::Fixed(target) if target != current => Some(target),
            PartitionClass::ActivePool if !matches!(current, Partition::Active(_)) => {
                let mut conn = self.pool.get().await?;
                let shard = ShardCursor::advance(&mut conn).await?;
                Some(Partition::Active(shard))
            }
            _ => None,
        };

        if let Some(target) = target {
            match self.mover.move_to(lot_id, target).await {
                Ok(_) | Err(MoveError::AlreadyMoved { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(lot_id)
    }
}

async fn insert_lot_row(
    conn: &mut AsyncPgConnection,
    partition: Partition,
    lot_id: i64,
    lot: &IncomingLot,
) -> Result<(), CatalogError> {
    diesel::sql_query(sql::insert_lot_sql(partition.table_name()))
        .bind::<BigInt, _>(lot_id)
        .bind::<Text, _>(&lot.external_lot_id)
        .bind::<Nullable<Text>, _>(lot.vin.as_deref())
        .bind::<Text, _>(&lot.source)
        .bind::<Text, _>(&lot.vehicle_type)
        .bind::<Text, _>(&lot.make)
        .bind::<Text, _>(&lot.model)
        .bind::<Nullable<Text>, _>(lot.series.as_deref())
        .bind::<Nullable<Text>, _>(lot.color.as_deref())
        .bind::<Nullable<Text>, _>(lot.status.as_deref())
        .bind::<Nullable<Text>, _>(lot.seller.as_deref())
        .bind::<Nullable<Text>, _>(lot.fuel.as_deref())
        .bind::<Nullable<Text>, _>(lot.transmission.as_deref())
        .bind::<Nullable<Text>, _>(lot.drive.as_deref())
        .bind::<Nullable<Text>, _>(lot.engine_name.as_deref())
        .bind::<Nullable<Text>, _>(lot.engine_cylinders.as_deref())
        .bind::<Nullable<Double>, _>(lot.engine_size)
        .bind::<Integer, _>(lot.year)
        .bind::<Double, _>(lot.odometer)
        .bind::<Double, _>(lot.price)
        .bind::<Double, _>(lot.bid)
        .bind::<Nullable<Double>, _>(lot.reserve_price)
        .bind::<Nullable<Double>, _>(lot.buy_now_price)
        .bind::<Integer, _>(lot.risk_index)
        .bind::<Nullable<Timestamp>, _>(lot.auction_date)
        .bind::<Nullable<Text>, _>(lot.thumbnail_url.as_deref())
        .bind::<Bool, _>(partition.is_historical())
        .execute(conn)
        .await?;
    Ok(())
}

async fn update_lot_row(
    conn: &mut AsyncPgConnection,
    partition: Partition,
    lot_id: i64,
    lot: &IncomingLot,
) -> Result<(), CatalogError> {
    diesel::sql_query(sql::update_lot_sql(partition.table_name()))
        .bind::<BigInt, _>(lot_id)
        .bind::<Nullable<Text>, _>(lot.vin.as_deref())
        .bind::<Text, _>(&lot.vehicle_type)
        .bind::<Text, _>(&lot.make)
        .bind::<Text, _>(&lot.model)
        .bind::<Nullable<Text>, _>(lot.series.as_deref())
        .bind::<Nullable<Text>, _>(lot.color.as_deref())
        .bind::<Nullable<Text>, _>(lot.status.as_deref())
        .bind::<Nullable<Text>, _>(lot.seller.as_deref())
        .bind::<Nullable<Text>, _>(lot.fuel.as_deref())
        .bind::<Nullable<Text>, _>(lot.transmission.as_deref())
        .bind::<Nullable<Text>, _>(lot.drive.as_deref())
        .bind::<Nullable<Text>, _>(lot.engine_name.as_deref())
        .bind::<Nullable<Text>, _>(lot.engine_cylinders.as_deref())
        .bind::<Nullable<Double>, _>(lot.engine_size)
        .bind::<Integer, _>(lot.year)
        .bind::<Double, _>(lot.odometer)
        .bind::<Double, _>(lot.price)
        .bind::<Double, _>(lot.bid)
        .bind::<Nullable<Double>, _>(lot.reserve_price)
        .bind::<Nullable<Double>, _>(lot.buy_now_price)
        .bind::<Integer, _>(lot.risk_index)
        .bind::<Nullable<Timestamp>, _>(lot.auction_date)
        .bind::<Nullable<Text>, _>(lot.thumbnail_url.as_deref())
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_hash_deterministically() {
        let sig = QuerySignature {
            scope: CatalogScope::Active,
            language: "en".into(),
            criteria: FilterCriteria {
                makes: Some(vec!["bmw".into()]),
                ..Default::default()
            },
            sort: Sort::default(),
            limit: 50,
            offset: 0,
        };
        assert_eq!(sig.cache_key(), sig.cache_key());

        let other = QuerySignature {
            language: "de".into(),
            ..sig.clone()
        };
        assert_ne!(sig.cache_key(), other.cache_key());
    }

    #[test]
    fn scope_partition_lists() {
        assert_eq!(CatalogScope::Active.partitions().len(), 7);
        assert_eq!(
            CatalogScope::Historical.partitions(),
            vec![Partition::Historical]
        );
    }
}
