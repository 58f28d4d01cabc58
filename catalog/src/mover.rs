use crate::error::{CatalogError, MoveError};
use crate::partition::Partition;
use crate::query::sql;
use async_trait::async_trait;
use common::persistence::PgPool;
use common::persistence::models::{LotRow, NewHistoryAddon};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Bool, Timestamp};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::{info, instrument};

pub const VIN_LENGTH: usize = 17;
pub const AUTOMOBILE_SLUG: &str = "automobile";

/// Where a record belongs according to its own state. `ActivePool` still
/// needs the round-robin router to pick a concrete shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionClass {
    ActivePool,
    Fixed(Partition),
}

/// Eligibility predicate, evaluated at upsert time and by the sweep.
/// A well-formed 17-char VIN plus an automobile type qualifies a record for
/// the sharded pool; anything degenerate routes to the other-vehicle tables
/// instead of being rejected.
pub fn classify(
    vin: Option<&str>,
    vehicle_type_slug: &str,
    auction_date: Option<chrono::NaiveDateTime>,
    thumbnail_url: Option<&str>,
    now: chrono::NaiveDateTime,
) -> PartitionClass {
    let vin_ok = vin.is_some_and(|v| v.len() == VIN_LENGTH);
    let automobile = vehicle_type_slug == AUTOMOBILE_SLUG;
    let expired = auction_date.is_some_and(|d| d < now);

    if !vin_ok || !automobile {
        return PartitionClass::Fixed(if expired {
            Partition::OtherVehicleHistorical
        } else {
            Partition::OtherVehicle
        });
    }
    if auction_date.is_none() {
        return PartitionClass::Fixed(Partition::WithoutAuctionDate);
    }
    if expired {
        return PartitionClass::Fixed(Partition::Historical);
    }
    if thumbnail_url.is_none() {
        return PartitionClass::Fixed(Partition::WithoutImage);
    }
    PartitionClass::ActivePool
}

pub fn classify_row(row: &LotRow, now: chrono::NaiveDateTime) -> PartitionClass {
    classify(
        row.vin.as_deref(),
        &row.vehicle_type_slug,
        row.auction_date,
        row.thumbnail_url.as_deref(),
        now,
    )
}

pub fn allowed_transition(from: Partition, to: Partition) -> bool {
    match (from, to) {
        (
            Partition::Active(_),
            Partition::Historical | Partition::WithoutAuctionDate | Partition::WithoutImage,
        ) => true,
        (
            Partition::WithoutAuctionDate | Partition::WithoutImage,
            Partition::Historical | Partition::Active(_),
        ) => true,
        (Partition::OtherVehicle, Partition::OtherVehicleHistorical) => true,
        _ => false,
    }
}

/// Row-level storage the move sequence runs against. The Postgres
/// implementation executes inside one transaction; tests drive the sequence
/// with an in-memory store.
#[async_trait]
pub trait LotStore: Send {
    /// Current locator entry for the lot, locked against concurrent movers.
    async fn locate_for_update(&mut self, lot_id: i64) -> Result<Option<String>, MoveError>;

    /// Copies the row into the target table, with the historical flag set to
    /// match the target. Returns the number of rows copied.
    async fn copy_row(
        &mut self,
        source: Partition,
        target: Partition,
        lot_id: i64,
    ) -> Result<usize, MoveError>;

    async fn load_row(&mut self, partition: Partition, lot_id: i64) -> Result<LotRow, MoveError>;

    async fn mirror_history(&mut self, row: &LotRow) -> Result<(), MoveError>;

    async fn delete_row(&mut self, partition: Partition, lot_id: i64) -> Result<(), MoveError>;

    async fn repoint_locator(&mut self, lot_id: i64, target: Partition) -> Result<(), MoveError>;
}

/// The move sequence itself: locate, gate, copy, mirror, delete, repoint.
/// Identity is preserved throughout, and the source row is only deleted after
/// the target copy exists.
async fn run_move<S: LotStore>(
    store: &mut S,
    lot_id: i64,
    target: Partition,
) -> Result<LotRow, MoveError> {
    let current_name = store
        .locate_for_update(lot_id)
        .await?
        .ok_or(MoveError::NotFound(lot_id))?;
    let source = Partition::from_name(&current_name).map_err(|_| MoveError::CorruptLocator {
        id: lot_id,
        name: current_name.clone(),
    })?;

    if source == target {
        return Err(MoveError::AlreadyMoved {
            id: lot_id,
            target: target.name(),
        });
    }
    if !allowed_transition(source, target) {
        return Err(MoveError::IllegalTransition {
            id: lot_id,
            from: source,
            to: target,
        });
    }

    let copied = store.copy_row(source, target, lot_id).await?;
    if copied == 0 {
        // locator pointed at a partition that no longer holds the row;
        // abort rather than fabricate a record
        return Err(MoveError::NotFound(lot_id));
    }

    let row = store.load_row(target, lot_id).await?;
    if target.is_historical() {
        store.mirror_history(&row).await?;
    }

    store.delete_row(source, lot_id).await?;
    store.repoint_locator(lot_id, target).await?;
    Ok(row)
}

struct PgLotStore<'a> {
    conn: &'a mut AsyncPgConnection,
}

#[async_trait]
impl LotStore for PgLotStore<'_> {
    async fn locate_for_update(&mut self, lot_id: i64) -> Result<Option<String>, MoveError> {
        use common::persistence::schema::lot_locator::dsl as locator;

        Ok(locator::lot_locator
            .find(lot_id)
            .select(locator::partition)
            .for_update()
            .first(&mut *self.conn)
            .await
            .optional()?)
    }

    async fn copy_row(
        &mut self,
        source: Partition,
        target: Partition,
        lot_id: i64,
    ) -> Result<usize, MoveError> {
        diesel::sql_query(sql::move_insert_sql(
            source.table_name(),
            target.table_name(),
        ))
        .bind::<BigInt, _>(lot_id)
        .bind::<Bool, _>(target.is_historical())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                MoveError::DuplicateId {
                    id: lot_id,
                    target: target.name(),
                }
            }
            other => MoveError::Diesel(other),
        })
    }

    async fn load_row(&mut self, partition: Partition, lot_id: i64) -> Result<LotRow, MoveError> {
        Ok(diesel::sql_query(sql::select_by_id_sql(partition.table_name()))
            .bind::<BigInt, _>(lot_id)
            .get_result(&mut *self.conn)
            .await?)
    }

    async fn mirror_history(&mut self, row: &LotRow) -> Result<(), MoveError> {
        Ok(upsert_history_addon(self.conn, row).await?)
    }

    async fn delete_row(&mut self, partition: Partition, lot_id: i64) -> Result<(), MoveError> {
        diesel::sql_query(sql::delete_by_id_sql(partition.table_name()))
            .bind::<BigInt, _>(lot_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn repoint_locator(&mut self, lot_id: i64, target: Partition) -> Result<(), MoveError> {
        use common::persistence::schema::lot_locator::dsl as locator;

        diesel::update(locator::lot_locator.find(lot_id))
            .set((
                locator::partition.eq(target.name()),
                locator::updated_at.eq(diesel::dsl::sql::<Timestamp>("now()")),
            ))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

/// Transactional cross-partition relocation. Identity is preserved: the row
/// keeps its id, and the locator index is repointed in the same transaction,
/// so a crash anywhere mid-move leaves the source row intact.
pub struct Mover {
    pool: PgPool,
}

impl Mover {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn move_to(&self, lot_id: i64, target: Partition) -> Result<LotRow, MoveError> {
        let mut conn = self.pool.get().await?;
        let moved = conn
            .transaction::<LotRow, MoveError, _>(|conn| {
                async move {
                    let mut store = PgLotStore { conn };
                    run_move(&mut store, lot_id, target).await
                }
                .scope_boxed()
            })
            .await?;

        info!(lot_id, target = target.name(), "lot moved");
        Ok(moved)
    }

    /// Admin-only hard delete: lot row, locator, images and the history
    /// mirror all go in one transaction.
    #[instrument(skip(self))]
    pub async fn delete(&self, lot_id: i64) -> Result<(), CatalogError> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<(), CatalogError, _>(|conn| {
            async move {
                use common::persistence::schema::external_ref::dsl as xref;
                use common::persistence::schema::history_addon::dsl as addon;
                use common::persistence::schema::lot_image::dsl as image;
                use common::persistence::schema::lot_locator::dsl as locator;

                let current_name: Option<String> = locator::lot_locator
                    .find(lot_id)
                    .select(locator::partition)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let Some(current_name) = current_name else {
                    return Ok(());
                };
                let partition = Partition::from_name(&current_name)?;

                diesel::sql_query(sql::delete_by_id_sql(partition.table_name()))
                    .bind::<BigInt, _>(lot_id)
                    .execute(conn)
                    .await?;
                diesel::delete(image::lot_image.filter(image::lot_id.eq(lot_id)))
                    .execute(conn)
                    .await?;
                diesel::delete(addon::history_addon.find(lot_id))
                    .execute(conn)
                    .await?;
                diesel::delete(xref::external_ref.filter(xref::lot_id.eq(lot_id)))
                    .execute(conn)
                    .await?;
                diesel::delete(locator::lot_locator.find(lot_id))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        info!(lot_id, "lot deleted");
        Ok(())
    }

    /// Relocates every active-pool lot whose auction date has passed. Returns
    /// the ids that moved. Errors on individual lots are logged and skipped
    /// so one bad record cannot wedge the sweep.
    pub async fn sweep_expired(
        &self,
        now: chrono::NaiveDateTime,
        batch: i64,
    ) -> Result<Vec<i64>, CatalogError> {
        let mut moved = Vec::new();
        for partition in Partition::active_partitions() {
            let mut conn = self.pool.get().await?;
            let ids: Vec<IdRow> = diesel::sql_query(format!(
                "SELECT id FROM {} WHERE auction_date < $1 LIMIT $2",
                partition.table_name()
            ))
            .bind::<Timestamp, _>(now)
            .bind::<BigInt, _>(batch)
            .load(&mut conn)
            .await?;
            drop(conn);

            for row in ids {
                match self.move_to(row.id, Partition::Historical).await {
                    Ok(_) => moved.push(row.id),
                    Err(MoveError::AlreadyMoved { .. }) => {}
                    Err(e) => tracing::warn!(lot_id = row.id, "sweep move failed: `{e}`"),
                }
            }
        }
        Ok(moved)
    }
}

#[derive(diesel::QueryableByName)]
struct IdRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

pub(crate) async fn upsert_history_addon(
    conn: &mut diesel_async::AsyncPgConnection,
    row: &LotRow,
) -> Result<(), DieselError> {
    use common::persistence::schema::history_addon::dsl::*;

    let mirror = NewHistoryAddon::from(row);
    diesel::insert_into(history_addon)
        .values(&mirror)
        .on_conflict(lot_id)
        .do_update()
        .set((
            vin.eq(mirror.vin.clone()),
            make_slug.eq(mirror.make_slug.clone()),
            model_slug.eq(mirror.model_slug.clone()),
            year.eq(mirror.year),
            price.eq(mirror.price),
            auction_date.eq(mirror.auction_date),
            source_slug.eq(mirror.source_slug.clone()),
            updated_at.eq(diesel::dsl::sql::<Timestamp>("now()")),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Shard;
    use std::collections::{HashMap, HashSet};

    fn dt(s: &str) -> chrono::NaiveDateTime {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    const VIN: &str = "1HGBH41JXMN109186";
    const NOW: &str = "2025-06-15 12:00:00";

    fn lot(id: i64) -> LotRow {
        LotRow {
            id,
            external_lot_id: id.to_string(),
            vin: Some(VIN.to_string()),
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

    /// Plain-map store: one table per partition, a locator map and the set of
    /// mirrored ids.
    #[derive(Default)]
    struct MemStore {
        tables: HashMap<&'static str, HashMap<i64, LotRow>>,
        locator: HashMap<i64, String>,
        mirrored: HashSet<i64>,
    }

    impl MemStore {
        fn seeded(partition: Partition, row: LotRow) -> Self {
            let mut store = Self::default();
            store.locator.insert(row.id, partition.name().to_string());
            store
                .tables
                .entry(partition.table_name())
                .or_default()
                .insert(row.id, row);
            store
        }

        fn holds(&self, partition: Partition, lot_id: i64) -> bool {
            self.tables
                .get(partition.table_name())
                .is_some_and(|t| t.contains_key(&lot_id))
        }
    }

    #[async_trait]
    impl LotStore for MemStore {
        async fn locate_for_update(&mut self, lot_id: i64) -> Result<Option<String>, MoveError> {
            Ok(self.locator.get(&lot_id).cloned())
        }

        async fn copy_row(
            &mut self,
            source: Partition,
            target: Partition,
            lot_id: i64,
        ) -> Result<usize, MoveError> {
            if self.holds(target, lot_id) {
                return Err(MoveError::DuplicateId {
                    id: lot_id,
                    target: target.name(),
                });
            }
            let Some(row) = self
                .tables
                .get(source.table_name())
                .and_then(|t| t.get(&lot_id))
                .cloned()
            else {
                return Ok(0);
            };
            let mut copy = row;
            copy.is_historical = target.is_historical();
            self.tables
                .entry(target.table_name())
                .or_default()
                .insert(lot_id, copy);
            Ok(1)
        }

        async fn load_row(
            &mut self,
            partition: Partition,
            lot_id: i64,
        ) -> Result<LotRow, MoveError> {
            self.tables
                .get(partition.table_name())
                .and_then(|t| t.get(&lot_id))
                .cloned()
                .ok_or(MoveError::NotFound(lot_id))
        }

        async fn mirror_history(&mut self, row: &LotRow) -> Result<(), MoveError> {
            self.mirrored.insert(row.id);
            Ok(())
        }

        async fn delete_row(
            &mut self,
            partition: Partition,
            lot_id: i64,
        ) -> Result<(), MoveError> {
            if let Some(table) = self.tables.get_mut(partition.table_name()) {
                table.remove(&lot_id);
            }
            Ok(())
        }

        async fn repoint_locator(
            &mut self,
            lot_id: i64,
            target: Partition,
        ) -> Result<(), MoveError> {
            self.locator.insert(lot_id, target.name().to_string());
            Ok(())
        }
    }

    #[test]
    fn well_formed_automobile_goes_to_the_pool() {
        let class = classify(
            Some(VIN),
            "automobile",
            Some(dt("2025-07-01 09:00:00")),
            Some("thumb.jpg"),
            dt(NOW),
        );
        assert_eq!(class, PartitionClass::ActivePool);
    }

    #[test]
    fn degenerate_vin_routes_to_other_vehicle_not_rejected() {
        let class = classify(
            Some("SHORT"),
            "automobile",
            Some(dt("2025-07-01 09:00:00")),
            Some("thumb.jpg"),
            dt(NOW),
        );
        assert_eq!(class, PartitionClass::Fixed(Partition::OtherVehicle));
    }

    #[test]
    fn non_automobile_past_date_is_other_vehicle_historical() {
        let class = classify(
            Some(VIN),
            "motorcycle",
            Some(dt("2025-01-01 09:00:00")),
            None,
            dt(NOW),
        );
        assert_eq!(
            class,
            PartitionClass::Fixed(Partition::OtherVehicleHistorical)
        );
    }

    #[test]
    fn missing_date_beats_missing_image() {
        let class = classify(Some(VIN), "automobile", None, None, dt(NOW));
        assert_eq!(class, PartitionClass::Fixed(Partition::WithoutAuctionDate));
    }

    #[test]
    fn past_date_goes_historical() {
        let class = classify(
            Some(VIN),
            "automobile",
            Some(dt("2025-06-15 11:59:59")),
            Some("thumb.jpg"),
            dt(NOW),
        );
        assert_eq!(class, PartitionClass::Fixed(Partition::Historical));
    }

    #[test]
    fn missing_thumbnail_goes_without_image() {
        let class = classify(
            Some(VIN),
            "automobile",
            Some(dt("2025-07-01 09:00:00")),
            None,
            dt(NOW),
        );
        assert_eq!(class, PartitionClass::Fixed(Partition::WithoutImage));
    }

    #[test]
    fn transition_table() {
        let shard = Partition::Active(Shard::new(1).unwrap());
        assert!(allowed_transition(shard, Partition::Historical));
        assert!(allowed_transition(shard, Partition::WithoutAuctionDate));
        assert!(allowed_transition(shard, Partition::WithoutImage));
        assert!(allowed_transition(
            Partition::WithoutImage,
            Partition::Active(Shard::new(4).unwrap())
        ));
        assert!(allowed_transition(
            Partition::OtherVehicle,
            Partition::OtherVehicleHistorical
        ));
        assert!(!allowed_transition(Partition::Historical, shard));
        assert!(!allowed_transition(
            shard,
            Partition::OtherVehicleHistorical
        ));
        assert!(!allowed_transition(shard, Partition::HistoryAddons));
    }

    #[tokio::test]
    async fn move_keeps_the_id_and_vacates_the_source() {
        let id = 11_000_042;
        let source = Partition::Active(Shard::new(1).unwrap());
        let mut store = MemStore::seeded(source, lot(id));

        let moved = run_move(&mut store, id, Partition::Historical).await.unwrap();
        assert_eq!(moved.id, id);
        assert!(moved.is_historical);
        assert!(!store.holds(source, id));
        assert!(store.holds(Partition::Historical, id));
        assert_eq!(store.locator[&id], "historical");
        assert!(store.mirrored.contains(&id));
    }

    #[tokio::test]
    async fn rerunning_a_finished_move_reports_already_moved() {
        let id = 11_000_042;
        let source = Partition::Active(Shard::new(1).unwrap());
        let mut store = MemStore::seeded(source, lot(id));

        run_move(&mut store, id, Partition::Historical).await.unwrap();
        let again = run_move(&mut store, id, Partition::Historical).await;
        assert!(matches!(again, Err(MoveError::AlreadyMoved { id: 11_000_042, .. })));
        assert!(store.holds(Partition::Historical, id));
    }

    #[tokio::test]
    async fn stale_target_copy_is_refused_not_duplicated() {
        // leftover copy in the target while the locator still names the
        // source; the rerun must not produce a second row
        let id = 11_000_042;
        let source = Partition::Active(Shard::new(1).unwrap());
        let mut store = MemStore::seeded(source, lot(id));
        store
            .tables
            .entry(Partition::Historical.table_name())
            .or_default()
            .insert(id, lot(id));

        let result = run_move(&mut store, id, Partition::Historical).await;
        assert!(matches!(result, Err(MoveError::DuplicateId { .. })));
        assert!(store.holds(source, id));
    }

    #[tokio::test]
    async fn illegal_transition_writes_nothing() {
        let id = 2_000_007;
        let mut store = MemStore::seeded(Partition::Historical, lot(id));

        let result = run_move(
            &mut store,
            id,
            Partition::Active(Shard::new(1).unwrap()),
        )
        .await;
        assert!(matches!(result, Err(MoveError::IllegalTransition { .. })));
        assert!(store.holds(Partition::Historical, id));
        assert_eq!(store.locator[&id], "historical");
    }

    #[tokio::test]
    async fn unlocated_id_is_not_found() {
        let mut store = MemStore::default();
        let result = run_move(&mut store, 11_999_999, Partition::Historical).await;
        assert!(matches!(result, Err(MoveError::NotFound(11_999_999))));
    }

    #[test]
    fn lots_born_expired_land_in_mirrored_partitions() {
        let past = dt("2025-01-01 09:00:00");
        let class = classify(Some(VIN), "automobile", Some(past), Some("thumb.jpg"), dt(NOW));
        let PartitionClass::Fixed(partition) = class else {
            panic!("expired lot must not enter the active pool");
        };
        assert!(partition.is_historical());

        let class = classify(None, "motorcycle", Some(past), None, dt(NOW));
        assert_eq!(
            class,
            PartitionClass::Fixed(Partition::OtherVehicleHistorical)
        );
        assert!(Partition::OtherVehicleHistorical.is_historical());
    }
}
