use crate::error::CatalogError;
use crate::partition::{PREFIX_SPAN, Partition, SHARD_COUNT, Shard};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

/// Round-robin step over the seven active shards.
pub fn next_shard(last: i32) -> i32 {
    (last % SHARD_COUNT as i32) + 1
}

/// Per-partition monotonic sequence. One `id_counter` row per partition,
/// seeded at `prefix * PREFIX_SPAN`; the reserve is a single upsert with
/// `RETURNING`, so two concurrent inserts into the same partition can never
/// read the same value.
pub struct IdAllocator;

impl IdAllocator {
    pub async fn reserve(
        conn: &mut AsyncPgConnection,
        target: Partition,
    ) -> Result<i64, CatalogError> {
        use common::persistence::schema::id_counter::dsl::*;

        let seed = target.prefix() * PREFIX_SPAN;
        let reserved = diesel::insert_into(id_counter)
            .values((partition.eq(target.name()), last_id.eq(seed + 1)))
            .on_conflict(partition)
            .do_update()
            .set(last_id.eq(last_id + 1))
            .returning(last_id)
            .get_result::<i64>(conn)
            .await?;
        Ok(reserved)
    }
}

/// Global "last shard used" pointer, independent of the per-shard sequence
/// counters. Advanced atomically in one statement.
pub struct ShardCursor;

impl ShardCursor {
    pub async fn advance(conn: &mut AsyncPgConnection) -> Result<Shard, CatalogError> {
        use common::persistence::schema::shard_cursor::dsl::*;

        let next = diesel::update(shard_cursor.filter(id.eq(1)))
            .set(last_shard.eq(diesel::dsl::sql::<Integer>("(last_shard % 7) + 1")))
            .returning(last_shard)
            .get_result::<i32>(conn)
            .await?;
        Shard::new(next as u8)
            .ok_or_else(|| CatalogError::UnknownPartitionName(format!("shard {next}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_wraps_after_seven() {
        let mut last = 0;
        let seen: Vec<i32> = (0..9)
            .map(|_| {
                last = next_shard(last);
                last
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7, 1, 2]);
    }

    #[test]
    fn round_robin_fairness() {
        let mut last = 3;
        let mut assignments = [0usize; SHARD_COUNT];
        let n = 100;
        for _ in 0..n {
            last = next_shard(last);
            assignments[(last - 1) as usize] += 1;
        }
        let floor = n / SHARD_COUNT;
        for count in assignments {
            assert!(count == floor || count == floor + 1);
        }
    }
}
