use crate::error::CatalogError;
use crate::partition::Partition;
use crate::query::criteria::{FacetField, FilterCriteria, RangeField, Sort};
use crate::query::scatter::PartitionReader;
use crate::query::sql::{
    self, CountRow, FacetRow, MinMaxRow, bind_criteria,
};
use async_trait::async_trait;
use common::persistence::PgPool;
use common::persistence::models::LotRow;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

/// Postgres-backed partition reader. Every operation addresses one physical
/// table by name; filters ride on the fixed bind signature from `query::sql`.
#[derive(Clone)]
pub struct PgPartitionReader {
    pool: PgPool,
}

impl PgPartitionReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartitionReader for PgPartitionReader {
    async fn count(
        &self,
        partition: Partition,
        criteria: &FilterCriteria,
    ) -> Result<i64, CatalogError> {
        let mut conn = self.pool.get().await?;
        let query = diesel::sql_query(sql::count_sql(partition.table_name()));
        let row: CountRow = bind_criteria!(query, criteria).get_result(&mut conn).await?;
        Ok(row.count)
    }

    async fn fetch(
        &self,
        partition: Partition,
        criteria: &FilterCriteria,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LotRow>, CatalogError> {
        let mut conn = self.pool.get().await?;
        let query = diesel::sql_query(sql::page_sql(partition.table_name(), sort));
        let rows = bind_criteria!(query, criteria)
            .bind::<BigInt, _>(limit)
            .bind::<BigInt, _>(offset)
            .load::<LotRow>(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn min_max(
        &self,
        partition: Partition,
        field: RangeField,
        criteria: &FilterCriteria,
    ) -> Result<Option<(f64, f64)>, CatalogError> {
        let mut conn = self.pool.get().await?;
        let query = diesel::sql_query(sql::min_max_sql(partition.table_name(), field.column()));
        let row: MinMaxRow = bind_criteria!(query, criteria).get_result(&mut conn).await?;
        Ok(match (row.min, row.max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        })
    }

    async fn facet_counts(
        &self,
        partition: Partition,
        facet: FacetField,
        criteria: &FilterCriteria,
    ) -> Result<Vec<(String, i64)>, CatalogError> {
        let mut conn = self.pool.get().await?;
        let query = diesel::sql_query(sql::facet_sql(partition.table_name(), facet));
        let rows = bind_criteria!(query, criteria)
            .load::<FacetRow>(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.value.map(|value| (value, row.count)))
            .collect())
    }
}
