use crate::partition::Partition;
use diesel_async::pooled_connection::deadpool::PoolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("id `{0}` does not decode to any known partition")]
    UnknownPartition(i64),
    #[error("unknown partition name: `{0}`")]
    UnknownPartitionName(String),
    #[error("pg pool error: `{0}`")]
    PgPool(#[from] PoolError),
    #[error("diesel error: `{0}`")]
    Diesel(#[from] diesel::result::Error),
    #[error("shard query timed out after {0:?}")]
    ShardTimeout(std::time::Duration),
    #[error("catalog request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),
    #[error("invalid filter criteria: {0}")]
    InvalidCriteria(String),
    #[error(transparent)]
    Move(#[from] MoveError),
}

/// Failures of the transactional cross-partition move. All of them roll the
/// whole transaction back; none leave a partially moved record behind.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("lot `{0}` not found in any partition")]
    NotFound(i64),
    #[error("lot `{id}` already present in `{target}`")]
    DuplicateId { id: i64, target: &'static str },
    #[error("lot `{id}` already moved to `{target}`")]
    AlreadyMoved { id: i64, target: &'static str },
    #[error("lot `{id}` cannot move from `{from}` to `{to}`")]
    IllegalTransition {
        id: i64,
        from: Partition,
        to: Partition,
    },
    #[error("pg pool error: `{0}`")]
    PgPool(#[from] PoolError),
    #[error("diesel error: `{0}`")]
    Diesel(#[from] diesel::result::Error),
    #[error("locator row for `{id}` names unknown partition `{name}`")]
    CorruptLocator { id: i64, name: String },
}
