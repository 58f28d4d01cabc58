use utoipa::OpenApi;

pub mod domain;
pub mod error;
pub mod routes;

#[derive(OpenApi)]
#[openapi(paths(
    crate::routes::catalog::page,
    crate::routes::catalog::count,
    crate::routes::catalog::total,
    crate::routes::lot::by_id,
    crate::routes::lot::ingest,
    crate::routes::lot::move_historical,
    crate::routes::lot::delete,
))]
pub struct Docs;
