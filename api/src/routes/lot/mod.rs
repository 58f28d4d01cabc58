use crate::domain::{IngestLot, IngestResponse, Lot, LotWithImages};
use crate::error::{ApiError, ErrorResponse};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use catalog::service::CatalogService;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/lot/{id}",
    tag = "lots",
    params(
        ("id" = i64, Path, description = "The partition-prefixed lot id")
    ),
    responses(
        (status = 200, description = "Returns a lot with its images", body = LotWithImages),
        (status = 400, description = "Returns an error for an id outside every partition", body = ErrorResponse),
        (status = 404, description = "Returns an error when the lot does not exist", body = ErrorResponse)
    )
)]
pub async fn by_id(
    Path(id): Path<i64>,
    State(service): State<Arc<CatalogService>>,
) -> Result<Json<LotWithImages>, ApiError> {
    let detail = service
        .get_lot_by_id(id)
        .await?
        .ok_or(ApiError::LotNotFound(id))?;
    Ok(Json(detail.into()))
}

#[utoipa::path(
    post,
    path = "/lot",
    tag = "lots",
    request_body = IngestLot,
    responses(
        (status = 200, description = "Returns the id the lot ended up under", body = IngestResponse)
    )
)]
pub async fn ingest(
    State(service): State<Arc<CatalogService>>,
    Json(lot): Json<IngestLot>,
) -> Result<Json<IngestResponse>, ApiError> {
    let lot_id = service.upsert_lot(lot.into()).await?;
    Ok(Json(IngestResponse { lot_id }))
}

#[utoipa::path(
    post,
    path = "/lot/{id}/move-historical",
    tag = "lots",
    params(
        ("id" = i64, Path, description = "The partition-prefixed lot id")
    ),
    responses(
        (status = 200, description = "Returns the lot after the move", body = Lot),
        (status = 404, description = "Returns an error when the lot does not exist", body = ErrorResponse),
        (status = 409, description = "Returns an error when the move is not allowed", body = ErrorResponse)
    )
)]
pub async fn move_historical(
    Path(id): Path<i64>,
    State(service): State<Arc<CatalogService>>,
) -> Result<Json<Lot>, ApiError> {
    let lot = service.move_lot_to_historical(id).await?;
    Ok(Json(lot.into()))
}

#[utoipa::path(
    delete,
    path = "/lot/{id}",
    tag = "lots",
    params(
        ("id" = i64, Path, description = "The partition-prefixed lot id")
    ),
    responses(
        (status = 204, description = "The lot and its satellite rows are gone"),
        (status = 400, description = "Returns an error for an id outside every partition", body = ErrorResponse)
    )
)]
pub async fn delete(
    Path(id): Path<i64>,
    State(service): State<Arc<CatalogService>>,
) -> Result<StatusCode, ApiError> {
    service.delete_lot(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
