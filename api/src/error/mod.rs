use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::error::{CatalogError, MoveError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("lot not found: `{0}`")]
    LotNotFound(i64),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    JsonRejection(#[from] axum::extract::rejection::JsonRejection),
}

impl From<MoveError> for ApiError {
    fn from(value: MoveError) -> Self {
        Self::Catalog(CatalogError::Move(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::LotNotFound(id) => (StatusCode::NOT_FOUND, format!("lot not found: `{id}`")),
            Self::Catalog(CatalogError::UnknownPartition(id)) => (
                StatusCode::BAD_REQUEST,
                format!("id does not belong to any partition: `{id}`"),
            ),
            Self::Catalog(CatalogError::InvalidCriteria(reason)) => {
                (StatusCode::BAD_REQUEST, reason)
            }
            Self::JsonRejection(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::Catalog(CatalogError::Move(MoveError::NotFound(id))) => {
                (StatusCode::NOT_FOUND, format!("lot not found: `{id}`"))
            }
            Self::Catalog(CatalogError::Move(
                e @ (MoveError::AlreadyMoved { .. }
                | MoveError::DuplicateId { .. }
                | MoveError::IllegalTransition { .. }),
            )) => (StatusCode::CONFLICT, e.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong".to_string(),
            ),
        };

        (status, ApiJson(ErrorResponse { message })).into_response()
    }
}

#[derive(Serialize, ToSchema)]
pub(crate) struct ErrorResponse {
    message: String,
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

impl<T> IntoResponse for ApiJson<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}
