use crate::domain::{CatalogResponse, CountResponse};
use crate::error::{ApiError, ErrorResponse};
use axum::Json;
use axum::extract::{Query, State};
use catalog::error::CatalogError;
use catalog::query::criteria::{FilterCriteria, Sort, SortDir, SortField};
use catalog::query::scatter::ShardedCount;
use catalog::service::{CatalogScope, CatalogService, QuerySignature, TotalsSignature};
use common::cache::CacheKey;
use common::config::CONFIG;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CatalogParams {
    /// One of `active`, `historical`, `other-vehicle`, `other-vehicle-historical`.
    pub scope: Option<String>,
    pub language: Option<String>,
    /// One of `auction_date`, `price`, `bid`, `year`, `odometer`, `risk_index`, `created_at`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub dir: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,

    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub odometer_min: Option<f64>,
    pub odometer_max: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub bid_min: Option<f64>,
    pub bid_max: Option<f64>,
    pub risk_min: Option<i32>,
    pub risk_max: Option<i32>,
    #[param(value_type = Option<String>, example = "2025-10-13T15:30:00")]
    pub auction_date_from: Option<chrono::NaiveDateTime>,
    #[param(value_type = Option<String>, example = "2025-10-13T15:30:00")]
    pub auction_date_to: Option<chrono::NaiveDateTime>,
    pub buy_now_only: Option<bool>,
    pub engine_size_min: Option<f64>,
    pub engine_size_max: Option<f64>,

    /// Comma-separated slug lists.
    pub makes: Option<String>,
    pub models: Option<String>,
    pub series: Option<String>,
    pub colors: Option<String>,
    pub statuses: Option<String>,
    pub vehicle_types: Option<String>,
    pub sellers: Option<String>,
    pub sources: Option<String>,
    pub fuels: Option<String>,
    pub transmissions: Option<String>,
    pub drives: Option<String>,
    pub engine_names: Option<String>,
    pub engine_cylinders: Option<String>,
}

impl CatalogParams {
    fn signature(self) -> Result<QuerySignature, ApiError> {
        let scope = parse_scope(self.scope.as_deref())?;
        let sort = Sort {
            field: parse_sort(self.sort.as_deref())?,
            dir: parse_dir(self.dir.as_deref())?,
        };
        let language = self
            .language
            .clone()
            .or_else(|| CONFIG.catalog.languages.first().cloned())
            .unwrap_or_else(|| "en".to_string());
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);

        Ok(QuerySignature {
            scope,
            language,
            criteria: self.criteria(),
            sort,
            limit,
            offset,
        })
    }

    fn criteria(self) -> FilterCriteria {
        FilterCriteria {
            year_min: self.year_min,
            year_max: self.year_max,
            odometer_min: self.odometer_min,
            odometer_max: self.odometer_max,
            price_min: self.price_min,
            price_max: self.price_max,
            bid_min: self.bid_min,
            bid_max: self.bid_max,
            risk_min: self.risk_min,
            risk_max: self.risk_max,
            auction_date_from: self.auction_date_from,
            auction_date_to: self.auction_date_to,
            buy_now_only: self.buy_now_only,
            engine_size_min: self.engine_size_min,
            engine_size_max: self.engine_size_max,
            makes: split_list(self.makes),
            models: split_list(self.models),
            series: split_list(self.series),
            colors: split_list(self.colors),
            statuses: split_list(self.statuses),
            vehicle_types: split_list(self.vehicle_types),
            sellers: split_list(self.sellers),
            sources: split_list(self.sources),
            fuels: split_list(self.fuels),
            transmissions: split_list(self.transmissions),
            drives: split_list(self.drives),
            engine_names: split_list(self.engine_names),
            engine_cylinders: split_list(self.engine_cylinders),
        }
    }
}

fn split_list(value: Option<String>) -> Option<Vec<String>> {
    let value = value?;
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() { None } else { Some(items) }
}

fn parse_scope(value: Option<&str>) -> Result<CatalogScope, ApiError> {
    match value.unwrap_or("active") {
        "active" => Ok(CatalogScope::Active),
        "historical" => Ok(CatalogScope::Historical),
        "other-vehicle" => Ok(CatalogScope::OtherVehicle),
        "other-vehicle-historical" => Ok(CatalogScope::OtherVehicleHistorical),
        other => Err(CatalogError::InvalidCriteria(format!("unknown scope: `{other}`")).into()),
    }
}

fn parse_sort(value: Option<&str>) -> Result<SortField, ApiError> {
    match value.unwrap_or("auction_date") {
        "auction_date" => Ok(SortField::AuctionDate),
        "price" => Ok(SortField::Price),
        "bid" => Ok(SortField::Bid),
        "year" => Ok(SortField::Year),
        "odometer" => Ok(SortField::Odometer),
        "risk_index" => Ok(SortField::RiskIndex),
        "created_at" => Ok(SortField::CreatedAt),
        other => {
            Err(CatalogError::InvalidCriteria(format!("unknown sort field: `{other}`")).into())
        }
    }
}

fn parse_dir(value: Option<&str>) -> Result<SortDir, ApiError> {
    match value.unwrap_or("asc") {
        "asc" => Ok(SortDir::Asc),
        "desc" => Ok(SortDir::Desc),
        other => {
            Err(CatalogError::InvalidCriteria(format!("unknown sort direction: `{other}`")).into())
        }
    }
}

#[utoipa::path(
    get,
    path = "/catalog",
    tag = "catalog",
    params(CatalogParams),
    responses(
        (status = 200, description = "Returns one catalog page with facet statistics", body = CatalogResponse),
        (status = 400, description = "Returns an error for malformed criteria", body = ErrorResponse)
    )
)]
pub async fn page(
    State(service): State<Arc<CatalogService>>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let signature = params.signature()?;
    let page = service.get_catalog_page(&signature).await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/catalog/count",
    tag = "catalog",
    params(CatalogParams),
    responses(
        (status = 200, description = "Returns the filtered lot count", body = CountResponse)
    )
)]
pub async fn count(
    State(service): State<Arc<CatalogService>>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CountResponse>, ApiError> {
    let scope = parse_scope(params.scope.as_deref())?;
    let criteria = params.criteria();
    criteria.validate()?;
    let count = service.count_lots(scope, &criteria).await;
    Ok(Json(CountResponse {
        total: count.total,
        degraded: count.degraded,
    }))
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TotalParams {
    pub scope: Option<String>,
    pub source: Option<String>,
}

/// Served from the warmed totals cache when possible; a cold miss falls back
/// to a live count.
#[utoipa::path(
    get,
    path = "/catalog/total",
    tag = "catalog",
    params(TotalParams),
    responses(
        (status = 200, description = "Returns the coarse lot total", body = CountResponse)
    )
)]
pub async fn total(
    State(service): State<Arc<CatalogService>>,
    Query(params): Query<TotalParams>,
) -> Result<Json<CountResponse>, ApiError> {
    let scope = parse_scope(params.scope.as_deref())?;
    let signature = TotalsSignature {
        scope,
        source: params.source,
    };

    let key = CacheKey::from_signature(&signature);
    let count = match service.cache().get_json::<ShardedCount>(&key).await {
        Some(count) => count,
        None => {
            let mut criteria = FilterCriteria::default();
            if let Some(source) = &signature.source {
                criteria.sources = Some(vec![source.clone()]);
            }
            let count = service.count_lots(scope, &criteria).await;
            service.cache().set_json(key, &count).await;
            count
        }
    };
    Ok(Json(CountResponse {
        total: count.total,
        degraded: count.degraded,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_split_on_commas() {
        assert_eq!(
            split_list(Some("bmw, audi ,,vw".to_string())),
            Some(vec!["bmw".to_string(), "audi".to_string(), "vw".to_string()])
        );
        assert_eq!(split_list(Some("  ".to_string())), None);
        assert_eq!(split_list(None), None);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        assert!(parse_scope(Some("archived")).is_err());
        assert!(matches!(
            parse_scope(None),
            Ok(CatalogScope::Active)
        ));
    }
}
