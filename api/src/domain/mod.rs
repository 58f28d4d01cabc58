use catalog::query::facets::{FacetStats, FacetValue, MinMax};
use catalog::service::{CatalogPage, LotDetail};
use common::persistence::models::{IncomingLot, NewLotImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: i64,
    pub external_lot_id: String,
    pub vin: Option<String>,
    pub source: String,
    pub vehicle_type: String,
    pub make: String,
    pub model: String,
    pub series: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub seller: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub drive: Option<String>,
    pub engine_name: Option<String>,
    pub engine_cylinders: Option<String>,
    pub engine_size: Option<f64>,
    pub year: i32,
    pub odometer: f64,
    pub price: f64,
    pub bid: f64,
    pub reserve_price: Option<f64>,
    pub buy_now_price: Option<f64>,
    pub risk_index: i32,
    #[schema(value_type = Option<String>, example = "2025-10-13T15:30:00")]
    pub auction_date: Option<chrono::NaiveDateTime>,
    pub thumbnail_url: Option<String>,
    pub is_historical: bool,
}

impl From<common::persistence::models::LotRow> for Lot {
    fn from(value: common::persistence::models::LotRow) -> Self {
        Self {
            id: value.id,
            external_lot_id: value.external_lot_id,
            vin: value.vin,
            source: value.source_slug,
            vehicle_type: value.vehicle_type_slug,
            make: value.make_slug,
            model: value.model_slug,
            series: value.series_slug,
            color: value.color_slug,
            status: value.status_slug,
            seller: value.seller_slug,
            fuel: value.fuel_slug,
            transmission: value.transmission_slug,
            drive: value.drive_slug,
            engine_name: value.engine_name,
            engine_cylinders: value.engine_cylinders,
            engine_size: value.engine_size,
            year: value.year,
            odometer: value.odometer,
            price: value.price,
            bid: value.bid,
            reserve_price: value.reserve_price,
            buy_now_price: value.buy_now_price,
            risk_index: value.risk_index,
            auction_date: value.auction_date,
            thumbnail_url: value.thumbnail_url,
            is_historical: value.is_historical,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LotImage {
    pub thumbnail_url: Option<String>,
    pub standard_url: Option<String>,
    pub sequence_number: i32,
}

impl From<common::persistence::models::LotImage> for LotImage {
    fn from(value: common::persistence::models::LotImage) -> Self {
        Self {
            thumbnail_url: value.thumbnail_url,
            standard_url: value.standard_url,
            sequence_number: value.sequence_number,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LotWithImages {
    #[serde(flatten)]
    pub lot: Lot,
    pub images: Vec<LotImage>,
}

impl From<LotDetail> for LotWithImages {
    fn from(value: LotDetail) -> Self {
        Self {
            lot: value.lot.into(),
            images: value.images.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FacetEntry {
    pub value: String,
    pub count: i64,
    pub label: String,
}

impl From<FacetValue> for FacetEntry {
    fn from(value: FacetValue) -> Self {
        Self {
            value: value.value,
            count: value.count,
            label: value.label,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl From<MinMax> for Range {
    fn from(value: MinMax) -> Self {
        Self {
            min: value.min,
            max: value.max,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    pub fields: BTreeMap<String, Vec<FacetEntry>>,
    pub odometer: Option<Range>,
}

impl From<FacetStats> for Facets {
    fn from(value: FacetStats) -> Self {
        Self {
            fields: value
                .fields
                .into_iter()
                .map(|(field, values)| (field, values.into_iter().map(Into::into).collect()))
                .collect(),
            odometer: value.odometer.map(Into::into),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub lots: Vec<Lot>,
    pub total: i64,
    /// At least one shard failed or timed out; the page and total are
    /// best-effort.
    pub degraded: bool,
    pub facets: Facets,
}

impl From<CatalogPage> for CatalogResponse {
    fn from(value: CatalogPage) -> Self {
        Self {
            lots: value.lots.into_iter().map(Into::into).collect(),
            total: value.total.total,
            degraded: value.total.degraded,
            facets: value.facets.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub total: i64,
    pub degraded: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestImage {
    pub thumbnail_url: Option<String>,
    pub standard_url: Option<String>,
    pub sequence_number: i32,
}

/// Raw feed payload; dimension values are source-native names, not slugs.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestLot {
    pub external_lot_id: String,
    pub vin: Option<String>,
    pub source: String,
    pub vehicle_type: String,
    pub make: String,
    pub model: String,
    pub series: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub seller: Option<String>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub drive: Option<String>,
    pub engine_name: Option<String>,
    pub engine_cylinders: Option<String>,
    pub engine_size: Option<f64>,
    pub year: i32,
    pub odometer: f64,
    pub price: f64,
    pub bid: f64,
    pub reserve_price: Option<f64>,
    pub buy_now_price: Option<f64>,
    pub risk_index: i32,
    #[schema(value_type = Option<String>, example = "2025-10-13T15:30:00")]
    pub auction_date: Option<chrono::NaiveDateTime>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub images: Vec<IngestImage>,
}

impl From<IngestLot> for IncomingLot {
    fn from(value: IngestLot) -> Self {
        Self {
            external_lot_id: value.external_lot_id,
            vin: value.vin,
            source: value.source,
            vehicle_type: value.vehicle_type,
            make: value.make,
            model: value.model,
            series: value.series,
            color: value.color,
            status: value.status,
            seller: value.seller,
            fuel: value.fuel,
            transmission: value.transmission,
            drive: value.drive,
            engine_name: value.engine_name,
            engine_cylinders: value.engine_cylinders,
            engine_size: value.engine_size,
            year: value.year,
            odometer: value.odometer,
            price: value.price,
            bid: value.bid,
            reserve_price: value.reserve_price,
            buy_now_price: value.buy_now_price,
            risk_index: value.risk_index,
            auction_date: value.auction_date,
            thumbnail_url: value.thumbnail_url,
            images: value
                .images
                .into_iter()
                .map(|image| NewLotImage {
                    lot_id: 0,
                    thumbnail_url: image.thumbnail_url,
                    standard_url: image.standard_url,
                    sequence_number: image.sequence_number,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub lot_id: i64,
}
