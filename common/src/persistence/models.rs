use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Double, Integer, Nullable, Text, Timestamp};
use serde::{Deserialize, Serialize};

/// One row of any lot partition table. All twelve lot partitions share this
/// column set, which is what makes the cross-table move an exhaustive copy.
#[derive(QueryableByName, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub external_lot_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub vin: Option<String>,
    #[diesel(sql_type = Text)]
    pub source_slug: String,
    #[diesel(sql_type = Text)]
    pub vehicle_type_slug: String,
    #[diesel(sql_type = Text)]
    pub make_slug: String,
    #[diesel(sql_type = Text)]
    pub model_slug: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub series_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub color_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub status_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub seller_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub fuel_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub transmission_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub drive_slug: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub engine_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub engine_cylinders: Option<String>,
    #[diesel(sql_type = Nullable<Double>)]
    pub engine_size: Option<f64>,
    #[diesel(sql_type = Integer)]
    pub year: i32,
    #[diesel(sql_type = Double)]
    pub odometer: f64,
    #[diesel(sql_type = Double)]
    pub price: f64,
    #[diesel(sql_type = Double)]
    pub bid: f64,
    #[diesel(sql_type = Nullable<Double>)]
    pub reserve_price: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub buy_now_price: Option<f64>,
    #[diesel(sql_type = Integer)]
    pub risk_index: i32,
    #[diesel(sql_type = Nullable<Timestamp>)]
    pub auction_date: Option<chrono::NaiveDateTime>,
    #[diesel(sql_type = Nullable<Text>)]
    pub thumbnail_url: Option<String>,
    #[diesel(sql_type = Bool)]
    pub is_historical: bool,
    #[diesel(sql_type = Timestamp)]
    pub created_at: chrono::NaiveDateTime,
    #[diesel(sql_type = Timestamp)]
    pub updated_at: chrono::NaiveDateTime,
}

/// Incoming lot payload, before an id has been reserved. Dimension values are
/// raw names as delivered by the source feed; normalization into slugs happens
/// in the reference resolver.
#[derive(Debug, Clone, Default)]
pub struct IncomingLot {
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
    pub auction_date: Option<chrono::NaiveDateTime>,
    pub thumbnail_url: Option<String>,
    pub images: Vec<NewLotImage>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::persistence::schema::reference_entity)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReferenceEntity {
    pub id: i32,
    pub kind: String,
    pub slug: String,
    pub name: String,
    pub parent_slug: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::persistence::schema::reference_entity)]
pub struct NewReferenceEntity {
    pub kind: String,
    pub slug: String,
    pub name: String,
    pub parent_slug: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::persistence::schema::translation)]
pub struct NewTranslation {
    pub field: String,
    pub slug: String,
    pub language: String,
    pub label: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::persistence::schema::lot_locator)]
pub struct NewLotLocator {
    pub lot_id: i64,
    pub partition: String,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::persistence::schema::lot_image)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LotImage {
    pub id: i32,
    pub lot_id: i64,
    pub thumbnail_url: Option<String>,
    pub standard_url: Option<String>,
    pub sequence_number: i32,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::persistence::schema::lot_image)]
pub struct NewLotImage {
    pub lot_id: i64,
    pub thumbnail_url: Option<String>,
    pub standard_url: Option<String>,
    pub sequence_number: i32,
}

#[derive(Insertable, Queryable, Debug, Clone)]
#[diesel(table_name = crate::persistence::schema::external_ref)]
pub struct ExternalRef {
    pub source_slug: String,
    pub external_lot_id: String,
    pub lot_id: i64,
}

/// Write-mostly audit mirror, upserted whenever a lot migrates into a
/// historical partition.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::persistence::schema::history_addon)]
pub struct NewHistoryAddon {
    pub lot_id: i64,
    pub vin: Option<String>,
    pub make_slug: Option<String>,
    pub model_slug: Option<String>,
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub auction_date: Option<chrono::NaiveDateTime>,
    pub source_slug: Option<String>,
}

impl From<&LotRow> for NewHistoryAddon {
    fn from(lot: &LotRow) -> Self {
        Self {
            lot_id: lot.id,
            vin: lot.vin.clone(),
            make_slug: Some(lot.make_slug.clone()),
            model_slug: Some(lot.model_slug.clone()),
            year: Some(lot.year),
            price: Some(lot.price),
            auction_date: lot.auction_date,
            source_slug: Some(lot.source_slug.clone()),
        }
    }
}
