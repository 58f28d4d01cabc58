use crate::error::CatalogError;
use serde::{Deserialize, Serialize};

/// Upper bound on one list filter's length; beyond this the request is
/// rejected as structurally invalid rather than handed to the database.
pub const MAX_LIST_ITEMS: usize = 10_000;

/// Compound filter over the lot tables. Every dimension is optional; `None`
/// means "no constraint". List dimensions hold normalized slugs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
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
    pub auction_date_from: Option<chrono::NaiveDateTime>,
    pub auction_date_to: Option<chrono::NaiveDateTime>,
    pub buy_now_only: Option<bool>,
    pub engine_size_min: Option<f64>,
    pub engine_size_max: Option<f64>,
    pub makes: Option<Vec<String>>,
    pub models: Option<Vec<String>>,
    pub series: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub statuses: Option<Vec<String>>,
    pub vehicle_types: Option<Vec<String>>,
    pub sellers: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub fuels: Option<Vec<String>>,
    pub transmissions: Option<Vec<String>>,
    pub drives: Option<Vec<String>>,
    pub engine_names: Option<Vec<String>>,
    pub engine_cylinders: Option<Vec<String>>,
}

impl FilterCriteria {
    pub fn validate(&self) -> Result<(), CatalogError> {
        let lists: [(&str, Option<&Vec<String>>); 13] = [
            ("makes", self.makes.as_ref()),
            ("models", self.models.as_ref()),
            ("series", self.series.as_ref()),
            ("colors", self.colors.as_ref()),
            ("statuses", self.statuses.as_ref()),
            ("vehicle_types", self.vehicle_types.as_ref()),
            ("sellers", self.sellers.as_ref()),
            ("sources", self.sources.as_ref()),
            ("fuels", self.fuels.as_ref()),
            ("transmissions", self.transmissions.as_ref()),
            ("drives", self.drives.as_ref()),
            ("engine_names", self.engine_names.as_ref()),
            ("engine_cylinders", self.engine_cylinders.as_ref()),
        ];
        for (name, list) in lists {
            if let Some(list) = list {
                if list.len() > MAX_LIST_ITEMS {
                    return Err(CatalogError::InvalidCriteria(format!(
                        "too many values for `{name}`: {}",
                        list.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Facet dimensions the statistics engine aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetField {
    Make,
    Model,
    Series,
    Color,
    Status,
    VehicleType,
    Seller,
    Source,
    Fuel,
    Transmission,
    Drive,
    Year,
    EngineSize,
    EngineCylinders,
    RiskBucket,
}

impl FacetField {
    pub const ALL: [FacetField; 15] = [
        FacetField::Make,
        FacetField::Model,
        FacetField::Series,
        FacetField::Color,
        FacetField::Status,
        FacetField::VehicleType,
        FacetField::Seller,
        FacetField::Source,
        FacetField::Fuel,
        FacetField::Transmission,
        FacetField::Drive,
        FacetField::Year,
        FacetField::EngineSize,
        FacetField::EngineCylinders,
        FacetField::RiskBucket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetField::Make => "make",
            FacetField::Model => "model",
            FacetField::Series => "series",
            FacetField::Color => "color",
            FacetField::Status => "status",
            FacetField::VehicleType => "vehicle_type",
            FacetField::Seller => "seller",
            FacetField::Source => "source",
            FacetField::Fuel => "fuel",
            FacetField::Transmission => "transmission",
            FacetField::Drive => "drive",
            FacetField::Year => "year",
            FacetField::EngineSize => "engine_size",
            FacetField::EngineCylinders => "engine_cylinders",
            FacetField::RiskBucket => "risk_index",
        }
    }
}

/// Columns the executor can take a min/max over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeField {
    Odometer,
    Price,
    Year,
}

impl RangeField {
    pub fn column(&self) -> &'static str {
        match self {
            RangeField::Odometer => "odometer",
            RangeField::Price => "price",
            RangeField::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    AuctionDate,
    Price,
    Bid,
    Year,
    Odometer,
    RiskIndex,
    CreatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::AuctionDate => "auction_date",
            SortField::Price => "price",
            SortField::Bid => "bid",
            SortField::Year => "year",
            SortField::Odometer => "odometer",
            SortField::RiskIndex => "risk_index",
            SortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub dir: SortDir,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::AuctionDate,
            dir: SortDir::Asc,
        }
    }
}

impl Sort {
    /// Deterministic order: requested column first, id as the tiebreak so
    /// pagination never duplicates or drops rows between pages.
    pub fn to_sql(&self) -> String {
        let dir = match self.dir {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };
        format!("{} {dir} NULLS LAST, id ASC", self.field.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_list_filter_is_rejected() {
        let mut criteria = FilterCriteria::default();
        criteria.makes = Some(vec!["bmw".to_string(); MAX_LIST_ITEMS]);
        assert!(criteria.validate().is_ok());

        criteria.makes = Some(vec!["bmw".to_string(); MAX_LIST_ITEMS + 1]);
        assert!(matches!(
            criteria.validate(),
            Err(CatalogError::InvalidCriteria(_))
        ));
    }
}
