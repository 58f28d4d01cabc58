use crate::query::criteria::{FacetField, Sort};
use diesel::sql_types::{BigInt, Nullable, Text};

/// The full lot column list, in table order. Every partition table carries
/// exactly these columns; inserts, reads and cross-partition moves all go
/// through this one list so the copy step is exhaustive by construction.
pub const LOT_COLUMNS: &str = "id, external_lot_id, vin, source_slug, vehicle_type_slug, \
     make_slug, model_slug, series_slug, color_slug, status_slug, seller_slug, fuel_slug, \
     transmission_slug, drive_slug, engine_name, engine_cylinders, engine_size, year, odometer, \
     price, bid, reserve_price, buy_now_price, risk_index, auction_date, thumbnail_url, \
     is_historical, created_at, updated_at";

/// Number of filter bind slots. The `WHERE` clause always references every
/// slot in null-tolerant form, so the bind signature is constant no matter
/// which filters are present.
pub const FILTER_SLOTS: usize = 28;

enum Slot {
    /// `col >= $n` / `col <= $n` range bound.
    Range {
        cast: &'static str,
        col: &'static str,
        op: &'static str,
    },
    /// Buy-now flag: when bound true, require a buy-now price.
    BuyNow,
    /// Slug/text list bound as one Postgres array.
    List { col: &'static str },
}

const SLOTS: [Slot; FILTER_SLOTS] = [
    Slot::Range { cast: "int4", col: "year", op: ">=" },
    Slot::Range { cast: "int4", col: "year", op: "<=" },
    Slot::Range { cast: "float8", col: "odometer", op: ">=" },
    Slot::Range { cast: "float8", col: "odometer", op: "<=" },
    Slot::Range { cast: "float8", col: "price", op: ">=" },
    Slot::Range { cast: "float8", col: "price", op: "<=" },
    Slot::Range { cast: "float8", col: "bid", op: ">=" },
    Slot::Range { cast: "float8", col: "bid", op: "<=" },
    Slot::Range { cast: "int4", col: "risk_index", op: ">=" },
    Slot::Range { cast: "int4", col: "risk_index", op: "<=" },
    Slot::Range { cast: "timestamp", col: "auction_date", op: ">=" },
    Slot::Range { cast: "timestamp", col: "auction_date", op: "<=" },
    Slot::BuyNow,
    Slot::Range { cast: "float8", col: "engine_size", op: ">=" },
    Slot::Range { cast: "float8", col: "engine_size", op: "<=" },
    Slot::List { col: "make_slug" },
    Slot::List { col: "model_slug" },
    Slot::List { col: "series_slug" },
    Slot::List { col: "color_slug" },
    Slot::List { col: "status_slug" },
    Slot::List { col: "vehicle_type_slug" },
    Slot::List { col: "seller_slug" },
    Slot::List { col: "source_slug" },
    Slot::List { col: "fuel_slug" },
    Slot::List { col: "transmission_slug" },
    Slot::List { col: "drive_slug" },
    Slot::List { col: "engine_name" },
    Slot::List { col: "engine_cylinders" },
];

/// Bind slots (1-based) a facet must neutralize so its own filter does not
/// hide the alternatives it is meant to surface.
fn excluded_slots(facet: FacetField) -> &'static [usize] {
    match facet {
        FacetField::Year => &[1, 2],
        FacetField::RiskBucket => &[9, 10],
        FacetField::EngineSize => &[14, 15],
        FacetField::Make => &[16],
        FacetField::Model => &[17],
        FacetField::Series => &[18],
        FacetField::Color => &[19],
        FacetField::Status => &[20],
        FacetField::VehicleType => &[21],
        FacetField::Seller => &[22],
        FacetField::Source => &[23],
        FacetField::Fuel => &[24],
        FacetField::Transmission => &[25],
        FacetField::Drive => &[26],
        FacetField::EngineCylinders => &[28],
    }
}

fn slot_cast(slot: &Slot) -> &'static str {
    match slot {
        Slot::Range { cast, .. } => cast,
        Slot::BuyNow => "bool",
        Slot::List { .. } => "text[]",
    }
}

fn slot_predicate(slot: &Slot, n: usize) -> String {
    match slot {
        Slot::Range { cast, col, op } => {
            format!("(${n}::{cast} IS NULL OR {col} {op} ${n})")
        }
        Slot::BuyNow => {
            format!("(${n}::bool IS NULL OR ${n} = FALSE OR buy_now_price IS NOT NULL)")
        }
        Slot::List { col } => {
            format!("(${n}::text[] IS NULL OR {col} = ANY(${n}))")
        }
    }
}

/// Fixed-slot `WHERE` clause. With `exclude` set, that facet's own slots stay
/// referenced (the bind signature must not change) but constrain nothing.
pub fn where_clause(exclude: Option<FacetField>) -> String {
    let excluded: &[usize] = exclude.map(excluded_slots).unwrap_or(&[]);
    SLOTS
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let n = i + 1;
            if excluded.contains(&n) {
                format!("(${n}::{} IS NULL OR TRUE)", slot_cast(slot))
            } else {
                slot_predicate(slot, n)
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn count_sql(table: &str) -> String {
    format!(
        "SELECT COUNT(*) AS count FROM {table} WHERE {}",
        where_clause(None)
    )
}

pub fn page_sql(table: &str, sort: Sort) -> String {
    format!(
        "SELECT {LOT_COLUMNS} FROM {table} WHERE {} ORDER BY {} LIMIT ${limit} OFFSET ${offset}",
        where_clause(None),
        sort.to_sql(),
        limit = FILTER_SLOTS + 1,
        offset = FILTER_SLOTS + 2,
    )
}

pub fn min_max_sql(table: &str, column: &str) -> String {
    format!(
        "SELECT MIN({column})::float8 AS min, MAX({column})::float8 AS max \
         FROM {table} WHERE {}",
        where_clause(None)
    )
}

/// Grouping expression per facet; always yields text so one row shape covers
/// slug, numeric and bucketed facets.
pub fn facet_value_expr(facet: FacetField) -> &'static str {
    match facet {
        FacetField::Make => "make_slug",
        FacetField::Model => "model_slug",
        FacetField::Series => "series_slug",
        FacetField::Color => "color_slug",
        FacetField::Status => "status_slug",
        FacetField::VehicleType => "vehicle_type_slug",
        FacetField::Seller => "seller_slug",
        FacetField::Source => "source_slug",
        FacetField::Fuel => "fuel_slug",
        FacetField::Transmission => "transmission_slug",
        FacetField::Drive => "drive_slug",
        FacetField::Year => "year::text",
        FacetField::EngineSize => "engine_size::text",
        FacetField::EngineCylinders => "engine_cylinders",
        FacetField::RiskBucket => {
            "CASE WHEN risk_index < 50 THEN 'low' \
                  WHEN risk_index < 75 THEN 'medium' \
                  ELSE 'high' END"
        }
    }
}

pub fn facet_sql(table: &str, facet: FacetField) -> String {
    format!(
        "SELECT {} AS value, COUNT(*) AS count FROM {table} WHERE {} GROUP BY 1",
        facet_value_expr(facet),
        where_clause(Some(facet)),
    )
}

pub fn select_by_id_sql(table: &str) -> String {
    format!("SELECT {LOT_COLUMNS} FROM {table} WHERE id = $1")
}

pub fn delete_by_id_sql(table: &str) -> String {
    format!("DELETE FROM {table} WHERE id = $1")
}

/// Cross-partition copy. The column list is the one fixed mapping; only the
/// historical flag is overridden to match the destination.
pub fn move_insert_sql(source: &str, target: &str) -> String {
    let select_cols = LOT_COLUMNS.replace("is_historical", "$2::bool");
    format!(
        "INSERT INTO {target} ({LOT_COLUMNS}) \
         SELECT {select_cols} FROM {source} WHERE id = $1"
    )
}

/// Fresh insert of a classified lot; timestamps default in the table.
pub fn insert_lot_sql(table: &str) -> String {
    let cols = "id, external_lot_id, vin, source_slug, vehicle_type_slug, make_slug, \
         model_slug, series_slug, color_slug, status_slug, seller_slug, fuel_slug, \
         transmission_slug, drive_slug, engine_name, engine_cylinders, engine_size, year, \
         odometer, price, bid, reserve_price, buy_now_price, risk_index, auction_date, \
         thumbnail_url, is_historical";
    let binds = (1..=27)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({cols}) VALUES ({binds})")
}

pub fn update_lot_sql(table: &str) -> String {
    "UPDATE ".to_string()
        + table
        + " SET vin = $2, vehicle_type_slug = $3, make_slug = $4, model_slug = $5, \
           series_slug = $6, color_slug = $7, status_slug = $8, seller_slug = $9, \
           fuel_slug = $10, transmission_slug = $11, drive_slug = $12, engine_name = $13, \
           engine_cylinders = $14, engine_size = $15, year = $16, odometer = $17, price = $18, \
           bid = $19, reserve_price = $20, buy_now_price = $21, risk_index = $22, \
           auction_date = $23, thumbnail_url = $24, updated_at = now() \
           WHERE id = $1"
}

#[derive(diesel::QueryableByName, Debug)]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

#[derive(diesel::QueryableByName, Debug)]
pub struct MinMaxRow {
    #[diesel(sql_type = Nullable<diesel::sql_types::Double>)]
    pub min: Option<f64>,
    #[diesel(sql_type = Nullable<diesel::sql_types::Double>)]
    pub max: Option<f64>,
}

#[derive(diesel::QueryableByName, Debug)]
pub struct FacetRow {
    #[diesel(sql_type = Nullable<Text>)]
    pub value: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Binds every filter slot in canonical order onto a `sql_query`. Must stay
/// in lockstep with `SLOTS`.
macro_rules! bind_criteria {
    ($q:expr, $c:expr) => {{
        use diesel::sql_types::{Array, Bool, Double, Integer, Nullable, Text, Timestamp};
        $q.bind::<Nullable<Integer>, _>($c.year_min)
            .bind::<Nullable<Integer>, _>($c.year_max)
            .bind::<Nullable<Double>, _>($c.odometer_min)
            .bind::<Nullable<Double>, _>($c.odometer_max)
            .bind::<Nullable<Double>, _>($c.price_min)
            .bind::<Nullable<Double>, _>($c.price_max)
            .bind::<Nullable<Double>, _>($c.bid_min)
            .bind::<Nullable<Double>, _>($c.bid_max)
            .bind::<Nullable<Integer>, _>($c.risk_min)
            .bind::<Nullable<Integer>, _>($c.risk_max)
            .bind::<Nullable<Timestamp>, _>($c.auction_date_from)
            .bind::<Nullable<Timestamp>, _>($c.auction_date_to)
            .bind::<Nullable<Bool>, _>($c.buy_now_only)
            .bind::<Nullable<Double>, _>($c.engine_size_min)
            .bind::<Nullable<Double>, _>($c.engine_size_max)
            .bind::<Nullable<Array<Text>>, _>($c.makes.clone())
            .bind::<Nullable<Array<Text>>, _>($c.models.clone())
            .bind::<Nullable<Array<Text>>, _>($c.series.clone())
            .bind::<Nullable<Array<Text>>, _>($c.colors.clone())
            .bind::<Nullable<Array<Text>>, _>($c.statuses.clone())
            .bind::<Nullable<Array<Text>>, _>($c.vehicle_types.clone())
            .bind::<Nullable<Array<Text>>, _>($c.sellers.clone())
            .bind::<Nullable<Array<Text>>, _>($c.sources.clone())
            .bind::<Nullable<Array<Text>>, _>($c.fuels.clone())
            .bind::<Nullable<Array<Text>>, _>($c.transmissions.clone())
            .bind::<Nullable<Array<Text>>, _>($c.drives.clone())
            .bind::<Nullable<Array<Text>>, _>($c.engine_names.clone())
            .bind::<Nullable<Array<Text>>, _>($c.engine_cylinders.clone())
    }};
}

pub(crate) use bind_criteria;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::criteria::{SortDir, SortField};

    #[test]
    fn where_clause_references_every_slot_once() {
        let sql = where_clause(None);
        for n in 1..=FILTER_SLOTS {
            assert!(sql.contains(&format!("${n}::")), "slot {n} missing");
        }
        assert!(!sql.contains(&format!("${}::", FILTER_SLOTS + 1)));
    }

    #[test]
    fn excluded_facet_keeps_bind_but_constrains_nothing() {
        let sql = where_clause(Some(FacetField::Color));
        assert!(sql.contains("($19::text[] IS NULL OR TRUE)"));
        assert!(!sql.contains("color_slug = ANY($19)"));
        // other list filters stay intact
        assert!(sql.contains("make_slug = ANY($16)"));
    }

    #[test]
    fn year_facet_neutralizes_both_bounds() {
        let sql = where_clause(Some(FacetField::Year));
        assert!(sql.contains("($1::int4 IS NULL OR TRUE)"));
        assert!(sql.contains("($2::int4 IS NULL OR TRUE)"));
        assert!(!sql.contains("year >= $1"));
        assert!(!sql.contains("year <= $2"));
    }

    #[test]
    fn page_sql_places_limit_and_offset_after_filter_slots() {
        let sql = page_sql(
            "lot_active_3",
            Sort {
                field: SortField::Price,
                dir: SortDir::Desc,
            },
        );
        assert!(sql.contains("FROM lot_active_3"));
        assert!(sql.contains("ORDER BY price DESC NULLS LAST, id ASC"));
        assert!(sql.ends_with("LIMIT $29 OFFSET $30"));
    }

    #[test]
    fn risk_facet_groups_into_three_buckets() {
        let sql = facet_sql("lot_active_1", FacetField::RiskBucket);
        assert!(sql.contains("WHEN risk_index < 50 THEN 'low'"));
        assert!(sql.contains("WHEN risk_index < 75 THEN 'medium'"));
        assert!(sql.contains("ELSE 'high'"));
        // the facet's own range filter must not apply
        assert!(sql.contains("($9::int4 IS NULL OR TRUE)"));
        assert!(sql.contains("($10::int4 IS NULL OR TRUE)"));
    }

    #[test]
    fn move_insert_overrides_only_the_historical_flag() {
        let sql = move_insert_sql("lot_active_2", "lot_historical");
        assert!(sql.starts_with("INSERT INTO lot_historical"));
        assert!(sql.contains("FROM lot_active_2 WHERE id = $1"));
        // target column list keeps the flag; source select replaces it
        let (cols, select) = sql.split_once("SELECT").unwrap();
        assert!(cols.contains("is_historical"));
        assert!(select.contains("$2::bool"));
        assert!(!select.contains("is_historical"));
    }
}
