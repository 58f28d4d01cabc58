// Fixed (non-partitioned) tables. The twelve lot partition tables share one
// column set and are addressed by name through raw queries; their DDL lives in
// the migrations directory.

diesel::table! {
    id_counter (partition) {
        partition -> Varchar,
        last_id -> Int8,
    }
}

diesel::table! {
    shard_cursor (id) {
        id -> Int4,
        last_shard -> Int4,
    }
}

diesel::table! {
    reference_entity (id) {
        id -> Int4,
        kind -> Varchar,
        slug -> Varchar,
        name -> Varchar,
        parent_slug -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    translation (id) {
        id -> Int4,
        field -> Varchar,
        slug -> Varchar,
        language -> Varchar,
        label -> Varchar,
    }
}

diesel::table! {
    lot_locator (lot_id) {
        lot_id -> Int8,
        partition -> Varchar,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    lot_image (id) {
        id -> Int4,
        lot_id -> Int8,
        thumbnail_url -> Nullable<Varchar>,
        standard_url -> Nullable<Varchar>,
        sequence_number -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    external_ref (source_slug, external_lot_id) {
        source_slug -> Varchar,
        external_lot_id -> Varchar,
        lot_id -> Int8,
    }
}

diesel::table! {
    history_addon (lot_id) {
        lot_id -> Int8,
        vin -> Nullable<Varchar>,
        make_slug -> Nullable<Varchar>,
        model_slug -> Nullable<Varchar>,
        year -> Nullable<Int4>,
        price -> Nullable<Float8>,
        auction_date -> Nullable<Timestamp>,
        source_slug -> Nullable<Varchar>,
        updated_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    id_counter,
    shard_cursor,
    reference_entity,
    translation,
    lot_locator,
    lot_image,
    external_ref,
    history_addon,
);
