use crate::error::CatalogError;
use common::config::CONFIG;
use common::persistence::PgPool;
use common::persistence::models::{NewReferenceEntity, NewTranslation, ReferenceEntity};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dimension kinds all lot rows foreign-key into by slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    VehicleType,
    Make,
    Model,
    Series,
    Color,
    Status,
    Seller,
    Fuel,
    Transmission,
    Drive,
    Source,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::VehicleType => "vehicle_type",
            ReferenceKind::Make => "make",
            ReferenceKind::Model => "model",
            ReferenceKind::Series => "series",
            ReferenceKind::Color => "color",
            ReferenceKind::Status => "status",
            ReferenceKind::Seller => "seller",
            ReferenceKind::Fuel => "fuel",
            ReferenceKind::Transmission => "transmission",
            ReferenceKind::Drive => "drive",
            ReferenceKind::Source => "source",
        }
    }
}

/// Lowercase ascii slug: alphanumeric runs joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Get-or-create by normalized name, optionally scoped by a parent slug
/// (models under a make, series under a model). A null/empty name resolves to
/// nothing and creates nothing. Creation runs in its own sub-transaction; a
/// unique violation from a concurrent creator is treated as a hit and
/// re-fetched.
pub async fn get_or_create(
    pool: &PgPool,
    entity_kind: ReferenceKind,
    name_raw: Option<&str>,
    parent: Option<&str>,
) -> Result<Option<ReferenceEntity>, CatalogError> {
    let Some(name_raw) = name_raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let entity_slug = slugify(name_raw);
    if entity_slug.is_empty() {
        return Ok(None);
    }

    if let Some(existing) = lookup(pool, entity_kind, &entity_slug, parent).await? {
        return Ok(Some(existing));
    }

    let created = create(pool, entity_kind, &entity_slug, name_raw, parent).await;
    match created {
        Ok(entity) => Ok(Some(entity)),
        Err(CatalogError::Diesel(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            debug!(
                kind = entity_kind.as_str(),
                slug = %entity_slug,
                "lost creation race, re-fetching"
            );
            Ok(lookup(pool, entity_kind, &entity_slug, parent).await?)
        }
        Err(e) => Err(e),
    }
}

pub async fn lookup(
    pool: &PgPool,
    entity_kind: ReferenceKind,
    entity_slug: &str,
    parent: Option<&str>,
) -> Result<Option<ReferenceEntity>, CatalogError> {
    use common::persistence::schema::reference_entity::dsl::*;

    let mut conn = pool.get().await?;
    let found = reference_entity
        .filter(kind.eq(entity_kind.as_str()))
        .filter(slug.eq(entity_slug))
        .filter(parent_slug.is_not_distinct_from(parent))
        .select(ReferenceEntity::as_select())
        .first(&mut conn)
        .await
        .optional()?;
    Ok(found)
}

async fn create(
    pool: &PgPool,
    entity_kind: ReferenceKind,
    entity_slug: &str,
    name_raw: &str,
    parent: Option<&str>,
) -> Result<ReferenceEntity, CatalogError> {
    let mut conn = pool.get().await?;
    let entity = conn
        .transaction::<ReferenceEntity, CatalogError, _>(|conn| {
            async move {
                let entity: ReferenceEntity = diesel::insert_into(
                    common::persistence::schema::reference_entity::table,
                )
                .values(NewReferenceEntity {
                    kind: entity_kind.as_str().to_string(),
                    slug: entity_slug.to_string(),
                    name: name_raw.to_string(),
                    parent_slug: parent.map(str::to_string),
                })
                .returning(ReferenceEntity::as_returning())
                .get_result(conn)
                .await?;

                // First sighting of a slug seeds a label row per configured
                // language, with the English name as the placeholder.
                let seeds: Vec<NewTranslation> = CONFIG
                    .catalog
                    .languages
                    .iter()
                    .map(|lang| NewTranslation {
                        field: entity_kind.as_str().to_string(),
                        slug: entity_slug.to_string(),
                        language: lang.clone(),
                        label: name_raw.to_string(),
                    })
                    .collect();
                diesel::insert_into(common::persistence::schema::translation::table)
                    .values(&seeds)
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;

                Ok(entity)
            }
            .scope_boxed()
        })
        .await?;
    Ok(entity)
}

/// Batched label lookup for one facet field; slugs without a translation are
/// simply absent from the map and fall back to themselves at the caller.
pub async fn labels_for(
    pool: &PgPool,
    field_name: &str,
    slugs: &[String],
    lang: &str,
) -> Result<std::collections::HashMap<String, String>, CatalogError> {
    use common::persistence::schema::translation::dsl::*;

    if slugs.is_empty() {
        return Ok(Default::default());
    }
    let mut conn = pool.get().await?;
    let rows: Vec<(String, String)> = translation
        .filter(field.eq(field_name))
        .filter(language.eq(lang))
        .filter(slug.eq_any(slugs))
        .select((slug, label))
        .load(&mut conn)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Single-value label lookup; `None` means no translation exists and the
/// caller falls back to the slug, never an error.
pub async fn translate(
    pool: &PgPool,
    field_name: &str,
    value_slug: &str,
    lang: &str,
) -> Result<Option<String>, CatalogError> {
    use common::persistence::schema::translation::dsl::*;

    let mut conn = pool.get().await?;
    let found = translation
        .filter(field.eq(field_name))
        .filter(slug.eq(value_slug))
        .filter(language.eq(lang))
        .select(label)
        .first::<String>(&mut conn)
        .await
        .optional()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("Mercedes-Benz"), "mercedes-benz");
        assert_eq!(slugify("  Land Rover "), "land-rover");
        assert_eq!(slugify("C/K 1500 Series"), "c-k-1500-series");
        assert_eq!(slugify("ŠKODA"), "koda");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ReferenceKind::VehicleType.as_str(), "vehicle_type");
        assert_eq!(ReferenceKind::Make.as_str(), "make");
        assert_eq!(ReferenceKind::Source.as_str(), "source");
    }
}
