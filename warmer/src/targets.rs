use catalog::query::criteria::{FilterCriteria, Sort, SortDir, SortField};
use catalog::service::{CatalogScope, QuerySignature};

/// Page size the warmed catalog entries use; must match what the API serves
/// for the keys to line up.
pub const WARM_PAGE_SIZE: i64 = 50;

/// How many leading page offsets get warmed per combination, one per shard.
pub const WARM_PAGE_OFFSETS: i64 = 7;

pub const WARM_SORTS: [SortField; 4] = [
    SortField::AuctionDate,
    SortField::Price,
    SortField::Year,
    SortField::Odometer,
];

pub const WARM_DIRS: [SortDir; 2] = [SortDir::Asc, SortDir::Desc];

/// Fixed price bands for the special-filter sweep.
pub const PRICE_BANDS: [(f64, f64); 4] = [
    (0.0, 5_000.0),
    (5_000.0, 10_000.0),
    (10_000.0, 20_000.0),
    (20_000.0, 50_000.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFilter {
    BuyNow,
    LowRisk,
}

pub const SPECIAL_FILTERS: [SpecialFilter; 2] = [SpecialFilter::BuyNow, SpecialFilter::LowRisk];

impl SpecialFilter {
    fn apply(&self, criteria: &mut FilterCriteria) {
        match self {
            SpecialFilter::BuyNow => criteria.buy_now_only = Some(true),
            SpecialFilter::LowRisk => criteria.risk_max = Some(49),
        }
    }
}

/// The declarative warm-target list for one cycle: the cross-product of page
/// offsets, languages, active/historical scope, sources (including "any") and
/// sort combinations, plus the special-filter x price-band sweep. Built once
/// per cycle and fed through the bounded runner.
pub fn enumerate(languages: &[String], sources: &[String]) -> Vec<QuerySignature> {
    let mut targets = Vec::new();

    let mut source_choices: Vec<Option<&String>> = vec![None];
    source_choices.extend(sources.iter().map(Some));

    for page in 0..WARM_PAGE_OFFSETS {
        for language in languages {
            for scope in [CatalogScope::Active, CatalogScope::Historical] {
                for source in &source_choices {
                    for field in WARM_SORTS {
                        for dir in WARM_DIRS {
                            let mut criteria = FilterCriteria::default();
                            if let Some(source) = source {
                                criteria.sources = Some(vec![(*source).clone()]);
                            }
                            targets.push(QuerySignature {
                                scope,
                                language: language.clone(),
                                criteria,
                                sort: Sort { field, dir },
                                limit: WARM_PAGE_SIZE,
                                offset: page * WARM_PAGE_SIZE,
                            });
                        }
                    }
                }
            }
        }
    }

    let default_language = languages.first().cloned().unwrap_or_else(|| "en".into());
    for special in SPECIAL_FILTERS {
        for (price_min, price_max) in PRICE_BANDS {
            let mut criteria = FilterCriteria {
                price_min: Some(price_min),
                price_max: Some(price_max),
                ..Default::default()
            };
            special.apply(&mut criteria);
            targets.push(QuerySignature {
                scope: CatalogScope::Active,
                language: default_language.clone(),
                criteria,
                sort: Sort::default(),
                limit: WARM_PAGE_SIZE,
                offset: 0,
            });
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cross_product_plus_specials() {
        let languages = vec!["en".to_string(), "de".to_string()];
        let sources = vec!["copart".to_string(), "iaai".to_string()];
        let targets = enumerate(&languages, &sources);

        // offsets x languages x scopes x (sources + any) x sorts x dirs
        let sweep = 7 * 2 * 2 * 3 * 4 * 2;
        let specials = 2 * 4;
        assert_eq!(targets.len(), sweep + specials);
    }

    #[test]
    fn warmed_keys_are_stable() {
        let languages = vec!["en".to_string()];
        let sources = vec!["copart".to_string()];
        let a = enumerate(&languages, &sources);
        let b = enumerate(&languages, &sources);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.cache_key(), y.cache_key());
        }
    }

    #[test]
    fn special_targets_carry_their_price_band() {
        let targets = enumerate(&["en".to_string()], &[]);
        let buy_now: Vec<_> = targets
            .iter()
            .filter(|t| t.criteria.buy_now_only == Some(true))
            .collect();
        assert_eq!(buy_now.len(), PRICE_BANDS.len());
        assert!(buy_now.iter().all(|t| t.criteria.price_min.is_some()));
    }
}
