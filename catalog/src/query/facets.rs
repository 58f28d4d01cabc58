use crate::partition::Partition;
use crate::query::criteria::{FacetField, FilterCriteria, RangeField};
use crate::query::scatter::{PartitionReader, ScatterGather};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: i64,
    /// Localized label; starts as the raw value and is relabeled by the
    /// service when a translation exists.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

/// Per-field refinement statistics for the current filtered set, with each
/// facet's own filter excluded so it shows what else is possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetStats {
    pub fields: BTreeMap<String, Vec<FacetValue>>,
    pub odometer: Option<MinMax>,
}

/// Facets aggregated as value histograms. Odometer is deliberately absent; it
/// reduces to a min/max pair instead.
const HISTOGRAM_FACETS: [FacetField; 15] = FacetField::ALL;

pub async fn compute<R: PartitionReader>(
    executor: &ScatterGather<R>,
    partitions: &[Partition],
    criteria: &FilterCriteria,
) -> FacetStats {
    let mut fields = BTreeMap::new();
    for facet in HISTOGRAM_FACETS {
        let merged = executor.facet_counts(partitions, facet, criteria).await;
        let mut values: Vec<FacetValue> = merged
            .into_iter()
            .map(|(value, count)| FacetValue {
                label: value.clone(),
                value,
                count,
            })
            .collect();
        sort_facet(facet, &mut values);
        fields.insert(facet.as_str().to_string(), values);
    }

    let odometer = executor
        .min_max(partitions, RangeField::Odometer, criteria)
        .await
        .map(|(min, max)| MinMax { min, max });

    FacetStats { fields, odometer }
}

fn sort_facet(facet: FacetField, values: &mut Vec<FacetValue>) {
    match facet {
        // fixed bucket order, absent buckets filled with zero so the three
        // counts always sum to the filtered total
        FacetField::RiskBucket => {
            let mut ordered = Vec::with_capacity(3);
            for bucket in ["low", "medium", "high"] {
                let count = values
                    .iter()
                    .find(|v| v.value == bucket)
                    .map_or(0, |v| v.count);
                ordered.push(FacetValue {
                    value: bucket.to_string(),
                    label: bucket.to_string(),
                    count,
                });
            }
            *values = ordered;
        }
        // numeric histograms read naturally in value order
        FacetField::Year | FacetField::EngineSize | FacetField::EngineCylinders => {
            values.sort_by(|a, b| {
                let an = a.value.parse::<f64>().unwrap_or(f64::MAX);
                let bn = b.value.parse::<f64>().unwrap_or(f64::MAX);
                an.partial_cmp(&bn).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        _ => {
            values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        }
    }
}

/// Buckets a risk index the same way the SQL `CASE` does; kept in sync with
/// `query::sql::facet_value_expr`.
pub fn risk_bucket(risk_index: i32) -> &'static str {
    if risk_index < 50 {
        "low"
    } else if risk_index < 75 {
        "medium"
    } else {
        "high"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_buckets_partition_the_whole_range() {
        assert_eq!(risk_bucket(0), "low");
        assert_eq!(risk_bucket(49), "low");
        assert_eq!(risk_bucket(50), "medium");
        assert_eq!(risk_bucket(74), "medium");
        assert_eq!(risk_bucket(75), "high");
        assert_eq!(risk_bucket(100), "high");
    }

    #[test]
    fn risk_bucket_counts_sum_to_filtered_total() {
        let risks = [3, 12, 49, 50, 60, 74, 75, 99, 100, 27];
        let mut counts = std::collections::HashMap::new();
        for r in risks {
            *counts.entry(risk_bucket(r)).or_insert(0i64) += 1;
        }
        let total: i64 = counts.values().sum();
        assert_eq!(total, risks.len() as i64);
        assert_eq!(counts["low"], 4);
        assert_eq!(counts["medium"], 3);
        assert_eq!(counts["high"], 3);
    }

    #[test]
    fn risk_facet_always_lists_three_buckets() {
        let mut values = vec![FacetValue {
            value: "high".into(),
            label: "high".into(),
            count: 7,
        }];
        sort_facet(FacetField::RiskBucket, &mut values);
        assert_eq!(
            values.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(),
            vec!["low", "medium", "high"]
        );
        assert_eq!(values[0].count, 0);
        assert_eq!(values[2].count, 7);
    }

    #[test]
    fn numeric_facets_sort_by_value() {
        let mut values = vec![
            FacetValue {
                value: "2021".into(),
                label: "2021".into(),
                count: 1,
            },
            FacetValue {
                value: "2006".into(),
                label: "2006".into(),
                count: 9,
            },
        ];
        sort_facet(FacetField::Year, &mut values);
        assert_eq!(values[0].value, "2006");
    }
}
