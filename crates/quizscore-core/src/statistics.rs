//! Aggregate statistics over a batch of scoring results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::results::ScoringResult;

/// Statistics across every scored submission in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Number of results included.
    pub total: usize,
    /// Result count per summary type.
    pub classifications: BTreeMap<String, usize>,
    /// Results classified by the default result rather than a rule.
    pub defaulted: usize,
    /// Per-scale distribution of raw scores.
    pub per_scale: BTreeMap<String, ScaleStats>,
}

/// Distribution of one scale's raw scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Result count per band label.
    pub bands: BTreeMap<String, usize>,
    /// Results whose score fell outside every band.
    pub unbanded: usize,
}

/// Compute batch statistics.
pub fn compute_batch_stats<'a>(results: impl IntoIterator<Item = &'a ScoringResult>) -> BatchStats {
    let mut stats = BatchStats::default();
    let mut raw_scores: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut band_counts: BTreeMap<&str, (BTreeMap<String, usize>, usize)> = BTreeMap::new();

    for result in results {
        stats.total += 1;
        *stats
            .classifications
            .entry(result.summary_type.clone())
            .or_insert(0) += 1;
        if result.is_default() {
            stats.defaulted += 1;
        }

        for scale in &result.scales {
            raw_scores.entry(&scale.key).or_default().push(scale.raw);
            let (bands, unbanded) = band_counts.entry(&scale.key).or_default();
            match scale.label() {
                Some(label) => *bands.entry(label.to_string()).or_insert(0) += 1,
                None => *unbanded += 1,
            }
        }
    }

    for (key, scores) in raw_scores {
        let (bands, unbanded) = band_counts.remove(key).unwrap_or_default();
        stats.per_scale.insert(
            key.to_string(),
            ScaleStats {
                mean: mean(&scores),
                min: scores.iter().copied().fold(f64::INFINITY, f64::min),
                max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                std_dev: std_dev(&scores),
                bands,
                unbanded,
            },
        );
    }

    stats
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
