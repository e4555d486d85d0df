//! Result combination: metadata filtering, per-provider score
//! normalization, and weighted merging into one ranked list.

use std::collections::HashMap;

use tracing::debug;

use crate::config::SearchConfig;
use crate::search::ProviderRun;
use crate::search::query::{MetadataFilter, ProviderKind, SearchHit};
use crate::storage::IndexState;
use crate::types::DocumentId;

/// Relative weight of each provider's normalized score in the combined
/// ranking.
#[derive(Debug, Clone, Copy)]
pub struct ProviderWeights {
    pub text: f32,
    pub regex: f32,
    pub vector: f32,
}

impl ProviderWeights {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            text: config.text_weight,
            regex: config.regex_weight,
            vector: config.vector_weight,
        }
    }

    fn get(&self, provider: ProviderKind) -> f32 {
        match provider {
            ProviderKind::Text => self.text,
            ProviderKind::Regex => self.regex,
            ProviderKind::Vector => self.vector,
        }
    }
}

impl Default for ProviderWeights {
    fn default() -> Self {
        Self {
            text: 1.0,
            regex: 1.0,
            vector: 1.0,
        }
    }
}

struct Merged {
    combined_score: f32,
    /// The hit whose weighted contribution was largest; its snippet and
    /// evidence represent the document in the final list.
    best: SearchHit,
    best_contribution: f32,
}

/// Merge provider runs into one ranked list.
///
/// Each run's raw scores are min-max normalized to [0, 1] independently,
/// then summed with per-provider weights and divided by the total weight of
/// the providers that ran, so the combined score stays in [0, 1]. Documents
/// failing a metadata filter are dropped before normalization. Ordering is
/// by combined score descending with document id ascending as the tie-break,
/// which keeps repeated queries deterministic.
pub fn combine(
    runs: &[ProviderRun],
    state: &IndexState,
    filters: &[MetadataFilter],
    weights: &ProviderWeights,
    limit: usize,
) -> Vec<SearchHit> {
    let total_weight: f32 = runs.iter().map(|r| weights.get(r.provider)).sum();
    if total_weight <= 0.0 {
        return Vec::new();
    }

    let mut merged: HashMap<DocumentId, Merged> = HashMap::new();

    // Fixed iteration order (the caller dispatches providers in a fixed
    // order) keeps best-contribution ties deterministic.
    for run in runs {
        let weight = weights.get(run.provider);
        let kept: Vec<&SearchHit> = run
            .hits
            .iter()
            .filter(|hit| passes_filters(state, hit.doc_id, filters))
            .collect();

        let (min, max) = score_range(&kept);
        for hit in kept {
            let normalized = if max > min {
                (hit.score - min) / (max - min)
            } else {
                // A single survivor, or all scores equal: full confidence
                1.0
            };
            let contribution = weight * normalized;

            match merged.entry(hit.doc_id) {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    let m = e.get_mut();
                    m.combined_score += contribution;
                    if contribution > m.best_contribution {
                        m.best = hit.clone();
                        m.best_contribution = contribution;
                    }
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(Merged {
                        combined_score: contribution,
                        best: hit.clone(),
                        best_contribution: contribution,
                    });
                }
            }
        }
    }

    let mut hits: Vec<SearchHit> = merged
        .into_iter()
        .map(|(doc_id, m)| SearchHit {
            doc_id,
            score: m.combined_score / total_weight,
            snippet: m.best.snippet,
            provider: m.best.provider,
            evidence: m.best.evidence,
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
    hits.truncate(limit);

    debug!(
        runs = runs.len(),
        filters = filters.len(),
        hits = hits.len(),
        "combined provider results"
    );
    hits
}

fn passes_filters(state: &IndexState, doc_id: DocumentId, filters: &[MetadataFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let Some(stored) = state.documents.get(doc_id) else {
        return false;
    };
    filters.iter().all(|f| f.matches(&stored.document.metadata))
}

fn score_range(hits: &[&SearchHit]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for hit in hits {
        min = min.min(hit.score);
        max = max.max(hit.score);
    }
    (min, max)
}
