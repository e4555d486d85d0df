//! Keyword search provider with TF-IDF ranking.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::search::query::{MatchEvidence, ProviderKind, SearchHit};
use crate::search::{ProviderRun, snippet_around};
use crate::storage::IndexState;
use crate::text::Tokenizer;
use crate::types::DocumentId;

/// Answers keyword queries against the inverted index.
///
/// Scoring is `score(d) = Σ_t tf(t,d) * ln(1 + N / df(t))` over the
/// distinct query terms, with the number of distinct matched terms as a
/// tie-break (coordination factor) and doc id as the final tie-break. The
/// smoothed idf keeps every match scored above zero even when a term
/// appears in the whole corpus (df = N).
pub struct TextProvider<'a> {
    state: &'a IndexState,
    tokenizer: &'a Tokenizer,
}

#[derive(Default)]
struct Candidate {
    score: f32,
    matched: Vec<String>,
}

impl<'a> TextProvider<'a> {
    pub fn new(state: &'a IndexState, tokenizer: &'a Tokenizer) -> Self {
        Self { state, tokenizer }
    }

    pub fn search(&self, query_text: &str, context_length: usize, deadline: Instant) -> ProviderRun {
        // Same tokenization policy as indexing time
        let mut terms = self.tokenizer.tokenize(query_text);
        terms.sort_unstable();
        terms.dedup();

        // Empty query is an empty result, not an error
        if terms.is_empty() {
            return ProviderRun::complete(ProviderKind::Text, Vec::new());
        }

        let total_docs = self.state.text.document_count();
        if total_docs == 0 {
            return ProviderRun::complete(ProviderKind::Text, Vec::new());
        }

        let mut candidates: HashMap<DocumentId, Candidate> = HashMap::new();
        let mut timed_out = false;

        for term in &terms {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            // Terms absent from the index contribute no postings; df is
            // never zero for a term we actually look up.
            let Some(postings) = self.state.text.postings(term) else {
                continue;
            };
            let idf = (1.0 + total_docs as f32 / postings.len() as f32).ln();
            for posting in postings {
                let entry = candidates.entry(posting.doc_id).or_default();
                entry.score += posting.term_frequency as f32 * idf;
                entry.matched.push(term.clone());
            }
        }

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|(doc_id, candidate)| {
                let snippet = self
                    .state
                    .documents
                    .content(doc_id)
                    .map(|content| {
                        let offset = first_term_offset(content, &candidate.matched);
                        snippet_around(content, offset, context_length)
                    })
                    .unwrap_or_default();
                SearchHit {
                    doc_id,
                    score: candidate.score,
                    snippet,
                    provider: ProviderKind::Text,
                    evidence: MatchEvidence::Terms(candidate.matched),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| distinct_terms(b).cmp(&distinct_terms(a)))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        debug!(
            terms = terms.len(),
            hits = hits.len(),
            timed_out,
            "text provider finished"
        );
        ProviderRun {
            provider: ProviderKind::Text,
            hits,
            timed_out,
            skipped: Vec::new(),
        }
    }
}

fn distinct_terms(hit: &SearchHit) -> usize {
    match &hit.evidence {
        MatchEvidence::Terms(terms) => terms.len(),
        _ => 0,
    }
}

/// Byte offset of the first occurrence of any matched term, for snippet
/// placement. Falls back to the start of the document when lowercasing
/// shifts byte offsets (non-ASCII case folding).
fn first_term_offset(content: &str, terms: &[String]) -> usize {
    let lowered = content.to_lowercase();
    if lowered.len() != content.len() {
        return 0;
    }
    terms
        .iter()
        .filter_map(|t| lowered.find(t.as_str()))
        .min()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Document, StoredDocument, content_hash};
    use crate::vector::{VectorDimension, VectorIndex};
    use std::collections::{BTreeSet, HashMap};
    use std::path::PathBuf;
    use std::time::Duration;

    fn state_with(docs: &[(&str, &str)]) -> (IndexState, Tokenizer) {
        let mut state = IndexState::new(VectorIndex::new(
            VectorDimension::new(4).unwrap(),
            "test-model",
        ));
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        for (path, content) in docs {
            let id = state.documents.id_for_path(std::path::Path::new(path));
            state.documents.insert(StoredDocument {
                document: Document {
                    id,
                    path: PathBuf::from(path),
                    content_hash: content_hash(content),
                    size: content.len() as u64,
                    modified: chrono::Utc::now(),
                    metadata: HashMap::new(),
                    tags: BTreeSet::new(),
                },
                content: content.to_string(),
            });
            state
                .text
                .add_document(id, &tokenizer.tokenize_with_positions(content));
        }
        (state, tokenizer)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_revenue_scenario() {
        let (state, tokenizer) = state_with(&[
            ("/doc1", "quarterly revenue report"),
            ("/doc2", "revenue growth analysis"),
            ("/doc3", "unrelated cooking recipes"),
        ]);
        let provider = TextProvider::new(&state, &tokenizer);

        let run = provider.search("revenue", 100, far_deadline());
        let ids: Vec<u32> = run.hits.iter().map(|h| h.doc_id.value()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&2));
        assert!(!run.timed_out);
    }

    #[test]
    fn test_empty_query_is_empty_result() {
        let (state, tokenizer) = state_with(&[("/doc1", "some content")]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("", 100, far_deadline());
        assert!(run.hits.is_empty());
        assert!(!run.timed_out);
    }

    #[test]
    fn test_absent_terms_are_skipped() {
        let (state, tokenizer) = state_with(&[("/doc1", "alpha beta")]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("alpha nonexistent", 100, far_deadline());
        assert_eq!(run.hits.len(), 1);
        match &run.hits[0].evidence {
            MatchEvidence::Terms(terms) => assert_eq!(terms, &["alpha"]),
            other => panic!("unexpected evidence: {other:?}"),
        }
    }

    #[test]
    fn test_term_frequency_ranks_higher() {
        let (state, tokenizer) = state_with(&[
            ("/doc1", "revenue revenue revenue report"),
            ("/doc2", "revenue report"),
        ]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("revenue", 100, far_deadline());
        assert_eq!(run.hits[0].doc_id.value(), 1);
        assert!(run.hits[0].score > run.hits[1].score);
    }

    #[test]
    fn test_coordination_tie_break() {
        // Both docs score equally on total tf*idf mass only when scores tie;
        // here doc1 matches both terms, doc2 matches one twice.
        let (state, tokenizer) = state_with(&[
            ("/doc1", "alpha beta"),
            ("/doc2", "alpha alpha"),
            ("/doc3", "gamma delta"),
        ]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("alpha beta", 100, far_deadline());
        // doc1: ln(1 + 3/2) + ln(1 + 3/1); doc2: 2*ln(1 + 3/2). doc1 wins
        // on score.
        assert_eq!(run.hits[0].doc_id.value(), 1);
    }

    #[test]
    fn test_single_document_unique_token_is_found() {
        // df == N must not zero out the score; a one-document corpus is the
        // degenerate case.
        let (state, tokenizer) = state_with(&[("/doc1", "zymurgy notes")]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("zymurgy", 100, far_deadline());
        assert_eq!(run.hits.len(), 1);
        assert_eq!(run.hits[0].doc_id.value(), 1);
        assert!(run.hits[0].score > 0.0);
    }

    #[test]
    fn test_ubiquitous_term_still_matches() {
        let (state, tokenizer) = state_with(&[
            ("/doc1", "revenue summary"),
            ("/doc2", "revenue details"),
            ("/doc3", "revenue appendix"),
        ]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("revenue", 100, far_deadline());
        assert_eq!(run.hits.len(), 3);
        assert!(run.hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn test_snippet_contains_match() {
        let long_prefix = "filler words ".repeat(30);
        let content = format!("{long_prefix}revenue appears here");
        let (state, tokenizer) = state_with(&[("/doc1", content.as_str())]);
        let provider = TextProvider::new(&state, &tokenizer);
        let run = provider.search("revenue", 40, far_deadline());
        assert!(run.hits[0].snippet.contains("revenue"));
    }

    #[test]
    fn test_expired_deadline_reports_timeout() {
        let (state, tokenizer) = state_with(&[("/doc1", "alpha")]);
        let provider = TextProvider::new(&state, &tokenizer);
        let expired = Instant::now();
        let run = provider.search("alpha", 100, expired);
        assert!(run.timed_out);
    }
}
