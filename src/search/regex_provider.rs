//! Pattern search provider scanning stored document text.

use regex::Regex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{SearchError, SearchResult};
use crate::search::query::{MatchEvidence, ProviderKind, SearchHit};
use crate::search::{ProviderRun, snippet_around};
use crate::storage::IndexState;
use crate::text::Tokenizer;
use crate::types::DocumentId;

/// Score increment per match occurrence beyond the first. The raw score is
/// min-max normalized by the combiner, so the baseline stays dominant.
const OCCURRENCE_INCREMENT: f32 = 0.05;

/// The occurrence bonus saturates at one baseline's worth, so raw scores
/// stay in [1.0, 2.0].
const MAX_OCCURRENCE_BONUS: f32 = 1.0;

/// How many match iterations to run between budget checks
const BUDGET_CHECK_INTERVAL: usize = 64;

/// Answers pattern queries by scanning stored document text.
///
/// When the pattern starts with a literal every match must contain, the
/// candidate set is narrowed to documents with an indexed token containing
/// that literal; otherwise every stored document is scanned. Narrowing is an
/// optimization only and never changes the result set.
pub struct RegexProvider<'a> {
    state: &'a IndexState,
    tokenizer: &'a Tokenizer,
}

impl<'a> RegexProvider<'a> {
    pub fn new(state: &'a IndexState, tokenizer: &'a Tokenizer) -> Self {
        Self { state, tokenizer }
    }

    /// Compile and validate a pattern.
    ///
    /// Malformed patterns fail with [`SearchError::InvalidQuery`] before any
    /// scanning starts.
    pub fn compile(pattern: &str) -> SearchResult<Regex> {
        Regex::new(pattern).map_err(|e| SearchError::InvalidQuery {
            reason: format!("invalid regex pattern: {e}"),
        })
    }

    pub fn search(
        &self,
        regex: &Regex,
        context_length: usize,
        per_doc_budget: Duration,
        deadline: Instant,
    ) -> ProviderRun {
        let candidates = self.candidate_documents(regex.as_str());
        let narrowed = candidates.len() < self.state.documents.len();

        let mut hits = Vec::new();
        let mut skipped = Vec::new();
        let mut timed_out = false;

        for doc_id in candidates {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            let Some(content) = self.state.documents.content(doc_id) else {
                continue;
            };

            match scan_document(regex, content, per_doc_budget) {
                ScanOutcome::Matched { count, first_offset } => {
                    let bonus =
                        (OCCURRENCE_INCREMENT * (count - 1) as f32).min(MAX_OCCURRENCE_BONUS);
                    let score = 1.0 + bonus;
                    hits.push(SearchHit {
                        doc_id,
                        score,
                        snippet: snippet_around(content, first_offset, context_length),
                        provider: ProviderKind::Regex,
                        evidence: MatchEvidence::Pattern(regex.as_str().to_string()),
                    });
                }
                ScanOutcome::NoMatch => {}
                ScanOutcome::BudgetExceeded => {
                    skipped.push(format!(
                        "document {doc_id} skipped: pattern scan exceeded {per_doc_budget:?}"
                    ));
                }
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));

        debug!(
            pattern = regex.as_str(),
            narrowed,
            hits = hits.len(),
            skipped = skipped.len(),
            timed_out,
            "regex provider finished"
        );
        ProviderRun {
            provider: ProviderKind::Regex,
            hits,
            timed_out,
            skipped,
        }
    }

    /// Candidate set for the scan: narrowed through the inverted index when
    /// the pattern provably requires a literal in every match and the
    /// tokenization policy cannot have dropped a token containing it.
    fn candidate_documents(&self, pattern: &str) -> Vec<DocumentId> {
        if let Some(prefix) = literal_prefix(pattern)
            && prefix.chars().count() >= 2
            && self.tokenizer.retains_fragment(&prefix)
        {
            return self.state.text.documents_with_token_containing(&prefix);
        }
        self.state.documents.ids()
    }
}

enum ScanOutcome {
    Matched { count: usize, first_offset: usize },
    NoMatch,
    BudgetExceeded,
}

fn scan_document(regex: &Regex, content: &str, budget: Duration) -> ScanOutcome {
    let started = Instant::now();
    let mut count = 0usize;
    let mut first_offset = 0usize;

    for m in regex.find_iter(content) {
        if count == 0 {
            first_offset = m.start();
        }
        count += 1;
        if count % BUDGET_CHECK_INTERVAL == 0 && started.elapsed() > budget {
            return ScanOutcome::BudgetExceeded;
        }
    }
    // A document whose whole scan ran over budget is skipped even if it
    // matched; a partial count would not be comparable.
    if started.elapsed() > budget {
        return ScanOutcome::BudgetExceeded;
    }

    if count == 0 {
        ScanOutcome::NoMatch
    } else {
        ScanOutcome::Matched { count, first_offset }
    }
}

/// Extract a literal alphanumeric prefix the pattern requires in every
/// match, lowercased to match indexed terms.
///
/// Returns `None` when the pattern starts with a metacharacter or anchor,
/// or when it contains alternation or a counted repetition anywhere: in
/// "cat|dog" the leading "cat" is not required by the "dog" branch, and a
/// `{0,n}` bound can make the preceding literal optional. Narrowing must
/// only ever produce a superset of the matching documents.
fn literal_prefix(pattern: &str) -> Option<String> {
    if pattern.contains(['|', '{']) {
        return None;
    }
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    let literal: String = pattern
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect();
    // A prefix immediately followed by a quantifier is not a fixed literal:
    // in "dat?a" the 't' is optional.
    let rest = &pattern[literal.len()..];
    let trimmed = if rest.starts_with(['?', '*']) && !literal.is_empty() {
        literal[..literal.len() - literal.chars().last().map_or(0, |c| c.len_utf8())].to_string()
    } else {
        literal
    };
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
