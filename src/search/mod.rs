//! Search providers, result combination, caching, saved searches, and the
//! engine facade.

mod cache;
mod combine;
mod engine;
mod query;
mod regex_provider;
mod saved;
mod text_provider;
mod vector_provider;

pub use cache::QueryCache;
pub use combine::{ProviderWeights, combine};
pub use engine::SearchEngine;
pub use query::{
    MatchEvidence, MetadataFilter, ProviderKind, ProviderSelection, ProviderWarning, Query,
    SearchHit, SearchResponse, WarningKind,
};
pub use regex_provider::RegexProvider;
pub use saved::SavedSearchStore;
pub use text_provider::TextProvider;
pub use vector_provider::VectorProvider;

/// Raw output of one provider before combination: scored hits plus
/// partial-result bookkeeping.
#[derive(Debug, Clone)]
pub struct ProviderRun {
    pub provider: ProviderKind,
    pub hits: Vec<SearchHit>,
    /// The provider hit its deadline and returned only what it had
    pub timed_out: bool,
    /// Per-document skip notes (regex scan budget, unreadable content)
    pub skipped: Vec<String>,
}

impl ProviderRun {
    pub fn complete(provider: ProviderKind, hits: Vec<SearchHit>) -> Self {
        Self {
            provider,
            hits,
            timed_out: false,
            skipped: Vec::new(),
        }
    }
}

/// Extract a snippet of roughly `window` characters around a byte offset,
/// clamped to char boundaries.
pub(crate) fn snippet_around(content: &str, offset: usize, window: usize) -> String {
    if content.is_empty() || window == 0 {
        return String::new();
    }
    let offset = offset.min(content.len());

    // When the window is clipped at the end of the content, slide it back
    // so the snippet keeps its full width.
    let mut end = (offset.saturating_sub(window / 2) + window).min(content.len());
    let mut start = end.saturating_sub(window);
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }

    content[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_window() {
        let content = "the quarterly revenue report shows strong growth in all regions";
        let offset = content.find("revenue").unwrap();
        let snippet = snippet_around(content, offset, 20);
        assert!(snippet.contains("revenue"));
        assert!(snippet.len() <= 24);
    }

    #[test]
    fn test_snippet_at_start_and_end() {
        let content = "short text";
        assert_eq!(snippet_around(content, 0, 100), "short text");
        assert_eq!(snippet_around(content, content.len(), 4), "text");
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let content = "prefix 日本語のテキスト suffix";
        let offset = content.find('テ').unwrap();
        // Must not panic on multi-byte boundaries
        let snippet = snippet_around(content, offset, 7);
        assert!(!snippet.is_empty());
    }

    #[test]
    fn test_snippet_empty_content() {
        assert_eq!(snippet_around("", 0, 50), "");
        assert_eq!(snippet_around("abc", 1, 0), "");
    }
}
