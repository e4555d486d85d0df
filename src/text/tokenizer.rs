//! Unicode-aware word tokenization with a configurable stop-word set.

use std::collections::HashSet;

use crate::config::Settings;

/// Tokenization policy: lowercase, alphanumeric word splitting, stop-word
/// removal, minimum token length.
///
/// The same instance (or one built from the same settings) must be used at
/// indexing and query time.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<String>,
    min_token_len: usize,
}

impl Tokenizer {
    pub fn new(stop_words: impl IntoIterator<Item = String>, min_token_len: usize) -> Self {
        Self {
            stop_words: stop_words.into_iter().collect(),
            min_token_len,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.tokenizer.stop_words.iter().cloned(),
            settings.tokenizer.min_token_len,
        )
    }

    /// Tokenize text into normalized terms.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_with_positions(text)
            .into_iter()
            .map(|(term, _)| term)
            .collect()
    }

    /// Tokenize text, pairing each term with its ordinal position.
    ///
    /// Positions count surviving tokens, not characters, so phrase distance
    /// stays meaningful after stop-word removal.
    pub fn tokenize_with_positions(&self, text: &str) -> Vec<(String, u32)> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let term = word.to_lowercase();
            if term.chars().count() < self.min_token_len || self.stop_words.contains(&term) {
                continue;
            }
            tokens.push((term, position));
            position += 1;
        }
        tokens
    }

    /// Whether every token containing `fragment` is guaranteed to survive
    /// this policy.
    ///
    /// A token containing the fragment is at least as long as the fragment,
    /// so a fragment at or above the minimum length can only be hidden by a
    /// stop word that contains it. Candidate narrowing through the inverted
    /// index is only sound when this holds.
    pub fn retains_fragment(&self, fragment: &str) -> bool {
        fragment.chars().count() >= self.min_token_len
            && !self.stop_words.iter().any(|w| w.contains(fragment))
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_splits() {
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        let tokens = tokenizer.tokenize("Quarterly Revenue, report-2024!");
        assert_eq!(tokens, vec!["quarterly", "revenue", "report", "2024"]);
    }

    #[test]
    fn test_min_token_length() {
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        let tokens = tokenizer.tokenize("a b cd efg");
        assert_eq!(tokens, vec!["cd", "efg"]);
    }

    #[test]
    fn test_stop_words_removed() {
        let tokenizer = Tokenizer::new(vec!["the".to_string(), "of".to_string()], 2);
        let tokens = tokenizer.tokenize("the state of the index");
        assert_eq!(tokens, vec!["state", "index"]);
    }

    #[test]
    fn test_unicode_words() {
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        let tokens = tokenizer.tokenize("Überblick française 日本語");
        assert_eq!(tokens, vec!["überblick", "française", "日本語"]);
    }

    #[test]
    fn test_positions_count_surviving_tokens() {
        let tokenizer = Tokenizer::new(vec!["the".to_string()], 2);
        let tokens = tokenizer.tokenize_with_positions("the quick brown fox");
        assert_eq!(
            tokens,
            vec![
                ("quick".to_string(), 0),
                ("brown".to_string(), 1),
                ("fox".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_retains_fragment() {
        let tokenizer = Tokenizer::new(vec!["with".to_string()], 2);
        assert!(tokenizer.retains_fragment("data"));
        // "wit" hides inside the stop word "with", which never reaches the
        // index
        assert!(!tokenizer.retains_fragment("wit"));
        // Below the minimum token length the fragment could sit in a token
        // that was dropped entirely
        assert!(!tokenizer.retains_fragment("d"));
    }

    #[test]
    fn test_default_policy_matches_settings() {
        let tokenizer = Tokenizer::default();
        // "is" and "the" are default stop words, "a" is below min length
        let tokens = tokenizer.tokenize("this is a test of the engine");
        assert_eq!(tokens, vec!["this", "test", "engine"]);
    }
}
