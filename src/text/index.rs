//! Inverted index mapping normalized terms to postings lists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::DocumentId;

/// One occurrence record: a term appears in a document with a frequency and
/// the positions of each occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocumentId,
    pub term_frequency: u32,
    pub positions: Vec<u32>,
}

/// Inverted index with incremental add/remove.
///
/// Postings lists are kept sorted by `doc_id` so merges and comparisons are
/// deterministic. Removal uses the per-document term list rather than a
/// full index scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextIndex {
    postings: HashMap<String, Vec<Posting>>,
    /// Terms indexed for each document, for targeted removal
    doc_terms: HashMap<DocumentId, Vec<String>>,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert postings for a document from its token stream.
    ///
    /// Any previous postings for the document are removed first, so this is
    /// safe to call for updates.
    pub fn add_document(&mut self, doc_id: DocumentId, tokens: &[(String, u32)]) {
        self.remove_document(doc_id);

        let mut per_term: HashMap<&str, Vec<u32>> = HashMap::new();
        for (term, position) in tokens {
            per_term.entry(term.as_str()).or_default().push(*position);
        }

        let mut terms: Vec<String> = Vec::with_capacity(per_term.len());
        for (term, positions) in per_term {
            let posting = Posting {
                doc_id,
                term_frequency: positions.len() as u32,
                positions,
            };
            let list = self.postings.entry(term.to_string()).or_default();
            // Keep the list sorted by doc_id
            let at = list
                .binary_search_by_key(&doc_id, |p| p.doc_id)
                .unwrap_or_else(|i| i);
            list.insert(at, posting);
            terms.push(term.to_string());
        }
        terms.sort_unstable();
        self.doc_terms.insert(doc_id, terms);
    }

    /// Remove all postings for a document. Idempotent.
    pub fn remove_document(&mut self, doc_id: DocumentId) {
        let Some(terms) = self.doc_terms.remove(&doc_id) else {
            return;
        };
        for term in terms {
            if let Some(list) = self.postings.get_mut(&term) {
                if let Ok(at) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                    list.remove(at);
                }
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    /// Postings list for a term, sorted by doc_id. `None` when the term is
    /// not in the index.
    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(|v| v.as_slice())
    }

    /// Number of documents containing the term
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, |v| v.len())
    }

    pub fn contains(&self, doc_id: DocumentId) -> bool {
        self.doc_terms.contains_key(&doc_id)
    }

    /// Number of indexed documents
    pub fn document_count(&self) -> usize {
        self.doc_terms.len()
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Documents containing at least one term with `fragment` as a
    /// substring.
    ///
    /// Used for candidate narrowing before an expensive regex scan; a
    /// required literal can sit anywhere inside a token ("data" inside
    /// "metadata42"), so prefix matching alone would drop candidates.
    /// Returns a sorted, deduplicated list.
    pub fn documents_with_token_containing(&self, fragment: &str) -> Vec<DocumentId> {
        let mut docs: Vec<DocumentId> = self
            .postings
            .iter()
            .filter(|(term, _)| term.contains(fragment))
            .flat_map(|(_, list)| list.iter().map(|p| p.doc_id))
            .collect();
        docs.sort_unstable();
        docs.dedup();
        docs
    }

    pub fn clear(&mut self) {
        self.postings.clear();
        self.doc_terms.clear();
    }
}
