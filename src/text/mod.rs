//! Keyword indexing: tokenizer and inverted index.
//!
//! The tokenization policy lives here and is shared between indexing and
//! query time; the text provider is only consistent if both sides use the
//! same policy.

mod index;
mod tokenizer;

pub use index::{Posting, TextIndex};
pub use tokenizer::Tokenizer;
