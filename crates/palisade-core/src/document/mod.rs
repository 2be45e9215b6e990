//! Document parsing and canonicalization.
//!
//! Parsing is cost-bounded: a lexical token count runs before the real
//! parser so oversized documents are rejected before any allocation-heavy
//! work, crypto, or I/O. The canonical form produced by [`canonical_print`]
//! is the byte sequence signatures are computed over.
//!
//! Both failure modes collapse to the same client-visible admission error;
//! the distinction only survives into logs.

use std::sync::Arc;

use dashmap::DashMap;
use graphql_parser::query::{parse_query, Document};
use thiserror::Error;

mod lexer;
mod printer;

pub use lexer::count_tokens;
pub use printer::canonical_print;

/// Why a document failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The source exceeded the lexical token cap.
    #[error("document has {count} tokens, cap is {max}")]
    TokenLimit {
        /// Tokens found in the source.
        count: usize,
        /// Configured cap.
        max:   usize,
    },

    /// The source is not a valid executable document.
    #[error("syntax error: {message}")]
    Syntax {
        /// Parser diagnostic.
        message: String,
    },
}

/// Parse a GraphQL source under a token cap.
///
/// # Errors
///
/// Returns [`DocumentError::TokenLimit`] when the source exceeds
/// `max_tokens` lexical tokens, or [`DocumentError::Syntax`] when it does
/// not parse.
pub fn parse_document(text: &str, max_tokens: usize) -> Result<Document<'_, String>, DocumentError> {
    let count = count_tokens(text);
    if count > max_tokens {
        return Err(DocumentError::TokenLimit {
            count,
            max: max_tokens,
        });
    }

    parse_query::<String>(text).map_err(|e| DocumentError::Syntax {
        message: e.to_string(),
    })
}

/// Memo from raw source text to canonical form.
///
/// Shared across requests; writers may race and recompute, which is
/// harmless because the canonical form of a given source never changes.
/// The entry bound caps memory growth: once full, lookups still hit but
/// new entries are computed per request.
#[derive(Debug)]
pub struct CanonicalCache {
    entries:     DashMap<String, Arc<str>>,
    max_entries: usize,
}

impl CanonicalCache {
    /// Create a cache bounded to `max_entries`; 0 disables memoization.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Canonicalize `text`, memoizing successful results.
    ///
    /// # Errors
    ///
    /// Propagates [`DocumentError`] from [`parse_document`]; failures are
    /// never cached.
    pub fn canonical(&self, text: &str, max_tokens: usize) -> Result<Arc<str>, DocumentError> {
        if let Some(hit) = self.entries.get(text) {
            return Ok(hit.clone());
        }

        let document = parse_document(text, max_tokens)?;
        let printed: Arc<str> = canonical_print(&document).into();

        if self.max_entries > 0 && self.entries.len() < self.max_entries {
            self.entries.insert(text.to_string(), printed.clone());
        }

        Ok(printed)
    }

    /// Number of memoized documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the memo is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
