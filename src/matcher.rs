//! Multi-pattern header search — every occurrence of every signature in a
//! single pass.
//!
//! Built on an Aho–Corasick automaton over the 256-symbol byte alphabet;
//! states live in a contiguous array inside the automaton, so the cyclic
//! failure-link structure never becomes node-to-node references.  The
//! overlapping iterator reports **all** matches of **all** patterns,
//! including signatures sharing prefix/suffix bytes, in non-decreasing
//! end-position order, without mutating the input.
//!
//! Pattern ids are indices into the registry's signature table; a
//! [`RawMatch`] carries that index plus the window-relative offset of the
//! first header byte.  Ordering by *start* offset is the scan driver's
//! job — two overlapping headers of different lengths can legally invert
//! start order relative to the automaton's end order.

use aho_corasick::{AhoCorasick, MatchKind};
use thiserror::Error;

use crate::registry::SignatureRegistry;

#[derive(Error, Debug)]
pub enum MatcherError {
    /// The signature table could not be compiled into an automaton.
    /// Fatal before the scan loop starts.
    #[error("Cannot build header automaton: {0}")]
    Build(String),
}

/// One header occurrence, not yet validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMatch {
    /// Index into the registry's signature table.
    pub signature: usize,
    /// Offset of the first header byte within the scanned window.
    pub offset:    usize,
}

/// Compiled multi-pattern matcher over the registered headers.
pub struct HeaderMatcher {
    automaton: AhoCorasick,
}

impl HeaderMatcher {
    pub fn build(registry: &SignatureRegistry) -> Result<Self, MatcherError> {
        let patterns: Vec<&[u8]> = registry.signatures().iter().map(|s| s.header.as_slice()).collect();

        // Standard match kind is required for the overlapping iterator.
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| MatcherError::Build(e.to_string()))?;

        Ok(Self { automaton })
    }

    /// Every header occurrence in `window`, in non-decreasing end-position
    /// order.
    pub fn find_all(&self, window: &[u8]) -> Vec<RawMatch> {
        self.automaton
            .find_overlapping_iter(window)
            .map(|m| RawMatch { signature: m.pattern().as_usize(), offset: m.start() })
            .collect()
    }
}
