// SPDX-License-Identifier: GPL-3.0-only

//! Citation marker resolution for rendered message text.
//!
//! ChatGPT transcripts mark source attributions in two independent ways:
//!
//! - **Bracket markers** like `【1†L15-L23】`: a glyph-delimited span whose
//!   numeral is a 1-based ordinal into the message's attached citation
//!   metadata list. The part after `†` is an opaque line-range token.
//! - **Reference markers**: literal `matched_text` strings from
//!   `content_references`, looked up in a per-message map.
//!
//! Both are replaced by Markdown links whose visible text is the original
//! marker and whose target is a local `#ref{n}` anchor. Resolved metadata
//! is interned in a [`ReferenceRegistry`], which deduplicates by URL (or
//! title, lacking one) and assigns stable first-seen indices used by the
//! trailing References section.
//!
//! Resolution failures are not errors: an out-of-range ordinal or an
//! unknown reference string stays in the text as literal glyphs.

use crate::parser::{CitationMeta, Message};
use std::collections::HashMap;
use std::fmt::Write;

const OPEN: char = '【';
const CLOSE: char = '】';
const ORDINAL_SEP: char = '†';

/// The per-run, order-preserving, deduplicating store of resolved citation
/// metadata.
///
/// Indices are 1-based, assigned first-seen in document order, and never
/// reordered. Two citations are the same reference when their URLs are
/// equal, or their titles are when neither has a URL; the first-seen
/// metadata wins.
#[derive(Debug, Default)]
pub struct ReferenceRegistry {
    entries: Vec<CitationMeta>,
    by_identity: HashMap<String, usize>,
}

impl ReferenceRegistry {
    /// Creates an empty registry for one conversion run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up or inserts `meta`, returning its 1-based index.
    pub fn intern(&mut self, meta: &CitationMeta) -> usize {
        let identity = meta
            .url
            .clone()
            .or_else(|| meta.title.clone())
            .unwrap_or_default();
        if let Some(&slot) = self.by_identity.get(&identity) {
            return slot + 1;
        }
        self.entries.push(meta.clone());
        let slot = self.entries.len() - 1;
        self.by_identity.insert(identity, slot);
        slot + 1
    }

    /// Returns `true` if no references have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of collected references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates the collected references in index order as
    /// `(1-based index, metadata)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CitationMeta)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(slot, meta)| (slot + 1, meta))
    }
}

/// Replaces every resolvable citation marker in `text` with a Markdown
/// link to its reference anchor, interning the resolved metadata in
/// `registry`.
///
/// Markers of both grammars are found in one left-to-right pass, so index
/// assignment follows document order regardless of marker kind. Substituted
/// spans are never re-scanned, which guarantees termination even when a
/// link's visible text happens to look like another marker.
#[must_use]
pub fn resolve_citations(
    text: &str,
    message: &Message,
    registry: &mut ReferenceRegistry,
) -> String {
    let mut found: Vec<(usize, usize, &CitationMeta)> = Vec::new();

    for (start, end, ordinal) in bracket_markers(text) {
        // Out-of-range ordinals stay literal.
        if let Some(meta) = ordinal
            .checked_sub(1)
            .and_then(|slot| message.citations.get(slot))
        {
            found.push((start, end, meta));
        }
    }

    for (needle, meta) in &message.reference_markers {
        for (start, matched) in text.match_indices(needle.as_str()) {
            found.push((start, start + matched.len(), meta));
        }
    }

    if found.is_empty() {
        return text.to_owned();
    }

    found.sort_by_key(|&(start, end, _)| (start, end));

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, meta) in found {
        if start < cursor {
            // Overlaps a span already consumed by an earlier marker.
            continue;
        }
        let index = registry.intern(meta);
        out.push_str(&text[cursor..start]);
        write!(out, "[{}](#ref{index})", &text[start..end]).unwrap();
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Finds well-formed bracket markers, returning `(start, end, ordinal)`
/// byte spans. Malformed spans (no numeral, stray delimiter) are skipped
/// without consuming any marker that may start inside them.
fn bracket_markers(text: &str) -> Vec<(usize, usize, usize)> {
    let mut markers = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(OPEN) {
        let start = pos + offset;
        let body_start = start + OPEN.len_utf8();
        let Some(close_offset) = text[body_start..].find(CLOSE) else {
            break;
        };
        let end = body_start + close_offset + CLOSE.len_utf8();

        match parse_marker_body(&text[body_start..body_start + close_offset]) {
            Some(ordinal) => {
                markers.push((start, end, ordinal));
                pos = end;
            }
            None => pos = body_start,
        }
    }

    markers
}

/// Parses a marker body: a numeral, optionally followed by `†` and an
/// opaque line-range token.
fn parse_marker_body(body: &str) -> Option<usize> {
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, rest) = body.split_at(digits_end);
    if digits.is_empty() {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with(ORDINAL_SEP) {
        return None;
    }
    digits.parse().ok()
}
