//! Concept hunter
//!
//! Looks for risk-indicative accounting vocabulary. In `strings` mode it is
//! fed the printable strings extracted from each chunk; in `payroll` mode it
//! reads the case-folded chunk text directly. Matching is plain substring
//! search unless word-boundary matching is enabled.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{HuntMode, ScanConfig};
use crate::core::patterns::{KeywordCategory, LexiconEntry, PAYROLL_LEXICON, PAYROLL_MARKERS, STANDARD_LEXICON};
use crate::core::scanner::RawChunk;

/// Characters kept before a keyword
pub const CONTEXT_BEFORE: usize = 20;

/// Characters kept from the keyword start onward
pub const CONTEXT_AFTER: usize = 40;

/// Hard cap on a context string
pub const CONTEXT_MAX: usize = CONTEXT_BEFORE + CONTEXT_AFTER;

/// One keyword occurrence with the text around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordHit {
    pub keyword: &'static str,
    pub context: String,
    pub category: KeywordCategory,
}

/// Findings of one chunk in payroll mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkHits {
    pub hits: Vec<KeywordHit>,
    pub markers: Vec<(&'static str, usize)>,
}

/// Aggregated view handed to the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptSummary {
    pub mode: HuntMode,
    pub total_found: usize,
    pub top_keywords: BTreeMap<String, usize>,
    pub by_category: BTreeMap<KeywordCategory, usize>,
    pub samples: Vec<KeywordHit>,
    /// Ordinary payroll vocabulary counts (payroll mode only)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub payroll_markers: BTreeMap<String, usize>,
}

/// Keyword matcher and frequency aggregator
#[derive(Debug, Clone)]
pub struct ConceptHunter {
    mode: HuntMode,
    lexicon: &'static [LexiconEntry],
    word_boundary: bool,
    top_k: usize,
    sample_limit: usize,
    counts: BTreeMap<&'static str, usize>,
    by_category: BTreeMap<KeywordCategory, usize>,
    total: usize,
    samples: Vec<KeywordHit>,
    payroll_markers: BTreeMap<&'static str, usize>,
}

impl ConceptHunter {
    pub fn new(mode: HuntMode, word_boundary: bool, top_k: usize, sample_limit: usize) -> Self {
        let lexicon = match mode {
            HuntMode::Strings => STANDARD_LEXICON,
            HuntMode::Payroll => PAYROLL_LEXICON,
        };
        Self {
            mode,
            lexicon,
            word_boundary,
            top_k,
            sample_limit,
            counts: BTreeMap::new(),
            by_category: BTreeMap::new(),
            total: 0,
            samples: Vec::new(),
            payroll_markers: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.hunt_mode,
            config.word_boundary,
            config.top_keywords,
            config.sample_hits,
        )
    }

    pub fn mode(&self) -> HuntMode {
        self.mode
    }

    /// Find every keyword occurrence in a piece of text
    pub fn scan_text(&self, text: &str) -> Vec<KeywordHit> {
        let folded = text.to_ascii_lowercase();
        let mut hits = Vec::new();
        for entry in self.lexicon {
            for (start, _) in folded.match_indices(entry.keyword) {
                let end = start + entry.keyword.len();
                if self.word_boundary && !on_word_boundary(folded.as_bytes(), start, end) {
                    continue;
                }
                hits.push(KeywordHit {
                    keyword: entry.keyword,
                    context: context_window(text, start),
                    category: entry.category,
                });
            }
        }
        hits
    }

    /// Payroll mode: search the decoded chunk text directly
    ///
    /// Returns `None` in strings mode. Only occurrences owned by the chunk
    /// are reported, so the carried prefix never counts twice.
    pub fn scan_chunk(&self, chunk: &RawChunk) -> Option<ChunkHits> {
        if self.mode != HuntMode::Payroll {
            return None;
        }

        let text = decode_ascii(chunk.bytes());
        let folded = text.to_ascii_lowercase();
        let mut result = ChunkHits::default();

        for entry in self.lexicon {
            for (start, _) in folded.match_indices(entry.keyword) {
                let end = start + entry.keyword.len();
                if !chunk.owns(start, end) {
                    continue;
                }
                if self.word_boundary && !on_word_boundary(folded.as_bytes(), start, end) {
                    continue;
                }
                result.hits.push(KeywordHit {
                    keyword: entry.keyword,
                    context: context_window(&folded, start),
                    category: entry.category,
                });
            }
        }

        for marker in PAYROLL_MARKERS {
            let count = folded
                .match_indices(marker)
                .filter(|(start, _)| chunk.owns(*start, *start + marker.len()))
                .count();
            if count > 0 {
                result.markers.push((*marker, count));
            }
        }

        Some(result)
    }

    /// Fold hits into the running counts and sample list
    pub fn record<I>(&mut self, hits: I)
    where
        I: IntoIterator<Item = KeywordHit>,
    {
        for hit in hits {
            self.total += 1;
            *self.counts.entry(hit.keyword).or_insert(0) += 1;
            *self.by_category.entry(hit.category).or_insert(0) += 1;
            if self.samples.len() < self.sample_limit {
                self.samples.push(hit);
            }
        }
    }

    /// Strings mode: match and record one extracted string
    pub fn hunt_string(&mut self, text: &str) {
        let hits = self.scan_text(text);
        self.record(hits);
    }

    pub fn record_chunk_hits(&mut self, chunk_hits: ChunkHits) {
        for (marker, count) in &chunk_hits.markers {
            *self.payroll_markers.entry(*marker).or_insert(0) += count;
        }
        self.record(chunk_hits.hits);
    }

    pub fn total_found(&self) -> usize {
        self.total
    }

    /// Most frequent keywords, ties broken alphabetically
    pub fn top_keywords(&self) -> Vec<(&'static str, usize)> {
        let mut ranked: Vec<(&'static str, usize)> =
            self.counts.iter().map(|(k, v)| (*k, *v)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.top_k);
        ranked
    }

    pub fn summary(&self) -> ConceptSummary {
        ConceptSummary {
            mode: self.mode,
            total_found: self.total,
            top_keywords: self
                .top_keywords()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            by_category: self.by_category.clone(),
            samples: self.samples.clone(),
            payroll_markers: self
                .payroll_markers
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

/// Map bytes to text one-to-one so that byte offsets stay valid.
/// Non-ASCII bytes become spaces.
fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { ' ' })
        .collect()
}

fn on_word_boundary(text: &[u8], start: usize, end: usize) -> bool {
    let before = start == 0 || !text[start - 1].is_ascii_alphanumeric();
    let after = end >= text.len() || !text[end].is_ascii_alphanumeric();
    before && after
}

/// Up to [`CONTEXT_BEFORE`] characters before `start` and [`CONTEXT_AFTER`]
/// from it, with line breaks and control bytes flattened to spaces
pub fn context_window(text: &str, start: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_BEFORE);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (start + CONTEXT_AFTER).min(text.len());
    while !text.is_char_boundary(to) {
        to -= 1;
    }

    let flattened: String = text[from..to]
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    flattened.trim().chars().take(CONTEXT_MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunter(mode: HuntMode) -> ConceptHunter {
        ConceptHunter::new(mode, false, 5, 20)
    }

    #[test]
    fn test_keyword_in_string() {
        let mut hunter = hunter(HuntMode::Strings);
        hunter.hunt_string("pago en efectivo urgente");

        let summary = hunter.summary();
        assert_eq!(summary.total_found, 1);
        let hit = &summary.samples[0];
        assert_eq!(hit.keyword, "efectivo");
        assert_eq!(hit.category, KeywordCategory::UnsupportedEntry);
        assert_eq!(hit.context, "pago en efectivo urgente");
        assert!(hit.context.len() <= CONTEXT_MAX);
    }

    #[test]
    fn test_case_insensitive_and_counts() {
        let mut hunter = hunter(HuntMode::Strings);
        hunter.hunt_string("MULTA por Recargo");
        hunter.hunt_string("otra multa");
        let top = hunter.top_keywords();
        assert_eq!(top[0], ("multa", 2));
        assert_eq!(top[1], ("recargo", 1));
        assert_eq!(hunter.summary().by_category[&KeywordCategory::TaxPenalty], 3);
    }

    #[test]
    fn test_substring_matching_is_default() {
        let mut hunter = hunter(HuntMode::Strings);
        hunter.hunt_string("reajusteX");
        assert_eq!(hunter.total_found(), 1);

        let mut strict = ConceptHunter::new(HuntMode::Strings, true, 5, 20);
        strict.hunt_string("reajusteX");
        strict.hunt_string("un ajuste manual");
        assert_eq!(strict.total_found(), 1);
    }

    #[test]
    fn test_context_is_truncated() {
        let text = format!("{}finiquito{}", "x".repeat(50), "y".repeat(80));
        let context = context_window(&text, 50);
        assert_eq!(context.len(), CONTEXT_MAX);
        assert!(context.starts_with(&"x".repeat(20)));
        assert!(context.contains("finiquito"));
    }

    #[test]
    fn test_context_flattens_newlines() {
        let context = context_window("linea uno\nbono anual\r\n", 10);
        assert_eq!(context, "linea uno bono anual");
    }

    #[test]
    fn test_payroll_chunk_scan() {
        let hunter = hunter(HuntMode::Payroll);
        let data = b"\x00EMP01 Pago ASIMILADOS\xff sueldo base; finiquito y SUELDO".to_vec();
        let chunk = RawChunk::new(0, 0, data, 0, true);
        let found = hunter.scan_chunk(&chunk).unwrap();
        let keywords: Vec<&str> = found.hits.iter().map(|h| h.keyword).collect();
        assert_eq!(keywords, vec!["asimilados", "finiquito"]);
        assert!(found.markers.contains(&("sueldo", 2)));
        assert!(found.hits[0].context.contains("pago asimilados"));
    }

    #[test]
    fn test_payroll_scan_respects_carry() {
        let hunter = hunter(HuntMode::Payroll);
        // "bono" sits entirely inside the 8-byte carried prefix
        let chunk = RawChunk::new(1, 0, b"xx bono efectivo".to_vec(), 8, true);
        let found = hunter.scan_chunk(&chunk).unwrap();
        let keywords: Vec<&str> = found.hits.iter().map(|h| h.keyword).collect();
        assert_eq!(keywords, vec!["efectivo"]);
    }

    #[test]
    fn test_strings_mode_skips_chunk_scan() {
        let chunk = RawChunk::new(0, 0, b"efectivo".to_vec(), 0, true);
        assert!(hunter(HuntMode::Strings).scan_chunk(&chunk).is_none());
    }

    #[test]
    fn test_sample_limit() {
        let mut hunter = ConceptHunter::new(HuntMode::Strings, false, 5, 2);
        for _ in 0..5 {
            hunter.hunt_string("donativo");
        }
        let summary = hunter.summary();
        assert_eq!(summary.total_found, 5);
        assert_eq!(summary.samples.len(), 2);
    }
}
