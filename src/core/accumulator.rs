//! Extraction accumulator
//!
//! Holds everything extracted from a backup. Identifiers and amounts are
//! sets; dates and strings are capped sequences that saturate instead of
//! evicting. The accumulator has a single writer: the pipeline driver
//! inserts each chunk's candidates after matching has finished.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collaborators::records::TransactionRecord;
use crate::config::ScanConfig;
use crate::core::patterns::{self, ExtractedDate};

/// Where an amount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSource {
    /// `Key="digits.digits"` attribute
    Specific,
    /// Bare number picked up by the fallback pattern
    Generic,
    /// Isolated two-decimal number picked up by the strict fallback pattern
    Strict,
    /// Typed record supplied by a structured parser
    Structured,
}

/// A deduplicated amount with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractedAmount {
    pub value: Decimal,
    pub source: AmountSource,
}

/// Decides whether the low-confidence amount pattern also runs.
///
/// The count passed in is the running number of unique amounts collected
/// so far in the whole scan, so once structured matches are plentiful the
/// fallback stays off for the rest of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    threshold: usize,
}

impl FallbackPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn should_use_fallback(&self, specific_count: usize) -> bool {
        specific_count < self.threshold
    }
}

/// Running counters kept alongside the extracted data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionCounters {
    pub bytes_scanned: u64,
    pub chunks_scanned: usize,
    /// Matches skipped because the span was not valid text
    pub decode_skips: usize,
    /// Matches dropped by a validity predicate
    pub rejected_candidates: usize,
    /// Chunks on which the fallback amount pattern ran
    pub fallback_chunks: usize,
    /// Printable strings seen, retained or not
    pub strings_seen: usize,
    pub dates_dropped: usize,
    pub strings_dropped: usize,
    pub records_ingested: usize,
}

/// Deduplicating, bounded store of extracted samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    identifiers: BTreeSet<String>,
    amounts: BTreeMap<Decimal, AmountSource>,
    dates: Vec<ExtractedDate>,
    seen_dates: HashSet<String>,
    max_dates: usize,
    strings: Vec<String>,
    max_strings: usize,
    table_markers: BTreeMap<String, usize>,
    counters: ExtractionCounters,
}

impl Accumulator {
    pub fn new(max_dates: usize, max_strings: usize) -> Self {
        Self {
            identifiers: BTreeSet::new(),
            amounts: BTreeMap::new(),
            dates: Vec::new(),
            seen_dates: HashSet::new(),
            max_dates,
            strings: Vec::new(),
            max_strings,
            table_markers: BTreeMap::new(),
            counters: ExtractionCounters::default(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.max_dates, config.max_strings)
    }

    /// Add an identifier; returns false when it was already known
    pub fn insert_identifier(&mut self, identifier: String) -> bool {
        self.identifiers.insert(identifier)
    }

    /// Add an amount keyed by value; the first provenance recorded wins
    pub fn insert_amount(&mut self, value: Decimal, source: AmountSource) -> bool {
        if value <= Decimal::ZERO {
            self.counters.rejected_candidates += 1;
            return false;
        }
        let key = value.normalize();
        if self.amounts.contains_key(&key) {
            return false;
        }
        self.amounts.insert(key, source);
        true
    }

    /// Add a date unless already seen or the cap is reached
    pub fn insert_date(&mut self, date: ExtractedDate) -> bool {
        if self.seen_dates.contains(&date.text) {
            return false;
        }
        if self.dates.len() >= self.max_dates {
            self.counters.dates_dropped += 1;
            return false;
        }
        self.seen_dates.insert(date.text.clone());
        self.dates.push(date);
        true
    }

    /// Keep a printable string sample unless the cap is reached
    pub fn insert_string(&mut self, text: String) -> bool {
        self.counters.strings_seen += 1;
        if self.strings.len() >= self.max_strings {
            self.counters.strings_dropped += 1;
            return false;
        }
        self.strings.push(text);
        true
    }

    pub fn add_table_marker(&mut self, marker: &str, count: usize) {
        *self.table_markers.entry(marker.to_string()).or_insert(0) += count;
    }

    pub fn record_chunk(&mut self, new_bytes: usize, fallback_ran: bool) {
        self.counters.bytes_scanned += new_bytes as u64;
        self.counters.chunks_scanned += 1;
        if fallback_ran {
            self.counters.fallback_chunks += 1;
        }
    }

    pub fn record_skips(&mut self, decode_skips: usize, rejected: usize) {
        self.counters.decode_skips += decode_skips;
        self.counters.rejected_candidates += rejected;
    }

    /// Merge amounts and identifiers supplied by a structured record parser
    ///
    /// Records are higher-confidence than byte patterns, so their amounts
    /// enter the same set the statistics run on. Identifiers that do not
    /// follow the RFC grammar are dropped.
    pub fn ingest_records(&mut self, records: &[TransactionRecord]) {
        for record in records {
            self.counters.records_ingested += 1;
            for identifier in [&record.issuer_id, &record.receiver_id].into_iter().flatten() {
                let identifier = identifier.trim().to_uppercase();
                if patterns::is_identifier(&identifier) {
                    self.insert_identifier(identifier);
                } else {
                    self.counters.rejected_candidates += 1;
                }
            }
            for amount in [record.total, record.subtotal].into_iter().flatten() {
                self.insert_amount(amount, AmountSource::Structured);
            }
        }
    }

    /// Number of unique amounts collected so far
    pub fn amount_count(&self) -> usize {
        self.amounts.len()
    }

    /// Unique amount values in ascending order
    pub fn amounts(&self) -> Vec<Decimal> {
        self.amounts.keys().copied().collect()
    }

    pub fn extracted_amounts(&self) -> Vec<ExtractedAmount> {
        self.amounts
            .iter()
            .map(|(value, source)| ExtractedAmount {
                value: *value,
                source: *source,
            })
            .collect()
    }

    pub fn amounts_by_source(&self) -> BTreeMap<AmountSource, usize> {
        let mut counts = BTreeMap::new();
        for source in self.amounts.values() {
            *counts.entry(*source).or_insert(0) += 1;
        }
        counts
    }

    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// Identifiers with a four-letter prefix, i.e. individuals rather than companies
    pub fn natural_person_count(&self) -> usize {
        self.identifiers.iter().filter(|id| id.len() == 13).count()
    }

    pub fn dates(&self) -> &[ExtractedDate] {
        &self.dates
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn table_markers(&self) -> &BTreeMap<String, usize> {
        &self.table_markers
    }

    pub fn counters(&self) -> &ExtractionCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patterns::{parse_amount, parse_date, DateFormat};

    fn dec(text: &str) -> Decimal {
        parse_amount(text).unwrap()
    }

    fn date(text: &str) -> ExtractedDate {
        ExtractedDate {
            text: text.to_string(),
            date: parse_date(text, DateFormat::Iso).unwrap(),
            format: DateFormat::Iso,
        }
    }

    #[test]
    fn test_fallback_policy() {
        let policy = FallbackPolicy::new(100);
        assert!(policy.should_use_fallback(0));
        assert!(policy.should_use_fallback(99));
        assert!(!policy.should_use_fallback(100));
        assert!(!FallbackPolicy::new(0).should_use_fallback(0));
    }

    #[test]
    fn test_amounts_dedup_by_value() {
        let mut acc = Accumulator::new(10, 10);
        assert!(acc.insert_amount(dec("10.00"), AmountSource::Specific));
        assert!(!acc.insert_amount(dec("10.0"), AmountSource::Generic));
        assert!(!acc.insert_amount(Decimal::ZERO, AmountSource::Generic));
        assert!(acc.insert_amount(dec("5.50"), AmountSource::Generic));
        assert_eq!(acc.amount_count(), 2);
        assert_eq!(acc.amounts_by_source()[&AmountSource::Specific], 1);
    }

    #[test]
    fn test_dates_saturate_without_eviction() {
        let mut acc = Accumulator::new(2, 10);
        assert!(acc.insert_date(date("2024-01-01")));
        assert!(!acc.insert_date(date("2024-01-01")));
        assert!(acc.insert_date(date("2024-01-02")));
        assert!(!acc.insert_date(date("2024-01-03")));
        let texts: Vec<&str> = acc.dates().iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(acc.counters().dates_dropped, 1);
    }

    #[test]
    fn test_strings_saturate() {
        let mut acc = Accumulator::new(2, 1);
        assert!(acc.insert_string("primer concepto".into()));
        assert!(!acc.insert_string("segundo concepto".into()));
        assert_eq!(acc.strings(), &["primer concepto".to_string()]);
        assert_eq!(acc.counters().strings_seen, 2);
    }

    #[test]
    fn test_ingest_records() {
        let mut acc = Accumulator::new(10, 10);
        acc.insert_amount(dec("1160"), AmountSource::Specific);
        let records = vec![TransactionRecord {
            uuid: Some("A1B2".into()),
            issuer_id: Some("TEJ2304191I0".into()),
            receiver_id: Some("not an rfc".into()),
            total: Some(dec("1160.00")),
            subtotal: Some(dec("1000.00")),
            date: None,
        }];
        acc.ingest_records(&records);
        assert!(acc.identifiers().contains("TEJ2304191I0"));
        assert_eq!(acc.identifiers().len(), 1);
        assert_eq!(acc.amount_count(), 2);
        assert_eq!(acc.amounts_by_source()[&AmountSource::Structured], 1);
        assert_eq!(acc.counters().records_ingested, 1);
    }

    #[test]
    fn test_natural_person_count() {
        let mut acc = Accumulator::new(1, 1);
        acc.insert_identifier("GODE561231GR8".into());
        acc.insert_identifier("TEJ2304191I0".into());
        assert_eq!(acc.natural_person_count(), 1);
    }
}
