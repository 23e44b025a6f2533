//! Analysis report
//!
//! The report is the only thing that leaves the pipeline. It is assembled
//! once from the analyzer outputs and a read-only view of the accumulator
//! and never mutated afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::collaborators::classifier::ClassificationSection;
use crate::config::{FallbackPattern, HuntMode, ScanConfig};
use crate::core::accumulator::{Accumulator, AmountSource, ExtractedAmount};
use crate::core::benford::BenfordAnalysis;
use crate::core::concepts::ConceptSummary;
use crate::core::round_numbers::RoundNumberAnalysis;
use crate::core::RiskLevel;

/// Largest amounts listed in the extracted samples
pub const AMOUNT_SAMPLE: usize = 100;

/// Printable strings listed in the extracted samples
pub const STRING_SAMPLE: usize = 50;

/// What was scanned and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub path: String,
    pub file_size: u64,
    pub analyzed_at: String,
    pub chunk_size_bytes: usize,
    pub max_chunks: usize,
    pub hunt_mode: HuntMode,
    pub fallback_pattern: FallbackPattern,
    /// The chunk budget ran out before end of file
    pub truncated: bool,
    pub tool_version: String,
}

impl SourceInfo {
    pub fn new(path: &Path, file_size: u64, config: &ScanConfig, truncated: bool) -> Self {
        Self {
            path: path.display().to_string(),
            file_size,
            analyzed_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            chunk_size_bytes: config.chunk_size_bytes,
            max_chunks: config.max_chunks,
            hunt_mode: config.hunt_mode,
            fallback_pattern: config.fallback_pattern,
            truncated,
            tool_version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_identifiers: usize,
    pub natural_person_identifiers: usize,
    pub total_amounts: usize,
    pub amounts_by_source: BTreeMap<AmountSource, usize>,
    pub avg_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub total_dates: usize,
    pub strings_seen: usize,
    pub strings_retained: usize,
    pub bytes_scanned: u64,
    pub chunks_scanned: usize,
    pub fallback_chunks: usize,
    pub decode_skips: usize,
    pub rejected_candidates: usize,
    pub dates_dropped: usize,
    pub strings_dropped: usize,
    pub records_ingested: usize,
    pub table_markers: BTreeMap<String, usize>,
}

/// Bounded samples of the extracted data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedSamples {
    pub identifiers: Vec<String>,
    pub dates: Vec<String>,
    pub amounts: Vec<ExtractedAmount>,
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub source: SourceInfo,
    /// Highest tier reported by the statistical analyzers
    pub overall_risk: Option<RiskLevel>,
    pub benford_analysis: BenfordAnalysis,
    pub round_numbers: RoundNumberAnalysis,
    pub suspicious_concepts: ConceptSummary,
    pub statistics: Statistics,
    pub extracted: ExtractedSamples,
    pub risk_classification: ClassificationSection,
}

impl AnalysisReport {
    /// Whether any amount was available to the statistical analyzers
    pub fn has_amounts(&self) -> bool {
        self.statistics.total_amounts > 0
    }
}

/// Merge analyzer outputs and the accumulator summary into a report
pub fn aggregate(
    source: SourceInfo,
    accumulator: &Accumulator,
    benford: BenfordAnalysis,
    round_numbers: RoundNumberAnalysis,
    concepts: ConceptSummary,
    classification: ClassificationSection,
    identifier_sample: usize,
) -> AnalysisReport {
    let overall_risk = [
        benford.result().map(|r| r.risk_score),
        round_numbers.result().map(|r| r.risk_level),
    ]
    .into_iter()
    .flatten()
    .max();

    AnalysisReport {
        source,
        overall_risk,
        benford_analysis: benford,
        round_numbers,
        suspicious_concepts: concepts,
        statistics: statistics(accumulator),
        extracted: samples(accumulator, identifier_sample),
        risk_classification: classification,
    }
}

fn statistics(accumulator: &Accumulator) -> Statistics {
    let amounts = accumulator.amounts();
    let counters = accumulator.counters();

    let avg_amount = if amounts.is_empty() {
        None
    } else {
        let sum: Decimal = amounts.iter().sum();
        Some((sum / Decimal::from(amounts.len())).round_dp(2))
    };

    Statistics {
        total_identifiers: accumulator.identifiers().len(),
        natural_person_identifiers: accumulator.natural_person_count(),
        total_amounts: amounts.len(),
        amounts_by_source: accumulator.amounts_by_source(),
        avg_amount,
        min_amount: amounts.first().copied(),
        max_amount: amounts.last().copied(),
        total_dates: accumulator.dates().len(),
        strings_seen: counters.strings_seen,
        strings_retained: accumulator.strings().len(),
        bytes_scanned: counters.bytes_scanned,
        chunks_scanned: counters.chunks_scanned,
        fallback_chunks: counters.fallback_chunks,
        decode_skips: counters.decode_skips,
        rejected_candidates: counters.rejected_candidates,
        dates_dropped: counters.dates_dropped,
        strings_dropped: counters.strings_dropped,
        records_ingested: counters.records_ingested,
        table_markers: accumulator.table_markers().clone(),
    }
}

fn samples(accumulator: &Accumulator, identifier_sample: usize) -> ExtractedSamples {
    let mut amounts = accumulator.extracted_amounts();
    amounts.reverse();
    amounts.truncate(AMOUNT_SAMPLE);

    ExtractedSamples {
        identifiers: accumulator
            .identifiers()
            .iter()
            .take(identifier_sample)
            .cloned()
            .collect(),
        dates: accumulator.dates().iter().map(|d| d.text.clone()).collect(),
        amounts,
        strings: accumulator.strings().iter().take(STRING_SAMPLE).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::concepts::ConceptHunter;
    use crate::core::{benford, round_numbers};
    use std::str::FromStr;

    fn source() -> SourceInfo {
        SourceInfo::new(Path::new("empresa.bak"), 0, &ScanConfig::default(), false)
    }

    fn skipped() -> ClassificationSection {
        ClassificationSection::Skipped {
            reason: "no classifier configured".to_string(),
        }
    }

    #[test]
    fn test_empty_accumulator_gives_sparse_report() {
        let acc = Accumulator::new(10, 10);
        let hunter = ConceptHunter::new(HuntMode::Strings, false, 5, 20);
        let report = aggregate(
            source(),
            &acc,
            benford::analyze(&acc.amounts()),
            round_numbers::analyze(&acc.amounts()),
            hunter.summary(),
            skipped(),
            50,
        );

        assert_eq!(report.benford_analysis, BenfordAnalysis::NoData);
        assert_eq!(report.round_numbers, RoundNumberAnalysis::NoData);
        assert_eq!(report.overall_risk, None);
        assert!(report.statistics.avg_amount.is_none());
        assert!(!report.has_amounts());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["benford_analysis"]["status"], "no_data");
        assert_eq!(json["round_numbers"]["status"], "no_data");
        assert_eq!(json["risk_classification"]["status"], "skipped");
        assert_eq!(json["suspicious_concepts"]["total_found"], 0);
    }

    #[test]
    fn test_statistics_and_samples() {
        let mut acc = Accumulator::new(10, 10);
        for value in ["10.00", "20.00", "30.00", "5.50"] {
            acc.insert_amount(Decimal::from_str(value).unwrap(), AmountSource::Specific);
        }
        acc.insert_identifier("TEJ2304191I0".into());
        acc.insert_identifier("GODE561231GR8".into());

        let report = aggregate(
            source(),
            &acc,
            benford::analyze(&acc.amounts()),
            round_numbers::analyze(&acc.amounts()),
            ConceptHunter::new(HuntMode::Strings, false, 5, 20).summary(),
            skipped(),
            1,
        );

        let stats = &report.statistics;
        assert_eq!(stats.total_amounts, 4);
        assert_eq!(stats.avg_amount, Some(Decimal::from_str("16.38").unwrap()));
        assert_eq!(stats.min_amount, Some(Decimal::from_str("5.5").unwrap()));
        assert_eq!(stats.max_amount, Some(Decimal::from(30)));
        assert_eq!(stats.natural_person_identifiers, 1);
        assert_eq!(report.extracted.identifiers.len(), 1);
        assert_eq!(report.extracted.amounts[0].value, Decimal::from(30));
        assert_eq!(report.overall_risk, Some(RiskLevel::High));
    }
}
