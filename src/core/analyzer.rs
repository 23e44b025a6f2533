/// Backup analysis pipeline
///
/// This file contains the BackupAnalyzer which drives a single backup
/// through the scanner, the pattern rules and the accumulator, then hands
/// the collected samples to the statistical analyzers and the report
/// aggregator.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rust_decimal::Decimal;

use crate::collaborators::classifier::{classify_identifiers, RiskClassifier};
use crate::collaborators::records::RecordSource;
use crate::config::{ConfigError, FallbackPattern, HuntMode, ScanConfig};
use crate::core::accumulator::{Accumulator, AmountSource, FallbackPolicy};
use crate::core::benford;
use crate::core::concepts::{ChunkHits, ConceptHunter};
use crate::core::patterns::{ExtractedDate, Extraction, OpenRun, PatternRuleSet};
use crate::core::report::{self, AnalysisReport, SourceInfo};
use crate::core::round_numbers;
use crate::core::scanner::{ChunkScanner, RawChunk, ScanError};

/// Everything the parallel matchers found in one chunk
struct ChunkMatches {
    identifiers: Extraction<String>,
    specific: Extraction<Decimal>,
    dates: Extraction<ExtractedDate>,
    strings: Extraction<String>,
    table_markers: Vec<(&'static str, usize)>,
    payroll: Option<ChunkHits>,
}

/// What the scan loop learned about the file itself
struct ScanSummary {
    file_len: u64,
    truncated: bool,
}

/// Pipeline driver for one scan configuration
pub struct BackupAnalyzer {
    /// Validated scan options
    config: ScanConfig,

    /// Compiled pattern rules
    rules: PatternRuleSet,

    /// Optional structured records merged before the byte scan
    records: Option<Box<dyn RecordSource + Send + Sync>>,

    /// Optional external risk classification service
    classifier: Option<Arc<dyn RiskClassifier>>,

    progress: Option<ProgressBar>,
}

impl BackupAnalyzer {
    /// Create a new BackupAnalyzer
    ///
    /// # Arguments
    ///
    /// * `config` - Scan options
    ///
    /// # Returns
    ///
    /// The analyzer, or a configuration error when the options cannot work,
    /// e.g. a chunk smaller than the longest pattern
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let rules = PatternRuleSet::new(&config)?;

        let carry_len = rules.max_pattern_len();
        if config.chunk_size_bytes < carry_len {
            return Err(ConfigError::ChunkSmallerThanPattern {
                chunk: config.chunk_size_bytes,
                pattern: carry_len,
            }
            .into());
        }

        Ok(Self {
            config,
            rules,
            records: None,
            classifier: None,
            progress: None,
        })
    }

    pub fn with_records<R>(mut self, source: R) -> Self
    where
        R: RecordSource + Send + Sync + 'static,
    {
        self.records = Some(Box::new(source));
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RiskClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Report scanned bytes to a progress bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Analyze one backup file
    ///
    /// # Arguments
    ///
    /// * `path` - Backup file to scan
    ///
    /// # Returns
    ///
    /// The finished report. Only an unreadable file is an error; empty
    /// categories and collaborator failures show up inside the report.
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisReport, ScanError> {
        info!("Analyzing backup: {}", path.display());
        let start_time = Instant::now();

        let mut accumulator = Accumulator::from_config(&self.config);
        let mut hunter = ConceptHunter::from_config(&self.config);

        self.ingest_records(&mut accumulator);
        let summary = self.extract(path, &mut accumulator, &mut hunter)?;

        let amounts = accumulator.amounts();
        let (benford, round_numbers) = rayon::join(
            || benford::analyze(&amounts),
            || round_numbers::analyze(&amounts),
        );

        let identifiers: Vec<String> = accumulator.identifiers().iter().cloned().collect();
        let classification = classify_identifiers(
            self.classifier.as_deref(),
            &identifiers,
            self.config.identifier_sample,
        );

        let report = report::aggregate(
            SourceInfo::new(path, summary.file_len, &self.config, summary.truncated),
            &accumulator,
            benford,
            round_numbers,
            hunter.summary(),
            classification,
            self.config.identifier_sample,
        );

        info!(
            "Analysis of {} completed in {:?}: {} identifiers, {} amounts, {} keyword hits",
            path.display(),
            start_time.elapsed(),
            report.statistics.total_identifiers,
            report.statistics.total_amounts,
            report.suspicious_concepts.total_found
        );

        Ok(report)
    }

    fn ingest_records(&self, accumulator: &mut Accumulator) {
        let Some(source) = &self.records else {
            return;
        };
        match source.load_records() {
            Ok(records) => {
                info!("Merging {} structured records", records.len());
                accumulator.ingest_records(&records);
            }
            Err(e) => warn!("Structured records unavailable, continuing with byte scan only: {}", e),
        }
    }

    /// Stream the file through the matchers
    ///
    /// A reader thread prefetches the next chunk while the current one is
    /// matched; the channel holds at most one chunk so memory stays bounded.
    fn extract(
        &self,
        path: &Path,
        accumulator: &mut Accumulator,
        hunter: &mut ConceptHunter,
    ) -> Result<ScanSummary, ScanError> {
        let carry_len = self.rules.max_pattern_len();
        let mut scanner = ChunkScanner::open(
            path,
            self.config.chunk_size_bytes,
            self.config.max_chunks,
            carry_len,
        )?;
        let file_len = scanner.file_len();
        let policy = FallbackPolicy::new(self.config.amount_fallback_threshold);

        if let Some(progress) = &self.progress {
            progress.set_length(file_len.min(self.config.byte_budget()));
        }

        let (tx, rx) = mpsc::sync_channel::<Result<RawChunk, ScanError>>(1);

        let truncated = thread::scope(|scope| -> Result<bool, ScanError> {
            let reader = scope.spawn(move || {
                for chunk in scanner.by_ref() {
                    let failed = chunk.is_err();
                    if tx.send(chunk).is_err() || failed {
                        break;
                    }
                }
                scanner.budget_exhausted()
            });

            let mut outcome = Ok(());
            let mut open_run = OpenRun::default();
            for chunk in rx.iter() {
                match chunk {
                    Ok(chunk) => {
                        self.process_chunk(&chunk, &open_run, accumulator, hunter, &policy);
                        let next_start = chunk.bytes().len().saturating_sub(carry_len);
                        open_run = self.rules.open_run_at(&chunk, open_run, next_start);
                        if let Some(progress) = &self.progress {
                            progress.inc(chunk.new_len() as u64);
                        }
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            drop(rx);

            let budget_exhausted = reader.join().map_err(|_| ScanError::ReaderPanicked)?;
            outcome.map(|_| budget_exhausted)
        })?;

        if truncated {
            warn!(
                "{}: chunk budget of {} reached, the rest of the file was not scanned",
                path.display(),
                self.config.max_chunks
            );
        }

        Ok(ScanSummary { file_len, truncated })
    }

    /// Run every category matcher over a chunk in parallel
    fn match_chunk(
        &self,
        chunk: &RawChunk,
        open_run: &OpenRun,
        hunter: &ConceptHunter,
    ) -> ChunkMatches {
        let rules = &self.rules;
        let ((identifiers, specific), ((dates, strings), (table_markers, payroll))) = rayon::join(
            || {
                rayon::join(
                    || rules.find_identifiers(chunk),
                    || rules.find_specific_amounts(chunk),
                )
            },
            || {
                rayon::join(
                    || rayon::join(|| rules.find_dates(chunk), || rules.find_strings(chunk, open_run)),
                    || rayon::join(|| rules.count_table_markers(chunk), || hunter.scan_chunk(chunk)),
                )
            },
        );

        ChunkMatches {
            identifiers,
            specific,
            dates,
            strings,
            table_markers,
            payroll,
        }
    }

    /// Match one chunk and fold the results into the accumulator
    ///
    /// Only the calling thread writes to the accumulator and the hunter.
    pub(crate) fn process_chunk(
        &self,
        chunk: &RawChunk,
        open_run: &OpenRun,
        accumulator: &mut Accumulator,
        hunter: &mut ConceptHunter,
        policy: &FallbackPolicy,
    ) {
        let matches = self.match_chunk(chunk, open_run, hunter);

        record_skips(accumulator, &matches.identifiers);
        record_skips(accumulator, &matches.specific);
        record_skips(accumulator, &matches.dates);
        record_skips(accumulator, &matches.strings);

        for found in &matches.identifiers.found {
            accumulator.insert_identifier(found.value.clone());
        }
        for value in matches.specific.values() {
            accumulator.insert_amount(*value, AmountSource::Specific);
        }

        let fallback_ran = policy.should_use_fallback(accumulator.amount_count());
        if fallback_ran {
            let exclude = self.rules.specific_amount_spans(chunk);
            let (fallback, source) = match self.config.fallback_pattern {
                FallbackPattern::Generic => (
                    self.rules.find_generic_amounts(chunk, &exclude),
                    AmountSource::Generic,
                ),
                FallbackPattern::Strict => (
                    self.rules.find_strict_amounts(chunk, &exclude),
                    AmountSource::Strict,
                ),
            };
            record_skips(accumulator, &fallback);
            for value in fallback.values() {
                accumulator.insert_amount(*value, source);
            }
        }

        for found in matches.dates.found {
            accumulator.insert_date(found.value);
        }

        for found in matches.strings.found {
            if hunter.mode() == HuntMode::Strings {
                hunter.hunt_string(&found.value);
            }
            accumulator.insert_string(found.value);
        }

        for (marker, count) in matches.table_markers {
            accumulator.add_table_marker(marker, count);
        }
        if let Some(hits) = matches.payroll {
            hunter.record_chunk_hits(hits);
        }

        accumulator.record_chunk(chunk.new_len(), fallback_ran);

        debug!(
            "Chunk {} at offset {}: {} new bytes, {} unique amounts, fallback {}",
            chunk.index(),
            chunk.offset(),
            chunk.new_len(),
            accumulator.amount_count(),
            if fallback_ran { "on" } else { "off" }
        );
    }
}

fn record_skips<T>(accumulator: &mut Accumulator, extraction: &Extraction<T>) {
    accumulator.record_skips(extraction.decode_skips, extraction.rejected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patterns::KeywordCategory;

    fn analyzer(config: ScanConfig) -> BackupAnalyzer {
        BackupAnalyzer::new(config).unwrap()
    }

    fn run(analyzer: &BackupAnalyzer, chunks: &[&[u8]]) -> (Accumulator, ConceptHunter) {
        let mut acc = Accumulator::from_config(analyzer.config());
        let mut hunter = ConceptHunter::from_config(analyzer.config());
        let policy = FallbackPolicy::new(analyzer.config().amount_fallback_threshold);
        for (i, data) in chunks.iter().enumerate() {
            let chunk = RawChunk::new(i, 0, data.to_vec(), 0, i + 1 == chunks.len());
            analyzer.process_chunk(&chunk, &OpenRun::Closed, &mut acc, &mut hunter, &policy);
        }
        (acc, hunter)
    }

    #[test]
    fn test_chunk_smaller_than_pattern_is_rejected() {
        let config = ScanConfig {
            chunk_size_bytes: 64,
            ..ScanConfig::default()
        };
        let err = BackupAnalyzer::new(config).err().unwrap();
        assert!(matches!(
            err,
            ScanError::Config(ConfigError::ChunkSmallerThanPattern { chunk: 64, pattern: 100 })
        ));
    }

    #[test]
    fn test_huge_string_bound_is_a_config_error() {
        let config = ScanConfig {
            string_max_len: usize::MAX,
            ..ScanConfig::default()
        };
        let err = BackupAnalyzer::new(config).err().unwrap();
        assert!(matches!(
            err,
            ScanError::Config(ConfigError::ChunkSmallerThanPattern { pattern: usize::MAX, .. })
        ));
    }

    #[test]
    fn test_fallback_runs_below_threshold() {
        let analyzer = analyzer(ScanConfig::default());
        let (acc, _) = run(&analyzer, &[br#"Total="1160.00" suelto 348.80 y 12.50"#]);
        assert_eq!(acc.amount_count(), 3);
        assert_eq!(acc.amounts_by_source()[&AmountSource::Generic], 2);
        assert_eq!(acc.counters().fallback_chunks, 1);
    }

    #[test]
    fn test_fallback_disabled_once_threshold_met() {
        let config = ScanConfig {
            amount_fallback_threshold: 2,
            ..ScanConfig::default()
        };
        let analyzer = analyzer(config);
        let (acc, _) = run(
            &analyzer,
            &[br#"Total="10.50" Importe="20.75" suelto 348.80"#, b"otro 99.99"],
        );
        assert_eq!(acc.amount_count(), 2);
        assert!(!acc.amounts_by_source().contains_key(&AmountSource::Generic));
        assert_eq!(acc.counters().fallback_chunks, 0);
    }

    #[test]
    fn test_strict_fallback_pattern() {
        let config = ScanConfig {
            fallback_pattern: FallbackPattern::Strict,
            ..ScanConfig::default()
        };
        let analyzer = analyzer(config);
        let (acc, _) = run(&analyzer, &[b"pago 0.50 y 1234.567 y 77.10"]);
        let values: Vec<String> = acc.amounts().iter().map(|d| d.to_string()).collect();
        assert_eq!(values, vec!["0.5", "77.1"]);
        assert_eq!(acc.amounts_by_source()[&AmountSource::Strict], 2);
    }

    #[test]
    fn test_strings_feed_concept_hunter() {
        let analyzer = analyzer(ScanConfig::default());
        let (acc, hunter) = run(&analyzer, &[b"\x00\x01pago en efectivo urgente\x02XAXX010101000\x00"]);
        assert_eq!(hunter.total_found(), 1);
        assert_eq!(
            hunter.summary().by_category[&KeywordCategory::UnsupportedEntry],
            1
        );
        assert!(acc.identifiers().contains("XAXX010101000"));
        assert_eq!(acc.strings().len(), 2);
    }

    #[test]
    fn test_payroll_mode_reads_chunk_text() {
        let config = ScanConfig {
            hunt_mode: HuntMode::Payroll,
            ..ScanConfig::default()
        };
        let analyzer = analyzer(config);
        let (_, hunter) = run(&analyzer, &[b"\xffNOMINA\x00asimilados\x00SUELDO\x00pago en efectivo"]);
        let summary = hunter.summary();
        assert_eq!(summary.total_found, 2);
        assert_eq!(summary.payroll_markers["sueldo"], 1);
        assert_eq!(summary.by_category[&KeywordCategory::PayrollRisk], 2);
    }
}
