/// Backup Forensics - statistical anomaly detection for raw accounting backups
///
/// This library scans opaque binary backup files for tax identifiers,
/// monetary amounts, dates and free text, and runs first-digit, round-number
/// and keyword tests over what it finds.

pub mod collaborators;
pub mod config;
pub mod core;
pub mod utils;

// Re-export main analyzer types for convenience
pub use crate::config::{load_config, ScanConfig};
pub use crate::core::analyzer::BackupAnalyzer;
pub use crate::core::report::AnalysisReport;
pub use crate::core::scanner::ScanError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Analyze a single backup file and return the report
///
/// This is a convenience function for simple use cases.
///
/// # Arguments
///
/// * `file_path` - Path to the backup to analyze
/// * `config` - Scan options
///
/// # Returns
///
/// The analysis report
pub fn analyze_file<P: AsRef<std::path::Path>>(
    file_path: P,
    config: &ScanConfig,
) -> anyhow::Result<AnalysisReport> {
    use anyhow::Context;

    let file_path = file_path.as_ref();
    let analyzer = BackupAnalyzer::new(config.clone())?;
    analyzer
        .analyze_file(file_path)
        .with_context(|| format!("analysis of {} failed", file_path.display()))
}

/// Command-line application functionality
pub mod app {
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::Context;

    use crate::collaborators::classifier::RiskClassifier;
    use crate::collaborators::records::JsonRecordFile;
    use crate::config::ScanConfig;
    use crate::core::analyzer::BackupAnalyzer;
    use crate::core::report::AnalysisReport;

    /// Run the analyzer on multiple files, one pipeline per file
    ///
    /// # Arguments
    ///
    /// * `file_paths` - Backups to analyze
    /// * `config` - Scan options shared by every file
    /// * `records` - Optional JSON file of structured records
    /// * `classifier` - Optional risk classification service
    ///
    /// # Returns
    ///
    /// A report per file, in input order
    pub fn run_analyzer<P: AsRef<Path>>(
        file_paths: &[P],
        config: &ScanConfig,
        records: Option<&Path>,
        classifier: Option<Arc<dyn RiskClassifier>>,
    ) -> anyhow::Result<Vec<(String, AnalysisReport)>> {
        let mut results = Vec::new();

        for file_path in file_paths {
            let file_path = file_path.as_ref();
            let mut analyzer = BackupAnalyzer::new(config.clone())?;
            if let Some(records) = records {
                analyzer = analyzer.with_records(JsonRecordFile::new(records));
            }
            if let Some(classifier) = &classifier {
                analyzer = analyzer.with_classifier(Arc::clone(classifier));
            }

            let report = analyzer
                .analyze_file(file_path)
                .with_context(|| format!("analysis of {} failed", file_path.display()))?;
            results.push((file_path.to_string_lossy().to_string(), report));
        }

        Ok(results)
    }
}
