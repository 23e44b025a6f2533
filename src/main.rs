/// Backup Forensics - statistical anomaly detection for raw accounting backups
///
/// The main entry point for the backup analyzer application. It parses
/// command-line arguments and coordinates the analysis process.

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser, ValueEnum};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bak_forensics::collaborators::classifier::{CommandClassifier, RiskClassifier, DEFAULT_TIMEOUT};
use bak_forensics::collaborators::records::JsonRecordFile;
use bak_forensics::config::{chunk_size_from_mb, load_config, FallbackPattern, HuntMode, ScanConfig};
use bak_forensics::core::analyzer::BackupAnalyzer;
use bak_forensics::core::report::AnalysisReport;
use bak_forensics::utils::file_utils::{self, DiscoveryOptions, DEFAULT_INCLUDE};
use bak_forensics::utils::output_formatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Strings,
    Payroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FallbackArg {
    Generic,
    Strict,
}

/// Command line argument structure
#[derive(Parser, Debug)]
#[command(
    name = "bak_forensics",
    version,
    about = "Statistical anomaly detection for raw accounting backups",
    long_about = "This tool scans binary accounting backups (e.g. ASPEL COI .bak files) for:
- Tax identifiers (RFC), amounts and dates embedded in the raw bytes
- First-digit (Benford) law deviations in the extracted amounts
- An unusual share of round amounts
- Risk-indicative accounting and payroll vocabulary"
)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(true)
        .args(["file_paths", "dir"]),
))]
struct Args {
    /// Path(s) to the backup file(s) to analyze
    #[arg(name = "file_paths")]
    file_paths: Vec<PathBuf>,

    /// Analyze all backups in directory (recursively)
    #[arg(long = "dir")]
    dir: Option<PathBuf>,

    /// Exclude file pattern (glob syntax, can be used multiple times)
    #[arg(long = "exclude", action = ArgAction::Append)]
    exclude: Option<Vec<String>>,

    /// Include only file pattern (glob syntax, can be used multiple times; default: *.bak)
    #[arg(long = "include", action = ArgAction::Append)]
    include: Option<Vec<String>>,

    /// Maximum number of files to analyze (default: 1000)
    #[arg(long = "max-files", default_value = "1000")]
    max_files: usize,

    /// Path to configuration file
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Bytes of new data per chunk, in MB
    #[arg(long = "chunk-size-mb")]
    chunk_size_mb: Option<usize>,

    /// Maximum number of chunks read per file
    #[arg(long = "max-chunks")]
    max_chunks: Option<usize>,

    /// Run the fallback amount pattern while fewer unique amounts than this exist
    #[arg(long = "fallback-threshold")]
    fallback_threshold: Option<usize>,

    /// Fallback amount pattern
    #[arg(long = "fallback-pattern", value_enum)]
    fallback_pattern: Option<FallbackArg>,

    /// Concept hunter mode
    #[arg(long = "mode", value_enum)]
    mode: Option<ModeArg>,

    /// Only count keywords that stand on word boundaries
    #[arg(long = "word-boundary", action = ArgAction::SetTrue)]
    word_boundary: bool,

    /// JSON file with structured transaction records to merge
    #[arg(long = "records")]
    records: Option<PathBuf>,

    /// External command that classifies identifier batches (JSON on stdin/stdout)
    #[arg(long = "classifier-cmd")]
    classifier_cmd: Option<String>,

    /// Seconds the classifier command may run before it is killed
    #[arg(long = "classifier-timeout", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    classifier_timeout: u64,

    /// Output in markdown format (wrapped in triple backticks)
    #[arg(long = "md", action = ArgAction::SetTrue)]
    md: bool,

    /// Export report to JSON file
    #[arg(long = "json")]
    json: Option<PathBuf>,

    /// Export report to HTML file
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// Export report to CSV file
    #[arg(long = "csv")]
    csv: Option<PathBuf>,

    /// Directory to store all output files
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Suppress terminal output
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Show only summary information
    #[arg(long = "summary-only", action = ArgAction::SetTrue)]
    summary_only: bool,

    /// Number of files analyzed in parallel (0=auto, default: auto)
    #[arg(long = "parallel", default_value = "0")]
    parallel: usize,

    /// Set logging level (default: INFO)
    #[arg(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// Log file path (default: bak_forensics.log)
    #[arg(long = "log-file", default_value = "bak_forensics.log")]
    log_file: PathBuf,
}

/// Main entry point function
fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    setup_logging(&args);

    let config = build_config(&args)?;

    let files_to_analyze = get_files_to_analyze(&args);

    if files_to_analyze.is_empty() {
        eprintln!("{}", "Error: No backup files specified or found for analysis".red());
        eprintln!("Run with --help for usage information");
        process::exit(1);
    }

    let all_results = analyze_files(&files_to_analyze, &config, &args)?;

    export_all_results(&all_results, &args)?;

    if !args.quiet {
        let elapsed_time = start_time.elapsed();
        println!("\n{}", "Analysis Complete".bold());
        println!("{} {}", "Files analyzed:".green(), all_results.len());
        println!(
            "{} {:.2} seconds",
            "Time elapsed:".green(),
            elapsed_time.as_secs_f64()
        );

        if all_results.len() > 1 {
            println!("\n{}", output_formatter::create_summary(&all_results));
        }

        if !args.summary_only {
            for (file_path_str, report) in &all_results {
                println!("\n{}", "=".repeat(80).bold());
                println!("{} {}", "Results for:".cyan(), file_path_str);
                println!("{}", "=".repeat(80).bold());
                println!("{}", output_formatter::format_report(report, args.md));
            }
        }
    }

    Ok(())
}

/// Set up logging with file and console output
fn setup_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(args.log_level);

    builder.format(|buf, record| {
        use chrono::Local;
        use std::io::Write;
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Ok(file) = File::create(&args.log_file) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
}

/// Configuration file values, overridden by command-line flags
fn build_config(args: &Args) -> Result<ScanConfig> {
    let mut config = load_config(args.config.as_deref());

    if let Some(mb) = args.chunk_size_mb {
        config.chunk_size_bytes = chunk_size_from_mb(mb).context("Invalid --chunk-size-mb")?;
    }
    if let Some(max_chunks) = args.max_chunks {
        config.max_chunks = max_chunks;
    }
    if let Some(threshold) = args.fallback_threshold {
        config.amount_fallback_threshold = threshold;
    }
    if let Some(pattern) = args.fallback_pattern {
        config.fallback_pattern = match pattern {
            FallbackArg::Generic => FallbackPattern::Generic,
            FallbackArg::Strict => FallbackPattern::Strict,
        };
    }
    if let Some(mode) = args.mode {
        config.hunt_mode = match mode {
            ModeArg::Strings => HuntMode::Strings,
            ModeArg::Payroll => HuntMode::Payroll,
        };
    }
    if args.word_boundary {
        config.word_boundary = true;
    }

    config.validate().context("Invalid scan configuration")?;
    info!(
        "Scan configuration: {} byte chunks, at most {} chunks, fallback below {} amounts, {:?} mode",
        config.chunk_size_bytes, config.max_chunks, config.amount_fallback_threshold, config.hunt_mode
    );

    Ok(config)
}

/// Get list of files to analyze based on command line arguments
fn get_files_to_analyze(args: &Args) -> Vec<PathBuf> {
    let options = DiscoveryOptions {
        include: args
            .include
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_INCLUDE.to_string()]),
        exclude: args.exclude.clone().unwrap_or_default(),
        max_files: args.max_files,
    };
    file_utils::find_backup_files(&args.file_paths, args.dir.as_deref(), &options)
}

/// Analyze multiple files with progress tracking
fn analyze_files(
    files: &[PathBuf],
    config: &ScanConfig,
    args: &Args,
) -> Result<Vec<(String, AnalysisReport)>> {
    let total_files = files.len();

    let num_workers = if args.parallel == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        args.parallel
    };

    if !args.quiet {
        println!(
            "\n{} {} files with {} workers...",
            "Analyzing".bold(),
            total_files,
            num_workers
        );
    }

    let classifier: Option<Arc<dyn RiskClassifier>> = match &args.classifier_cmd {
        Some(command_line) => match CommandClassifier::from_command_line(command_line) {
            Some(classifier) => Some(Arc::new(
                classifier.with_timeout(Duration::from_secs(args.classifier_timeout)),
            )),
            None => {
                error!("Ignoring empty --classifier-cmd");
                None
            }
        },
        None => None,
    };

    let progress = if args.quiet { None } else { Some(MultiProgress::new()) };
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .context("Invalid progress bar template")?
        .progress_chars("#>-");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()
        .context("Failed to build thread pool")?;

    let outcomes: Vec<(String, Result<AnalysisReport>)> = pool.install(|| {
        files
            .par_iter()
            .map(|file_path| {
                let file_path_string = file_path.to_string_lossy().to_string();
                let bar = progress.as_ref().map(|multi| {
                    let bar = multi.add(ProgressBar::new(0));
                    bar.set_style(style.clone());
                    bar.set_message(display_name(file_path));
                    bar
                });

                let outcome = analyze_one(file_path, config, args, classifier.clone(), bar.clone());

                if let Some(bar) = bar {
                    bar.finish_and_clear();
                }
                (file_path_string, outcome)
            })
            .collect()
    });

    let mut all_results = Vec::new();
    for (file_path, outcome) in outcomes {
        match outcome {
            Ok(report) => all_results.push((file_path, report)),
            Err(e) => {
                error!("Error analyzing {}: {:#}", file_path, e);
                if !args.quiet {
                    eprintln!("{} {}: {:#}", "Error analyzing".red(), file_path, e);
                }
            }
        }
    }

    Ok(all_results)
}

fn analyze_one(
    file_path: &Path,
    config: &ScanConfig,
    args: &Args,
    classifier: Option<Arc<dyn RiskClassifier>>,
    progress: Option<ProgressBar>,
) -> Result<AnalysisReport> {
    let mut analyzer = BackupAnalyzer::new(config.clone())?;
    if let Some(records) = &args.records {
        analyzer = analyzer.with_records(JsonRecordFile::new(records));
    }
    if let Some(classifier) = classifier {
        analyzer = analyzer.with_classifier(classifier);
    }
    if let Some(progress) = progress {
        analyzer = analyzer.with_progress(progress);
    }

    analyzer
        .analyze_file(file_path)
        .with_context(|| format!("Failed to analyze {}", file_path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Export results for all analyzed files based on command line arguments
fn export_all_results(all_results: &[(String, AnalysisReport)], args: &Args) -> Result<()> {
    if let Some(output_dir) = &args.output_dir {
        std::fs::create_dir_all(output_dir)
            .context(format!("Failed to create output directory {}", output_dir.display()))?;
    }

    let output_dir = args.output_dir.as_deref();
    let single = all_results.len() == 1;

    for (file_path_str, report) in all_results {
        let file_path = Path::new(file_path_str);
        let resolve = |requested: &PathBuf, extension: &str| {
            if single && output_dir.is_none() {
                requested.clone()
            } else if single {
                output_dir
                    .map(|dir| dir.join(requested.file_name().unwrap_or_default()))
                    .unwrap_or_else(|| requested.clone())
            } else {
                file_utils::generate_output_path(output_dir, file_path, extension)
            }
        };

        if let Some(json_path) = &args.json {
            let path = resolve(json_path, ".json");
            output_formatter::export_report_json(report, &path)?;
            info!("Wrote JSON report to {}", path.display());
        }

        if let Some(html_path) = &args.html {
            let path = resolve(html_path, ".html");
            output_formatter::create_html_report(report, &path)?;
            info!("Wrote HTML report to {}", path.display());
        }

        if let Some(csv_path) = &args.csv {
            let path = resolve(csv_path, ".csv");
            output_formatter::create_csv_report(report, &path)?;
            info!("Wrote CSV report to {}", path.display());
        }
    }

    Ok(())
}
