/// File handling utilities
///
/// This module provides helpers for discovering backup files on disk and
/// deriving output paths for exported reports.

use std::path::{Path, PathBuf};

use log::{error, warn};
use regex::Regex;
use walkdir::WalkDir;

/// Pattern used when `--dir` is given without `--include`
pub const DEFAULT_INCLUDE: &str = "*.bak";

/// Rules for picking files out of a directory tree
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Glob patterns a path must match (any of)
    pub include: Vec<String>,
    /// Glob patterns that reject a path (any of)
    pub exclude: Vec<String>,
    /// Stop after this many files
    pub max_files: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include: vec![DEFAULT_INCLUDE.to_string()],
            exclude: Vec::new(),
            max_files: 1000,
        }
    }
}

/// Collect the backups to analyze
///
/// Explicit paths are taken as given, as long as they exist and are regular
/// files. A directory is walked recursively and filtered through the
/// include/exclude globs.
///
/// # Arguments
///
/// * `paths` - Files named on the command line
/// * `dir` - Optional directory to search recursively
/// * `options` - Include/exclude globs and the file cap
///
/// # Returns
///
/// The files to analyze, explicit paths first
pub fn find_backup_files(
    paths: &[PathBuf],
    dir: Option<&Path>,
    options: &DiscoveryOptions,
) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            error!("File not found: {}", path.display());
        } else if !path.is_file() {
            warn!("Skipping {}: not a file", path.display());
        } else {
            files.push(path.clone());
        }
    }

    let Some(dir) = dir else {
        return files;
    };
    if !dir.is_dir() {
        error!("Directory not found: {}", dir.display());
        return files;
    }

    let include = compile_globs(&options.include);
    let exclude = compile_globs(&options.exclude);

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if files.len() >= options.max_files {
            warn!("Reached maximum file limit ({})", options.max_files);
            break;
        }

        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        let name = path.to_string_lossy();
        let included = include.iter().any(|re| re.is_match(&name));
        let excluded = exclude.iter().any(|re| re.is_match(&name));
        if included && !excluded {
            files.push(path.to_path_buf());
        }
    }

    files
}

/// Translate a shell-style glob (`*`, `?`) into an anchored, case-insensitive regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Simple glob pattern matching
pub fn glob_match(text: &str, pattern: &str) -> bool {
    match glob_to_regex(pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

fn compile_globs(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match glob_to_regex(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Ignoring invalid pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Generate output file path based on input file and output directory
///
/// # Arguments
///
/// * `output_dir` - Optional directory for all outputs
/// * `file_path` - Backup the report belongs to
/// * `extension` - Extension including the leading dot
///
/// # Returns
///
/// `<output_dir>/<stem>_analysis<extension>`
pub fn generate_output_path(output_dir: Option<&Path>, file_path: &Path, extension: &str) -> PathBuf {
    let file_stem = file_path.file_stem().unwrap_or_default();
    let output_filename = format!("{}_analysis{}", file_stem.to_string_lossy(), extension);
    match output_dir {
        Some(dir) => dir.join(output_filename),
        None => PathBuf::from(output_filename),
    }
}

/// Human readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
