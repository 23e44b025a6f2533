/// Output formatter for analysis reports
///
/// This module handles formatting and exporting analysis reports in various
/// formats, including console output, JSON, HTML, and CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use handlebars::Handlebars;
use serde_json::json;

use crate::collaborators::classifier::ClassificationSection;
use crate::core::benford::BenfordAnalysis;
use crate::core::report::AnalysisReport;
use crate::core::round_numbers::RoundNumberAnalysis;
use crate::core::RiskLevel;
use crate::utils::file_utils::format_size;

fn colored_risk(level: RiskLevel) -> ColoredString {
    match level {
        RiskLevel::Low => level.as_str().green().bold(),
        RiskLevel::Medium => level.as_str().yellow().bold(),
        RiskLevel::High => level.as_str().red().bold(),
        RiskLevel::Critical => level.as_str().magenta().bold(),
    }
}

/// Format an analysis report for console output
///
/// # Arguments
///
/// * `report` - Report to render
/// * `use_markdown` - Whether to format output with markdown triple backticks
///
/// # Returns
///
/// Formatted string for console output
pub fn format_report(report: &AnalysisReport, use_markdown: bool) -> String {
    let mut output = String::new();

    if use_markdown {
        output.push_str("```\n");
    }

    let stats = &report.statistics;
    output.push_str(&format!("{}\n", "Backup".yellow().bold()));
    output.push_str(&format!(
        "  {} {} ({} scanned in {} chunks)\n",
        "Size:".cyan(),
        format_size(report.source.file_size),
        format_size(stats.bytes_scanned),
        stats.chunks_scanned
    ));
    if report.source.truncated {
        output.push_str(&format!(
            "  {}\n",
            "Chunk budget reached; the file was only partially scanned".red()
        ));
    }
    if let Some(level) = report.overall_risk {
        output.push_str(&format!("  {} {}\n", "Overall risk:".cyan(), colored_risk(level)));
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Extracted Data".yellow().bold()));
    output.push_str(&format!(
        "  {} {} ({} natural persons)\n",
        "Identifiers:".cyan(),
        stats.total_identifiers,
        stats.natural_person_identifiers
    ));
    output.push_str(&format!("  {} {}\n", "Unique amounts:".cyan(), stats.total_amounts));
    for (source, count) in &stats.amounts_by_source {
        output.push_str(&format!("    - {:?}: {}\n", source, count));
    }
    if let (Some(avg), Some(max)) = (stats.avg_amount, stats.max_amount) {
        output.push_str(&format!("  {} {} (max {})\n", "Average amount:".cyan(), avg, max));
    }
    output.push_str(&format!("  {} {}\n", "Dates:".cyan(), stats.total_dates));
    if !stats.table_markers.is_empty() {
        let markers: Vec<String> = stats
            .table_markers
            .iter()
            .map(|(name, count)| format!("{}={}", name, count))
            .collect();
        output.push_str(&format!("  {} {}\n", "Table markers:".cyan(), markers.join(", ")));
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Benford Analysis".yellow().bold()));
    match &report.benford_analysis {
        BenfordAnalysis::Complete(result) => {
            output.push_str(&format!(
                "  {} {} (n={}, chi2={:.2})\n",
                "Risk:".cyan(),
                colored_risk(result.risk_score),
                result.sample_size,
                result.chi_squared
            ));
            for (digit, stat) in &result.details {
                let line = format!(
                    "    {}: {:>6.2}% vs {:>5.1}% ({:+.2})",
                    digit, stat.actual, stat.expected, stat.deviation
                );
                if result.suspicious_digits.contains(digit) {
                    output.push_str(&format!("{}\n", line.red()));
                } else {
                    output.push_str(&format!("{}\n", line));
                }
            }
        }
        BenfordAnalysis::NoData => output.push_str("  No amounts available\n"),
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Round Numbers".yellow().bold()));
    match &report.round_numbers {
        RoundNumberAnalysis::Complete(result) => {
            output.push_str(&format!(
                "  {} {} - {}\n",
                "Risk:".cyan(),
                colored_risk(result.risk_level),
                result.observation
            ));
        }
        RoundNumberAnalysis::NoData => output.push_str("  No amounts available\n"),
    }
    output.push('\n');

    let concepts = &report.suspicious_concepts;
    output.push_str(&format!(
        "{} {}\n",
        "Suspicious Concepts:".yellow().bold(),
        concepts.total_found
    ));
    for (keyword, count) in &concepts.top_keywords {
        output.push_str(&format!("  {}: {}\n", keyword.cyan().bold(), count));
    }
    for hit in concepts.samples.iter().take(5) {
        output.push_str(&format!("    - [{}] {}\n", hit.keyword, hit.context));
    }
    output.push('\n');

    output.push_str(&format!("{}\n", "Risk Classification".yellow().bold()));
    match &report.risk_classification {
        ClassificationSection::Available(classification) => {
            output.push_str(&format!(
                "  {} {} analyzed, {} flagged\n",
                "Identifiers:".cyan(),
                classification.total_analyzed,
                classification.flagged.len()
            ));
            for flagged in &classification.flagged {
                output.push_str(&format!(
                    "    - {} {}: {}\n",
                    flagged.identifier,
                    colored_risk(flagged.risk_level),
                    flagged.reason
                ));
            }
        }
        ClassificationSection::Unavailable { reason } => {
            output.push_str(&format!("  {} {}\n", "Unavailable:".red(), reason));
        }
        ClassificationSection::Skipped { reason } => {
            output.push_str(&format!("  Skipped: {}\n", reason));
        }
    }

    if use_markdown {
        output.push_str("```\n");
    }

    output
}

/// Export a report to a JSON file
///
/// # Arguments
///
/// * `report` - Report to write
/// * `output_path` - Path where the JSON file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn export_report_json(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create JSON output file: {}", output_path.display()))?;

    serde_json::to_writer_pretty(file, report).context("Failed to write JSON data")?;

    Ok(())
}

const HTML_TEMPLATE: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Backup Forensics Report</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 1200px;
            margin: 0 auto;
            padding: 20px;
        }
        h1 {
            color: #2c3e50;
            border-bottom: 2px solid #3498db;
            padding-bottom: 10px;
        }
        h2 {
            color: #2980b9;
            margin-top: 30px;
        }
        .section {
            background-color: #f8f9fa;
            border-radius: 5px;
            padding: 15px;
            margin-bottom: 20px;
            box-shadow: 0 2px 5px rgba(0,0,0,0.1);
        }
        table {
            border-collapse: collapse;
        }
        td, th {
            padding: 4px 12px;
            border-bottom: 1px solid #eee;
            text-align: left;
        }
        .suspicious {
            color: #c0392b;
            font-weight: bold;
        }
        .risk {
            background-color: #3498db;
            color: white;
            border-radius: 20px;
            padding: 2px 8px;
            font-size: 0.8em;
        }
        .timestamp {
            color: #7f8c8d;
            font-size: 0.9em;
            margin-bottom: 30px;
        }
    </style>
</head>
<body>
    <h1>Backup Forensics Report</h1>
    <div class="timestamp">{{source.path}} &middot; analyzed {{source.analyzed_at}}</div>

    <div class="section">
        <h2>Summary</h2>
        <p>Overall risk: <span class="risk">{{overall_risk}}</span></p>
        <p>Identifiers: {{statistics.total_identifiers}} &middot; Unique amounts: {{statistics.total_amounts}} &middot; Dates: {{statistics.total_dates}}</p>
        <p>Bytes scanned: {{statistics.bytes_scanned}} in {{statistics.chunks_scanned}} chunks</p>
    </div>

    <div class="section">
        <h2>Benford Analysis</h2>
        {{#if benford}}
        <p>Risk: <span class="risk">{{benford.risk_score}}</span> &middot; sample size {{benford.sample_size}} &middot; chi-squared {{benford.chi_squared}}</p>
        <table>
            <tr><th>Digit</th><th>Actual %</th><th>Expected %</th><th>Deviation</th></tr>
            {{#each digits}}
            <tr{{#if suspicious}} class="suspicious"{{/if}}><td>{{digit}}</td><td>{{actual}}</td><td>{{expected}}</td><td>{{deviation}}</td></tr>
            {{/each}}
        </table>
        {{else}}
        <p>No amounts available.</p>
        {{/if}}
    </div>

    <div class="section">
        <h2>Round Numbers</h2>
        {{#if round_numbers.observation}}
        <p>Risk: <span class="risk">{{round_numbers.risk_level}}</span> &middot; {{round_numbers.observation}}</p>
        {{else}}
        <p>No amounts available.</p>
        {{/if}}
    </div>

    <div class="section">
        <h2>Suspicious Concepts ({{suspicious_concepts.total_found}})</h2>
        <ul>
            {{#each suspicious_concepts.top_keywords}}
            <li>{{@key}}: {{this}}</li>
            {{/each}}
        </ul>
        <table>
            <tr><th>Keyword</th><th>Category</th><th>Context</th></tr>
            {{#each suspicious_concepts.samples}}
            <tr><td>{{keyword}}</td><td>{{category}}</td><td>{{context}}</td></tr>
            {{/each}}
        </table>
    </div>

    <div class="section">
        <h2>Risk Classification</h2>
        <p>Status: {{risk_classification.status}} {{risk_classification.reason}}</p>
        <ul>
            {{#each risk_classification.flagged}}
            <li>{{identifier}} <span class="risk">{{risk_level}}</span> {{reason}}</li>
            {{/each}}
        </ul>
    </div>
</body>
</html>
"#;

/// Create an HTML report
///
/// # Arguments
///
/// * `report` - Report to render
/// * `output_path` - Path where the HTML file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn create_html_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", HTML_TEMPLATE)
        .context("Failed to register HTML template")?;

    let mut template_data = serde_json::to_value(report).context("Failed to serialize report")?;

    let digits: Vec<serde_json::Value> = match &report.benford_analysis {
        BenfordAnalysis::Complete(result) => result
            .details
            .iter()
            .map(|(digit, stat)| {
                json!({
                    "digit": digit,
                    "actual": stat.actual,
                    "expected": stat.expected,
                    "deviation": stat.deviation,
                    "suspicious": result.suspicious_digits.contains(digit),
                })
            })
            .collect(),
        BenfordAnalysis::NoData => Vec::new(),
    };
    if let Some(map) = template_data.as_object_mut() {
        map.insert(
            "benford".to_string(),
            serde_json::to_value(report.benford_analysis.result())?,
        );
        map.insert("digits".to_string(), json!(digits));
        let overall = report
            .overall_risk
            .map(|level| level.as_str())
            .unwrap_or("N/A");
        map.insert("overall_risk".to_string(), json!(overall));
    }

    let html = handlebars
        .render("report", &template_data)
        .context("Failed to render HTML template")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create HTML output file: {}", output_path.display()))?;

    file.write_all(html.as_bytes())
        .context("Failed to write HTML data")?;

    Ok(())
}

/// Create a CSV report
///
/// One row per Benford digit and per keyword hit sample, plus one row per
/// headline statistic.
///
/// # Arguments
///
/// * `report` - Report to write
/// * `output_path` - Path where the CSV file will be written
///
/// # Returns
///
/// Result indicating success or failure
pub fn create_csv_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create CSV output file: {}", output_path.display()))?;

    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record(["Section", "Item", "Value", "Detail"])
        .context("Failed to write CSV header")?;

    let stats = &report.statistics;
    for (item, value) in [
        ("identifiers", stats.total_identifiers.to_string()),
        ("amounts", stats.total_amounts.to_string()),
        ("dates", stats.total_dates.to_string()),
        ("bytes_scanned", stats.bytes_scanned.to_string()),
    ] {
        writer
            .write_record(["statistics", item, value.as_str(), ""])
            .context("Failed to write CSV record")?;
    }

    if let BenfordAnalysis::Complete(result) = &report.benford_analysis {
        for (digit, stat) in &result.details {
            let detail = format!("expected {} deviation {}", stat.expected, stat.deviation);
            writer
                .write_record([
                    "benford",
                    digit.to_string().as_str(),
                    stat.actual.to_string().as_str(),
                    detail.as_str(),
                ])
                .context("Failed to write CSV record")?;
        }
    }

    if let RoundNumberAnalysis::Complete(result) = &report.round_numbers {
        writer
            .write_record([
                "round_numbers",
                result.risk_level.as_str(),
                result.percentage.to_string().as_str(),
                result.observation.as_str(),
            ])
            .context("Failed to write CSV record")?;
    }

    for hit in &report.suspicious_concepts.samples {
        writer
            .write_record(["concept", hit.keyword, hit.category.label(), hit.context.as_str()])
            .context("Failed to write CSV record")?;
    }

    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

/// Create a summary of findings for multiple files
///
/// # Arguments
///
/// * `all_results` - Reports for multiple files
///
/// # Returns
///
/// Summary string
pub fn create_summary(all_results: &[(String, AnalysisReport)]) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n\n", "Analysis Summary".yellow().bold()));
    output.push_str(&format!("Files analyzed: {}\n", all_results.len()));

    let total_hits: usize = all_results
        .iter()
        .map(|(_, report)| report.suspicious_concepts.total_found)
        .sum();
    output.push_str(&format!("Total keyword hits: {}\n\n", total_hits));

    let mut ranked: Vec<&(String, AnalysisReport)> = all_results.iter().collect();
    ranked.sort_by(|a, b| b.1.overall_risk.cmp(&a.1.overall_risk).then_with(|| a.0.cmp(&b.0)));

    if !ranked.is_empty() {
        output.push_str(&format!("{}\n", "Files by Risk".cyan().bold()));
        for (i, (path, report)) in ranked.iter().take(10).enumerate() {
            let risk = match report.overall_risk {
                Some(level) => colored_risk(level).to_string(),
                None => "N/A".to_string(),
            };
            output.push_str(&format!("{}. {}: {}\n", i + 1, path, risk));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::classifier::ClassificationSection;
    use crate::config::{HuntMode, ScanConfig};
    use crate::core::accumulator::{Accumulator, AmountSource};
    use crate::core::concepts::ConceptHunter;
    use crate::core::report::{aggregate, SourceInfo};
    use crate::core::{benford, round_numbers};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn sample_report() -> AnalysisReport {
        let mut acc = Accumulator::new(10, 10);
        for cents in [1000_i64, 2000, 3050, 12345] {
            acc.insert_amount(Decimal::new(cents, 2), AmountSource::Specific);
        }
        let mut hunter = ConceptHunter::new(HuntMode::Strings, false, 5, 20);
        hunter.hunt_string("multa por pago tardio");
        aggregate(
            SourceInfo::new(Path::new("empresa.bak"), 2048, &ScanConfig::default(), false),
            &acc,
            benford::analyze(&acc.amounts()),
            round_numbers::analyze(&acc.amounts()),
            hunter.summary(),
            ClassificationSection::Skipped {
                reason: "no classifier configured".to_string(),
            },
            50,
        )
    }

    #[test]
    fn test_format_report_sections() {
        colored::control::set_override(false);
        let text = format_report(&sample_report(), true);
        assert!(text.starts_with("```\n"));
        assert!(text.contains("Benford Analysis"));
        assert!(text.contains("Unique amounts: 4"));
        assert!(text.contains("multa: 1"));
        assert!(text.contains("Skipped: no classifier configured"));
    }

    #[test]
    fn test_exports_write_files() {
        let dir = TempDir::new().unwrap();
        let report = sample_report();

        let json_path = dir.path().join("r.json");
        export_report_json(&report, &json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["statistics"]["total_amounts"], 4);

        let html_path = dir.path().join("r.html");
        create_html_report(&report, &html_path).unwrap();
        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.contains("Backup Forensics Report"));
        assert!(html.contains("multa por pago tardio"));

        let csv_path = dir.path().join("r.csv");
        create_csv_report(&report, &csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("Section,Item,Value,Detail"));
        assert!(csv.contains("benford,1,"));
        assert!(csv.contains("concept,multa,"));
    }

    #[test]
    fn test_summary_ranks_by_risk() {
        colored::control::set_override(false);
        let report = sample_report();
        let summary = create_summary(&[("a.bak".to_string(), report.clone()), ("b.bak".to_string(), report)]);
        assert!(summary.contains("Files analyzed: 2"));
        assert!(summary.contains("Total keyword hits: 2"));
        assert!(summary.contains("1. a.bak"));
    }
}
