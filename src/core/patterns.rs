//! Pattern definitions for backup scanning
//!
//! This module declares the byte-level patterns used to pull tax
//! identifiers, monetary amounts, dates and printable text out of raw
//! backup windows, together with the validity predicates applied to each
//! candidate and the keyword lexicons used by the concept hunter.

use std::str::FromStr;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::bytes::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::core::scanner::RawChunk;

/// RFC-like code: 3-4 letters, yymmdd fragment, 3 character homoclave
pub const IDENTIFIER_PATTERN: &str =
    r"[A-Z&]{3,4}[0-9]{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12][0-9]|3[01])[A-Z0-9]{3}";

/// Attribute-style amount as written by CFDI/XML documents
pub const SPECIFIC_AMOUNT_PATTERN: &str =
    r#"(?:Total|SubTotal|Importe|ValorUnitario|Monto|Haber|Debe)="([0-9]{1,15}\.[0-9]{1,6})""#;

/// Bare number with at least two integer digits and 2-4 fractional digits
pub const GENERIC_AMOUNT_PATTERN: &str = r"[0-9]{2,}\.[0-9]{2,4}";

/// Any digit run with a fractional part; narrowed by [`is_strict_amount_span`]
pub const STRICT_AMOUNT_PATTERN: &str = r"[0-9]+\.[0-9]+";

pub const ISO_DATE_PATTERN: &str = r"20[0-9]{2}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])";

pub const DMY_DATE_PATTERN: &str = r"(?:0[1-9]|[12][0-9]|3[01])/(?:0[1-9]|1[0-2])/20[0-9]{2}";

/// Byte class of the printable-text rule
const TEXT_CLASS: &str = r"[A-Za-z0-9 \t\r\n\-._@]";

/// Longest match the identifier, amount and date patterns can produce
const FIXED_PATTERN_MAX_LEN: usize = 38;

lazy_static! {
    static ref IDENTIFIER: Regex = compile_static(IDENTIFIER_PATTERN);
    static ref IDENTIFIER_EXACT: Regex = compile_static(&format!("^{}$", IDENTIFIER_PATTERN));
    static ref SPECIFIC_AMOUNT: Regex = compile_static(SPECIFIC_AMOUNT_PATTERN);
    static ref GENERIC_AMOUNT: Regex = compile_static(GENERIC_AMOUNT_PATTERN);
    static ref STRICT_AMOUNT: Regex = compile_static(STRICT_AMOUNT_PATTERN);
    static ref ISO_DATE: Regex = compile_static(ISO_DATE_PATTERN);
    static ref DMY_DATE: Regex = compile_static(DMY_DATE_PATTERN);
    static ref TABLE_MARKER_PATTERNS: Vec<(&'static str, Regex)> = TABLE_MARKERS
        .iter()
        .map(|marker| (*marker, compile_static(&regex::escape(marker))))
        .collect();
}

fn compile_static(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("built-in pattern {pattern:?} is invalid: {e}"))
}

/// Risk category attached to each lexicon keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    /// Entries lacking proper support or with vague descriptions
    UnsupportedEntry,
    /// Personal or third-party spending booked as business expense
    PersonalExpense,
    /// Penalties, surcharges and donations with tax consequences
    TaxPenalty,
    /// Payroll schemes frequently used to reduce withholding
    PayrollRisk,
}

impl KeywordCategory {
    pub fn label(&self) -> &'static str {
        match self {
            KeywordCategory::UnsupportedEntry => "Unsupported entry",
            KeywordCategory::PersonalExpense => "Personal expense",
            KeywordCategory::TaxPenalty => "Tax penalty",
            KeywordCategory::PayrollRisk => "Payroll risk",
        }
    }
}

/// A lexicon term with its risk category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexiconEntry {
    pub keyword: &'static str,
    pub category: KeywordCategory,
}

const fn entry(keyword: &'static str, category: KeywordCategory) -> LexiconEntry {
    LexiconEntry { keyword, category }
}

/// Keywords searched for in general ledger backups
pub const STANDARD_LEXICON: &[LexiconEntry] = &[
    entry("no deducible", KeywordCategory::UnsupportedEntry),
    entry("sin comprobante", KeywordCategory::UnsupportedEntry),
    entry("por comprobar", KeywordCategory::UnsupportedEntry),
    entry("ajuste", KeywordCategory::UnsupportedEntry),
    entry("varios", KeywordCategory::UnsupportedEntry),
    entry("cancelado", KeywordCategory::UnsupportedEntry),
    entry("efectivo", KeywordCategory::UnsupportedEntry),
    entry("reposicion", KeywordCategory::UnsupportedEntry),
    entry("gastos personales", KeywordCategory::PersonalExpense),
    entry("prestamo", KeywordCategory::PersonalExpense),
    entry("anticipo nomina", KeywordCategory::PersonalExpense),
    entry("multa", KeywordCategory::TaxPenalty),
    entry("recargo", KeywordCategory::TaxPenalty),
    entry("actualizacion", KeywordCategory::TaxPenalty),
    entry("donativo", KeywordCategory::TaxPenalty),
];

/// Keywords searched for in payroll backups
pub const PAYROLL_LEXICON: &[LexiconEntry] = &[
    entry("asimilados", KeywordCategory::PayrollRisk),
    entry("prevision social", KeywordCategory::PayrollRisk),
    entry("sindicato", KeywordCategory::PayrollRisk),
    entry("efectivo", KeywordCategory::PayrollRisk),
    entry("viaticos", KeywordCategory::PayrollRisk),
    entry("compensacion", KeywordCategory::PayrollRisk),
    entry("bono", KeywordCategory::PayrollRisk),
    entry("gratificacion", KeywordCategory::PayrollRisk),
    entry("finiquito", KeywordCategory::PayrollRisk),
    entry("indemnizacion", KeywordCategory::PayrollRisk),
    entry("no acumulable", KeywordCategory::PayrollRisk),
];

/// Ordinary payroll vocabulary; its presence confirms the file holds payroll data
pub const PAYROLL_MARKERS: &[&str] = &["sueldo", "salario", "imss", "infonavit", "isr", "subsidio"];

/// Table names found in ASPEL COI accounting backups
pub const TABLE_MARKERS: &[&str] = &[
    "CPOLIZA", "POLIZA", "CUENTAS", "AUXILIAR", "CATALOGO", "EMPRESA", "PERIODO", "BALANZA",
];

/// A validated candidate and where it sits in the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found<T> {
    pub value: T,
    pub start: usize,
    pub end: usize,
}

/// Candidates produced by one pattern over one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub found: Vec<Found<T>>,
    /// Spans that matched but were not valid text
    pub decode_skips: usize,
    /// Spans that decoded but failed a validity predicate
    pub rejected: usize,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            decode_skips: 0,
            rejected: 0,
        }
    }
}

impl<T> Extraction<T> {
    fn push(&mut self, value: T, start: usize, end: usize) {
        self.found.push(Found { value, start, end });
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.found.iter().map(|f| &f.value)
    }
}

/// State of a printable run still open at a window boundary.
///
/// A run can be far longer than the carry, so the part already left behind
/// is summarized here and handed to the next window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OpenRun {
    /// The byte before the boundary is not printable text
    #[default]
    Closed,
    /// Only whitespace so far
    Blank,
    /// Text from the first non-blank byte up to the boundary
    Text(String),
    /// Trailing whitespace pushed the run past the length limit; the text
    /// stands as long as nothing but whitespace follows
    Padded(String),
    /// Already too long to be accepted
    Overlong,
}

impl OpenRun {
    /// Append the next piece of the same run
    fn extend(self, piece: &str, max_len: usize) -> OpenRun {
        let mut text = match self {
            OpenRun::Overlong => return OpenRun::Overlong,
            OpenRun::Padded(text) => {
                return if piece.trim().is_empty() {
                    OpenRun::Padded(text)
                } else {
                    OpenRun::Overlong
                };
            }
            OpenRun::Closed | OpenRun::Blank => {
                let rest = piece.trim_start();
                if rest.is_empty() {
                    return OpenRun::Blank;
                }
                return OpenRun::Text(String::new()).extend(rest, max_len);
            }
            OpenRun::Text(text) => text,
        };

        text.push_str(piece);
        let trimmed_len = text.trim_end().len();
        if trimmed_len > max_len {
            OpenRun::Overlong
        } else if text.len() > max_len {
            text.truncate(trimmed_len);
            OpenRun::Padded(text)
        } else {
            OpenRun::Text(text)
        }
    }

    /// Trimmed text of the whole run, if it is short enough to keep
    fn into_trimmed(self) -> Option<String> {
        match self {
            OpenRun::Text(text) => Some(text.trim_end().to_string()),
            OpenRun::Padded(text) => Some(text),
            OpenRun::Blank => Some(String::new()),
            OpenRun::Closed | OpenRun::Overlong => None,
        }
    }
}

/// Calendar date format of an extracted date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    Iso,
    /// `DD/MM/YYYY`
    DayMonthYear,
}

/// A date literal that parsed as a real calendar day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedDate {
    pub text: String,
    pub date: NaiveDate,
    pub format: DateFormat,
}

/// Compiled pattern rules for one scan
#[derive(Debug, Clone)]
pub struct PatternRuleSet {
    text: Regex,
    string_min_len: usize,
    string_max_len: usize,
}

impl PatternRuleSet {
    /// Build the rule set for a scan configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Scan configuration providing the printable string bounds
    ///
    /// # Returns
    ///
    /// The compiled rule set, or the regex error for the printable-text rule
    pub fn new(config: &ScanConfig) -> Result<Self, regex::Error> {
        let text = Regex::new(&format!("{}{{{},}}", TEXT_CLASS, config.string_min_len))?;
        Ok(Self {
            text,
            string_min_len: config.string_min_len,
            string_max_len: config.string_max_len,
        })
    }

    /// Longest byte span any rule needs to see whole.
    ///
    /// Used as the carry-over length between chunks.
    pub fn max_pattern_len(&self) -> usize {
        FIXED_PATTERN_MAX_LEN.max(self.string_max_len.saturating_add(1))
    }

    /// Extract RFC-like identifiers
    pub fn find_identifiers(&self, chunk: &RawChunk) -> Extraction<String> {
        let mut out = Extraction::default();
        for m in owned(&IDENTIFIER, chunk) {
            match std::str::from_utf8(m.as_bytes()) {
                Ok(text) => out.push(text.to_string(), m.start(), m.end()),
                Err(_) => out.decode_skips += 1,
            }
        }
        out
    }

    /// Extract amounts from `Key="digits.digits"` attributes
    pub fn find_specific_amounts(&self, chunk: &RawChunk) -> Extraction<Decimal> {
        let mut out = Extraction::default();
        for caps in SPECIFIC_AMOUNT.captures_iter(chunk.bytes()) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !chunk.owns(whole.start(), whole.end()) {
                continue;
            }
            match std::str::from_utf8(number.as_bytes()) {
                Ok(text) => match parse_amount(text) {
                    Some(value) if is_valid_specific_amount(value) => {
                        out.push(value, whole.start(), whole.end())
                    }
                    _ => out.rejected += 1,
                },
                Err(_) => out.decode_skips += 1,
            }
        }
        out
    }

    /// Spans of every attribute-style amount in the window, owned or not.
    ///
    /// The fallback patterns must also skip attributes that the ownership
    /// rule leaves to a neighbouring chunk.
    pub fn specific_amount_spans(&self, chunk: &RawChunk) -> Vec<(usize, usize)> {
        SPECIFIC_AMOUNT
            .find_iter(chunk.bytes())
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    /// Extract bare numbers, skipping anything inside `exclude` spans
    pub fn find_generic_amounts(
        &self,
        chunk: &RawChunk,
        exclude: &[(usize, usize)],
    ) -> Extraction<Decimal> {
        let mut out = Extraction::default();
        for m in owned(&GENERIC_AMOUNT, chunk) {
            if overlaps_any(m.start(), m.end(), exclude) {
                continue;
            }
            match std::str::from_utf8(m.as_bytes()) {
                Ok(text) => match parse_amount(text) {
                    Some(value) if is_valid_generic_amount(value) => {
                        out.push(value, m.start(), m.end())
                    }
                    _ => out.rejected += 1,
                },
                Err(_) => out.decode_skips += 1,
            }
        }
        out
    }

    /// Extract isolated two-decimal amounts, skipping anything inside `exclude` spans
    pub fn find_strict_amounts(
        &self,
        chunk: &RawChunk,
        exclude: &[(usize, usize)],
    ) -> Extraction<Decimal> {
        let mut out = Extraction::default();
        let bytes = chunk.bytes();
        for m in owned(&STRICT_AMOUNT, chunk) {
            if overlaps_any(m.start(), m.end(), exclude) {
                continue;
            }
            let preceded_by_digit = m.start() > 0 && bytes[m.start() - 1].is_ascii_digit();
            if preceded_by_digit || !is_strict_amount_span(m.as_bytes()) {
                out.rejected += 1;
                continue;
            }
            match std::str::from_utf8(m.as_bytes()) {
                Ok(text) => match parse_amount(text) {
                    Some(value) if is_valid_strict_amount(value) => {
                        out.push(value, m.start(), m.end())
                    }
                    _ => out.rejected += 1,
                },
                Err(_) => out.decode_skips += 1,
            }
        }
        out
    }

    /// Extract ISO and day/month/year dates that exist on the calendar
    pub fn find_dates(&self, chunk: &RawChunk) -> Extraction<ExtractedDate> {
        let mut out = Extraction::default();
        for (regex, format) in [(&*ISO_DATE, DateFormat::Iso), (&*DMY_DATE, DateFormat::DayMonthYear)] {
            for m in owned(regex, chunk) {
                let Ok(text) = std::str::from_utf8(m.as_bytes()) else {
                    out.decode_skips += 1;
                    continue;
                };
                match parse_date(text, format) {
                    Some(date) => out.push(
                        ExtractedDate {
                            text: text.to_string(),
                            date,
                            format,
                        },
                        m.start(),
                        m.end(),
                    ),
                    None => out.rejected += 1,
                }
            }
        }
        out
    }

    /// Extract trimmed printable runs within the configured length bounds
    ///
    /// `entering` describes the run open at the start of the window, as
    /// returned by [`PatternRuleSet::open_run_at`] for the previous chunk.
    /// A match at offset 0 continues that run and is judged as a whole.
    pub fn find_strings(&self, chunk: &RawChunk, entering: &OpenRun) -> Extraction<String> {
        let mut out = Extraction::default();
        for m in owned(&self.text, chunk) {
            let Ok(text) = std::str::from_utf8(m.as_bytes()) else {
                out.decode_skips += 1;
                continue;
            };
            let run = if m.start() == 0 {
                entering.clone()
            } else {
                OpenRun::Closed
            };
            match run.extend(text, self.string_max_len).into_trimmed() {
                Some(trimmed) if trimmed.len() >= self.string_min_len => {
                    out.push(trimmed, m.start(), m.end())
                }
                _ => out.rejected += 1,
            }
        }
        out
    }

    /// Run state at `boundary`, the window offset where the next window starts
    ///
    /// # Arguments
    ///
    /// * `chunk` - Window just processed
    /// * `entering` - Run state at the start of that window
    /// * `boundary` - Start of the next window, relative to this one
    pub fn open_run_at(&self, chunk: &RawChunk, entering: OpenRun, boundary: usize) -> OpenRun {
        let before = &chunk.bytes()[..boundary.min(chunk.bytes().len())];
        if before.is_empty() {
            return entering;
        }
        let run_start = before
            .iter()
            .rposition(|&b| !is_text_byte(b))
            .map_or(0, |i| i + 1);
        if run_start == before.len() {
            return OpenRun::Closed;
        }

        let base = if run_start == 0 { entering } else { OpenRun::Closed };
        let piece = String::from_utf8_lossy(&before[run_start..]);
        base.extend(&piece, self.string_max_len)
    }

    /// Count occurrences of the accounting table markers
    pub fn count_table_markers(&self, chunk: &RawChunk) -> Vec<(&'static str, usize)> {
        TABLE_MARKER_PATTERNS
            .iter()
            .map(|(marker, regex)| (*marker, owned(regex, chunk).count()))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

fn owned<'c>(
    regex: &'c Regex,
    chunk: &'c RawChunk,
) -> impl Iterator<Item = regex::bytes::Match<'c>> + 'c {
    regex
        .find_iter(chunk.bytes())
        .filter(move |m| chunk.owns(m.start(), m.end()))
}

fn is_text_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'-' | b'.' | b'_' | b'@')
}

fn overlaps_any(start: usize, end: usize, spans: &[(usize, usize)]) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

/// Parse a decimal literal into a normalized fixed-point value
pub fn parse_amount(text: &str) -> Option<Decimal> {
    Decimal::from_str(text).ok().map(|value| value.normalize())
}

/// Specific (attribute) amounts must exceed 1.0
pub fn is_valid_specific_amount(value: Decimal) -> bool {
    value > Decimal::ONE
}

/// Generic amounts must sit strictly between 1.0 and 100,000,000.0
pub fn is_valid_generic_amount(value: Decimal) -> bool {
    value > Decimal::ONE && value < Decimal::new(100_000_000, 0)
}

/// Strict amounts must sit within 0.01 and 99,999,999.99 inclusive
pub fn is_valid_strict_amount(value: Decimal) -> bool {
    value >= Decimal::new(1, 2) && value <= Decimal::new(9_999_999_999, 2)
}

/// 1-10 integer digits and exactly two fractional digits
pub fn is_strict_amount_span(span: &[u8]) -> bool {
    let Some(dot) = span.iter().position(|&b| b == b'.') else {
        return false;
    };
    let integer = dot;
    let fraction = span.len() - dot - 1;
    (1..=10).contains(&integer) && fraction == 2
}

/// Whether a whole string is an RFC-like identifier
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_EXACT.is_match(value.as_bytes())
}

/// Parse a date literal in the given format, rejecting impossible days
pub fn parse_date(text: &str, format: DateFormat) -> Option<NaiveDate> {
    let pattern = match format {
        DateFormat::Iso => "%Y-%m-%d",
        DateFormat::DayMonthYear => "%d/%m/%Y",
    };
    NaiveDate::parse_from_str(text, pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(data: &[u8]) -> RawChunk {
        RawChunk::new(0, 0, data.to_vec(), 0, true)
    }

    fn rules() -> PatternRuleSet {
        PatternRuleSet::new(&ScanConfig::default()).unwrap()
    }

    fn dec(text: &str) -> Decimal {
        parse_amount(text).unwrap()
    }

    #[test]
    fn test_identifiers() {
        let data = b"\x00\x01GODE561231GR8\xffXAXX010101000 abc123 XYZ991399ABC";
        let found = rules().find_identifiers(&chunk(data));
        let values: Vec<&String> = found.values().collect();
        assert_eq!(values, vec!["GODE561231GR8", "XAXX010101000"]);
        assert!(is_identifier("TEJ2304191I0"));
        assert!(!is_identifier("TEJ2313191I0"));
    }

    #[test]
    fn test_specific_amounts() {
        let data = br#"<cfdi Total="1160.00" SubTotal="1000.00" Descuento="5.00" Importe="0.50"/>"#;
        let found = rules().find_specific_amounts(&chunk(data));
        let values: Vec<Decimal> = found.values().copied().collect();
        assert_eq!(values, vec![dec("1160"), dec("1000")]);
        assert_eq!(found.rejected, 1);
    }

    #[test]
    fn test_generic_amount_bounds() {
        let rules = rules();
        let found = rules.find_generic_amounts(&chunk(b" 1234.567 150000000.00 0.99 12.5 "), &[]);
        let values: Vec<Decimal> = found.values().copied().collect();
        assert_eq!(values, vec![dec("1234.567")]);
        assert_eq!(found.rejected, 1);
    }

    #[test]
    fn test_generic_skips_specific_spans() {
        let rules = rules();
        let c = chunk(br#"Total="250.75" then 99.10"#);
        let specific = rules.find_specific_amounts(&c);
        assert_eq!(specific.found.len(), 1);
        let generic = rules.find_generic_amounts(&c, &rules.specific_amount_spans(&c));
        let values: Vec<Decimal> = generic.values().copied().collect();
        assert_eq!(values, vec![dec("99.10")]);
    }

    #[test]
    fn test_specific_spans_include_deferred_matches() {
        let rules = rules();
        let data = br#"xx 12.50 Total="348.80""#.to_vec();
        let c = RawChunk::new(0, 0, data, 0, false);
        assert!(rules.find_specific_amounts(&c).found.is_empty());
        let spans = rules.specific_amount_spans(&c);
        assert_eq!(spans, vec![(9, 23)]);
        let generic = rules.find_generic_amounts(&c, &spans);
        let values: Vec<Decimal> = generic.values().copied().collect();
        assert_eq!(values, vec![dec("12.50")]);
    }

    #[test]
    fn test_strict_amounts() {
        let rules = rules();
        let found = rules.find_strict_amounts(&chunk(b"a 0.05 b 12345678901.00 c 12.345 d 77.10"), &[]);
        let values: Vec<Decimal> = found.values().copied().collect();
        assert_eq!(values, vec![dec("0.05"), dec("77.10")]);
    }

    #[test]
    fn test_dates_are_calendar_checked() {
        let data = b"2024-01-15|2023-02-30|31/12/2022|31/04/2021|1999-01-01";
        let found = rules().find_dates(&chunk(data));
        let texts: Vec<&str> = found.values().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["2024-01-15", "31/12/2022"]);
        assert_eq!(found.rejected, 2);
    }

    #[test]
    fn test_printable_strings_bounds() {
        let mut data = b"\x00\x00pago en efectivo urgente\x01abc\x02".to_vec();
        data.extend(std::iter::repeat(b'a').take(150));
        let found = rules().find_strings(&chunk(&data), &OpenRun::Closed);
        let values: Vec<&String> = found.values().collect();
        assert_eq!(values, vec!["pago en efectivo urgente"]);
        assert_eq!(found.rejected, 1);
    }

    #[test]
    fn test_table_markers() {
        let counts = rules().count_table_markers(&chunk(b"CPOLIZA..POLIZA..BALANZA"));
        assert!(counts.contains(&("CPOLIZA", 1)));
        assert!(counts.contains(&("POLIZA", 2)));
        assert!(counts.contains(&("BALANZA", 1)));
    }

    #[test]
    fn test_runs_continue_across_windows() {
        let rules = rules();

        // 20 letters then padding, cut inside the padding
        let mut first = vec![0u8; 4];
        first.extend([b'A'; 20]);
        first.extend([b' '; 40]);
        let c = RawChunk::new(0, 0, first, 0, false);
        let open = rules.open_run_at(&c, OpenRun::Closed, 34);
        assert_eq!(open, OpenRun::Text(format!("{}{}", "A".repeat(20), " ".repeat(10))));

        // the visible part alone would trim to an acceptable string
        let mut rest = vec![b' '; 80];
        rest.extend_from_slice(b"pago en efectivo urgente\x00");
        let c = RawChunk::new(1, 34, rest.clone(), 0, true);
        let found = rules.find_strings(&c, &open);
        assert!(found.found.is_empty());
        assert_eq!(found.rejected, 1);

        // a blank prefix leaves the visible text untouched
        let found = rules.find_strings(&c, &OpenRun::Blank);
        let values: Vec<&String> = found.values().collect();
        assert_eq!(values, vec!["pago en efectivo urgente"]);
    }

    #[test]
    fn test_open_run_state() {
        let rules = rules();
        let c = chunk(b"\x00abc  \x00  ");
        assert_eq!(rules.open_run_at(&c, OpenRun::Overlong, 6), OpenRun::Text("abc  ".into()));
        assert_eq!(rules.open_run_at(&c, OpenRun::Overlong, 7), OpenRun::Closed);
        assert_eq!(rules.open_run_at(&c, OpenRun::Overlong, 9), OpenRun::Blank);
        assert_eq!(rules.open_run_at(&c, OpenRun::Blank, 0), OpenRun::Blank);

        let spaces = chunk(&[b' '; 40]);
        let open = rules.open_run_at(&spaces, OpenRun::Text("x".into()), 40);
        assert_eq!(open, OpenRun::Text(format!("x{}", " ".repeat(40))));

        let long = chunk(&[b' '; 120]);
        let open = rules.open_run_at(&long, OpenRun::Text("dato".into()), 120);
        assert_eq!(open, OpenRun::Padded("dato".into()));
        assert_eq!(open.clone().extend("   ", 99), OpenRun::Padded("dato".into()));
        assert_eq!(open.extend("  y", 99), OpenRun::Overlong);
    }

    #[test]
    fn test_carry_len_covers_strings() {
        assert_eq!(rules().max_pattern_len(), 100);

        let huge = PatternRuleSet {
            string_max_len: usize::MAX,
            ..rules()
        };
        assert_eq!(huge.max_pattern_len(), usize::MAX);
    }
}
