//! First-digit (Benford) law test
//!
//! Compares the leading-digit distribution of the deduplicated amounts with
//! the theoretical first-digit law and grades the number of digits that
//! deviate by more than five percentage points.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::RiskLevel;

/// Expected share of each leading digit 1-9, in percent
pub const BENFORD_EXPECTED: [f64; 9] = [30.1, 17.6, 12.5, 9.7, 7.9, 6.7, 5.8, 5.1, 4.6];

/// Deviation (percentage points) above which a digit is suspicious
pub const SUSPICIOUS_DEVIATION: f64 = 5.0;

/// Observed vs. expected share for one digit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DigitStat {
    pub actual: f64,
    pub expected: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenfordResult {
    pub risk_score: RiskLevel,
    pub suspicious_digits: Vec<u8>,
    pub details: BTreeMap<u8, DigitStat>,
    pub sample_size: usize,
    /// Pearson chi-squared against the law, 8 degrees of freedom
    pub chi_squared: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BenfordAnalysis {
    Complete(BenfordResult),
    /// No positive amounts were available
    NoData,
}

impl BenfordAnalysis {
    pub fn result(&self) -> Option<&BenfordResult> {
        match self {
            BenfordAnalysis::Complete(result) => Some(result),
            BenfordAnalysis::NoData => None,
        }
    }
}

/// First significant decimal digit of a non-zero amount
pub fn leading_digit(value: Decimal) -> Option<u8> {
    value
        .abs()
        .to_string()
        .bytes()
        .find(|b| (b'1'..=b'9').contains(b))
        .map(|b| b - b'0')
}

/// Tier for a number of suspicious digits: 0-1 low, 2-3 medium, 4+ high
pub fn risk_for_suspicious_count(count: usize) -> RiskLevel {
    match count {
        0..=1 => RiskLevel::Low,
        2..=3 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Run the first-digit test over a deduplicated amount set
///
/// # Arguments
///
/// * `amounts` - Amounts already deduplicated by value
///
/// # Returns
///
/// The per-digit breakdown and risk tier, or `NoData` when no positive amount exists
pub fn analyze(amounts: &[Decimal]) -> BenfordAnalysis {
    let mut counts = [0usize; 9];
    for amount in amounts.iter().filter(|a| a.is_sign_positive() && !a.is_zero()) {
        if let Some(digit) = leading_digit(*amount) {
            counts[(digit - 1) as usize] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    if total == 0 {
        return BenfordAnalysis::NoData;
    }

    let mut details = BTreeMap::new();
    let mut suspicious_digits = Vec::new();
    let mut chi_squared = 0.0;

    for (i, (&count, &expected_pct)) in counts.iter().zip(BENFORD_EXPECTED.iter()).enumerate() {
        let digit = (i + 1) as u8;
        let actual_pct = count as f64 / total as f64 * 100.0;
        let deviation = actual_pct - expected_pct;

        if deviation.abs() > SUSPICIOUS_DEVIATION {
            suspicious_digits.push(digit);
        }

        let expected_count = total as f64 * expected_pct / 100.0;
        chi_squared += (count as f64 - expected_count).powi(2) / expected_count;

        details.insert(
            digit,
            DigitStat {
                actual: round2(actual_pct),
                expected: expected_pct,
                deviation: round2(deviation),
            },
        );
    }

    BenfordAnalysis::Complete(BenfordResult {
        risk_score: risk_for_suspicious_count(suspicious_digits.len()),
        suspicious_digits,
        details,
        sample_size: total,
        chi_squared: round2(chi_squared),
    })
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
