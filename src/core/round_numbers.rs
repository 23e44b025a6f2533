//! Round-number ratio test
//!
//! Tax-bearing transactions rarely land on exact integers, so a high share
//! of integral amounts points at manual or fabricated entries.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::benford::round2;
use crate::core::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundNumberResult {
    pub percentage: f64,
    pub count: usize,
    pub total: usize,
    pub risk_level: RiskLevel,
    pub observation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundNumberAnalysis {
    Complete(RoundNumberResult),
    NoData,
}

impl RoundNumberAnalysis {
    pub fn result(&self) -> Option<&RoundNumberResult> {
        match self {
            RoundNumberAnalysis::Complete(result) => Some(result),
            RoundNumberAnalysis::NoData => None,
        }
    }
}

/// Tier for a round-number share: up to 15% low, up to 30% medium, above that high
pub fn risk_for_percentage(percentage: f64) -> RiskLevel {
    if percentage > 30.0 {
        RiskLevel::High
    } else if percentage > 15.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Share of deduplicated amounts with no fractional part
pub fn analyze(amounts: &[Decimal]) -> RoundNumberAnalysis {
    if amounts.is_empty() {
        return RoundNumberAnalysis::NoData;
    }

    let total = amounts.len();
    let count = amounts.iter().filter(|a| a.fract().is_zero()).count();
    let percentage = count as f64 / total as f64 * 100.0;
    let unusual = percentage > 15.0;

    RoundNumberAnalysis::Complete(RoundNumberResult {
        percentage: round2(percentage),
        count,
        total,
        risk_level: risk_for_percentage(percentage),
        observation: format!(
            "{:.1}% of the amounts are exact integers, which is {}.",
            percentage,
            if unusual { "unusual" } else { "normal" }
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amounts(values: &[&str]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from_str(v).unwrap()).collect()
    }

    #[test]
    fn test_mostly_round_is_high() {
        let analysis = analyze(&amounts(&["10.00", "20.00", "30.00", "5.50"]));
        let result = analysis.result().unwrap();
        assert_eq!(result.percentage, 75.0);
        assert_eq!(result.count, 3);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.observation.contains("unusual"));
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(risk_for_percentage(15.0), RiskLevel::Low);
        assert_eq!(risk_for_percentage(15.01), RiskLevel::Medium);
        assert_eq!(risk_for_percentage(30.0), RiskLevel::Medium);
        assert_eq!(risk_for_percentage(30.5), RiskLevel::High);
    }

    #[test]
    fn test_no_round_amounts() {
        let analysis = analyze(&amounts(&["1160.16", "348.80"]));
        let result = analysis.result().unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.observation.contains("normal"));
    }

    #[test]
    fn test_empty_is_no_data() {
        assert_eq!(analyze(&[]), RoundNumberAnalysis::NoData);
    }
}
