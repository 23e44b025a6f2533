//! Core module for backup analysis
//!
//! This module contains the streaming extraction engine (scanner, pattern
//! rules, accumulator), the statistical analyzers built on top of it and the
//! pipeline that wires them together.

use serde::{Deserialize, Serialize};

pub mod accumulator;
pub mod analyzer;
pub mod benford;
pub mod concepts;
pub mod patterns;
pub mod report;
pub mod round_numbers;
pub mod scanner;

/// Coarse ordinal severity label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[serde(alias = "BAJO", alias = "low")]
    Low,
    #[serde(alias = "MEDIO", alias = "medium")]
    Medium,
    #[serde(alias = "ALTO", alias = "high")]
    High,
    /// Only produced by the external classification service
    #[serde(alias = "CRITICO", alias = "CRÍTICO", alias = "critical")]
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
