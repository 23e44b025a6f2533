//! Structured transaction records
//!
//! A typed alternative to byte-pattern extraction: when invoices have been
//! parsed elsewhere, their records feed the same accumulator.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collaborators::CollaboratorError;

/// One parsed invoice or ledger transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub uuid: Option<String>,
    #[serde(alias = "rfc_emisor")]
    pub issuer_id: Option<String>,
    #[serde(alias = "rfc_receptor")]
    pub receiver_id: Option<String>,
    pub total: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
}

/// Anything that can hand over a batch of structured records
pub trait RecordSource {
    fn load_records(&self) -> Result<Vec<TransactionRecord>, CollaboratorError>;
}

/// Records stored as a JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonRecordFile {
    path: PathBuf,
}

impl JsonRecordFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for JsonRecordFile {
    fn load_records(&self) -> Result<Vec<TransactionRecord>, CollaboratorError> {
        let content = fs::read_to_string(&self.path)?;
        let records: Vec<TransactionRecord> = serde_json::from_str(&content)?;
        debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

impl RecordSource for Vec<TransactionRecord> {
    fn load_records(&self) -> Result<Vec<TransactionRecord>, CollaboratorError> {
        Ok(self.clone())
    }
}
