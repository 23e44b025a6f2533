/// Utility modules for the backup analyzer
///
/// This module contains helpers for discovering backup files and for
/// formatting and exporting reports.

pub mod file_utils;
pub mod output_formatter;
