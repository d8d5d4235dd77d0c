//! Tabular upload parser

use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::ScanError;
use crate::models::Table;

pub trait TabularParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Table, ScanError>;
}

/// Comma-separated values with a mandatory header row
#[derive(Debug, Clone, Default)]
pub struct CsvParser {
    pub delimiter: Option<u8>,
}

impl TabularParser for CsvParser {
    fn parse(&self, path: &Path) -> Result<Table, ScanError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .delimiter(self.delimiter.unwrap_or(b','))
            .from_path(path)
            .map_err(|e| ScanError::Schema(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ScanError::Schema(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(ScanError::Schema("missing header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            // Ragged rows surface here as UnequalLengths
            let record = record.map_err(|e| ScanError::Schema(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!("Parsed table: {} columns, {} rows", headers.len(), rows.len());

        Ok(Table { headers, rows })
    }
}
