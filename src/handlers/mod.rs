//! HTTP handlers

pub mod health;
pub mod form;
pub mod crawl;
pub mod predict;
pub mod network;
pub mod alert;
pub mod fullscan;

use validator::ValidationErrors;

use crate::error::ScanError;

/// Flatten validator output into one input error message
pub(crate) fn validation_error(errors: ValidationErrors) -> ScanError {
    let fields: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let reasons: Vec<String> = errs.iter().map(|e| e.code.to_string()).collect();
            format!("{} ({})", field, reasons.join(", "))
        })
        .collect();
    ScanError::Input(format!("invalid fields: {}", fields.join("; ")))
}
