//! Feature extraction
//!
//! One `FeatureRecord` per endpoint, same order. Sparse input never fails:
//! missing values become 0.0. Only structurally broken tables are rejected.

use std::collections::{BTreeSet, HashMap};

use reqwest::Url;

use crate::error::ScanError;
use crate::models::{Connection, Endpoint, FeatureRecord, Payload, RecordSet, Table};

const SENSITIVE_KEYWORDS: &[&str] = &[
    "admin", "login", "signin", "auth", "upload", "config", "backup", "debug",
    "api", "token", "password", "reset", "console", "shell", "wp-",
];

pub fn extract(records: &RecordSet, scale: bool) -> Result<Vec<FeatureRecord>, ScanError> {
    let features = match &records.payload {
        Payload::Crawl => url_features(&records.endpoints, &records.connections),
        Payload::Table { table, endpoint_column, connections_column } => {
            let excluded: Vec<usize> = endpoint_column.iter().chain(connections_column).copied().collect();
            table_features(table, &excluded, scale)?
        }
    };

    if features.len() != records.endpoints.len() {
        return Err(ScanError::Schema(format!(
            "{} feature rows for {} endpoints",
            features.len(),
            records.endpoints.len()
        )));
    }

    Ok(features)
}

/// Lexical features of each URL plus its link counts
pub fn url_features(endpoints: &[Endpoint], connections: &[Connection]) -> Vec<FeatureRecord> {
    let mut out_links: HashMap<&str, usize> = HashMap::new();
    let mut in_links: HashMap<&str, usize> = HashMap::new();
    for conn in connections {
        *out_links.entry(conn.source()).or_default() += 1;
        *in_links.entry(conn.target()).or_default() += 1;
    }

    endpoints
        .iter()
        .map(|endpoint| {
            let mut record = lexical_features(endpoint);
            record.insert("out_links".into(), *out_links.get(endpoint.as_str()).unwrap_or(&0) as f64);
            record.insert("in_links".into(), *in_links.get(endpoint.as_str()).unwrap_or(&0) as f64);
            record
        })
        .collect()
}

fn lexical_features(endpoint: &str) -> FeatureRecord {
    let parsed = Url::parse(endpoint).ok();
    let (path, query_params, is_https) = match &parsed {
        Some(url) => (
            url.path().to_string(),
            url.query_pairs().count(),
            url.scheme() == "https",
        ),
        None => (endpoint.to_string(), 0, false),
    };

    let lowered = endpoint.to_ascii_lowercase();
    let last_segment = path.rsplit('/').next().unwrap_or("");

    FeatureRecord::from([
        ("url_length".to_string(), endpoint.len() as f64),
        ("path_depth".to_string(), path.split('/').filter(|s| !s.is_empty()).count() as f64),
        ("query_params".to_string(), query_params as f64),
        ("is_https".to_string(), flag(is_https)),
        (
            "sensitive_keyword".to_string(),
            flag(SENSITIVE_KEYWORDS.iter().any(|k| lowered.contains(k))),
        ),
        ("has_file_extension".to_string(), flag(last_segment.contains('.'))),
    ])
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

enum ColumnKind {
    Numeric { min: f64, max: f64 },
    Categorical { values: BTreeSet<String> },
}

/// Numeric columns pass through (optionally min-max scaled), columns with any
/// non-numeric value are one-hot encoded as `column=value`.
pub fn table_features(table: &Table, excluded: &[usize], scale: bool) -> Result<Vec<FeatureRecord>, ScanError> {
    table.check_shape()?;

    let columns: Vec<(usize, ColumnKind)> = (0..table.headers.len())
        .filter(|col| !excluded.contains(col))
        .map(|col| (col, inspect_column(table, col)))
        .collect();

    let records = table
        .rows
        .iter()
        .map(|row| {
            let mut record = FeatureRecord::new();
            for (col, kind) in &columns {
                let name = &table.headers[*col];
                let cell = row[*col].trim();
                match kind {
                    ColumnKind::Numeric { min, max } => {
                        let value = cell.parse::<f64>().unwrap_or(0.0);
                        let value = if scale {
                            if max > min { (value - min) / (max - min) } else { 0.0 }
                        } else {
                            value
                        };
                        record.insert(name.clone(), value);
                    }
                    ColumnKind::Categorical { values } => {
                        for v in values {
                            record.insert(format!("{}={}", name, v), flag(cell == v));
                        }
                    }
                }
            }
            record
        })
        .collect();

    Ok(records)
}

fn inspect_column(table: &Table, col: usize) -> ColumnKind {
    let cells = table.rows.iter().map(|r| r[col].trim()).filter(|c| !c.is_empty());

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut values = BTreeSet::new();
    let mut numeric = true;

    for cell in cells {
        match cell.parse::<f64>() {
            Ok(v) if v.is_finite() && numeric => {
                min = min.min(v);
                max = max.max(v);
            }
            Ok(v) if v.is_finite() => {}
            _ => numeric = false,
        }
        values.insert(cell.to_string());
    }

    if numeric {
        // Empty cells count as 0.0 for scaling too
        if table.rows.iter().any(|r| r[col].trim().is_empty()) {
            min = min.min(0.0);
            max = max.max(0.0);
        }
        if !min.is_finite() {
            min = 0.0;
            max = 0.0;
        }
        ColumnKind::Numeric { min, max }
    } else {
        ColumnKind::Categorical { values }
    }
}
