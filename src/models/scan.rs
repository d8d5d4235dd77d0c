//! Scan input model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Opaque identifier of a scanned resource (URL, path, host or row key)
pub type Endpoint = String;

/// Feature name -> value, one per endpoint
pub type FeatureRecord = BTreeMap<String, f64>;

/// Directed relationship between two endpoints. Serializes as `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection(pub Endpoint, pub Endpoint);

impl Connection {
    pub fn new(source: impl Into<Endpoint>, target: impl Into<Endpoint>) -> Self {
        Self(source.into(), target.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }

    pub fn target(&self) -> &str {
        &self.1
    }
}

impl TryFrom<Vec<String>> for Connection {
    type Error = ScanError;

    fn try_from(pair: Vec<String>) -> Result<Self, Self::Error> {
        match <[String; 2]>::try_from(pair) {
            Ok([source, target]) => Ok(Connection(source, target)),
            Err(other) => Err(ScanError::Topology(format!(
                "a connection must be a [source, target] pair, got {} element(s)",
                other.len()
            ))),
        }
    }
}

/// Where a scan's endpoints came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Url,
    File,
}

/// Raw rows of an uploaded table, header first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row must carry exactly one field per header
    pub fn check_shape(&self) -> Result<(), ScanError> {
        if self.headers.is_empty() {
            return Err(ScanError::Schema("table has no columns".to_string()));
        }
        match self.rows.iter().position(|r| r.len() != self.headers.len()) {
            Some(i) => Err(ScanError::Schema(format!(
                "row {} has {} fields, header has {}",
                i + 1,
                self.rows[i].len(),
                self.headers.len()
            ))),
            None => Ok(()),
        }
    }
}

/// Context the feature extractor derives features from
#[derive(Debug, Clone)]
pub enum Payload {
    /// Crawled URLs; features are lexical plus link counts
    Crawl,
    /// Parsed upload; `endpoint_column` and `connections_column` are excluded from features
    Table {
        table: Table,
        endpoint_column: Option<usize>,
        connections_column: Option<usize>,
    },
}

/// Canonical record set every scan is normalized into
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub source: ScanSource,
    pub endpoints: Vec<Endpoint>,
    pub connections: Vec<Connection>,
    /// Connections were invented from crawl order rather than observed
    pub synthesized: bool,
    pub payload: Payload,
    pub metadata: ScanMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_fetched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// SHA-256 of the uploaded payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Crawler output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub seed: String,
    pub endpoints: Vec<Endpoint>,
    /// Observed links (page -> linked page)
    pub connections: Vec<Connection>,
    pub pages_fetched: usize,
}
