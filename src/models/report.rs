//! Threat report model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scan::{Connection, Endpoint, ScanMetadata, ScanSource};

/// Severity band of a threat level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub message: String,
    pub level: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vulnerability {
    pub endpoint: Endpoint,
    pub label: Severity,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub nodes: Vec<Endpoint>,
    pub edges: Vec<Connection>,
    /// Edges were synthesized from crawl order, not observed
    pub synthesized: bool,
}

/// A pipeline stage that fell back instead of producing a real result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub stage: &'static str,
    pub kind: &'static str,
    pub detail: String,
}

/// Terminal aggregate of a full scan
#[derive(Debug, Clone, Serialize)]
pub struct ThreatReport {
    pub scan_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub source: ScanSource,
    pub metadata: ScanMetadata,
    pub threat_level: u8,
    pub severity: Severity,
    pub vulnerabilities: Vec<Vulnerability>,
    pub network: NetworkSummary,
    pub attack_paths: Vec<Vec<Endpoint>>,
    pub alerts: Vec<Alert>,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
}
