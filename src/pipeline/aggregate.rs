//! Score aggregation and report assembly

use std::str::FromStr;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Alert, Degradation, Endpoint, NetworkSummary, RecordSet, Severity, ThreatReport, Vulnerability,
};

/// Upper bounds (inclusive) of the lower bands
pub const WARNING_ABOVE: u8 = 40;
pub const CRITICAL_ABOVE: u8 = 75;

/// How per-endpoint scores collapse into one threat level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reducer {
    #[default]
    Mean,
    Max,
    /// Weighted mean; weights are supplied per endpoint
    Weighted,
}

impl FromStr for Reducer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reducer::Mean),
            "max" => Ok(Reducer::Max),
            "weighted" => Ok(Reducer::Weighted),
            other => Err(format!("unknown reducer '{}'", other)),
        }
    }
}

/// Scores outside [0, 1] are clamped; non-finite scores count as 0
pub fn normalize(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Reduce normalized scores to [0, 1]. Empty input reduces to 0.
///
/// `Weighted` without a weight per score falls back to the mean.
pub fn reduce(scores: &[f64], reducer: Reducer, weights: Option<&[f64]>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }

    let normalized = scores.iter().map(|s| normalize(*s));

    match (reducer, weights) {
        (Reducer::Max, _) => normalized.fold(0.0, f64::max),
        (Reducer::Weighted, Some(weights)) if weights.len() == scores.len() => {
            let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
            if total <= 0.0 {
                return 0.0;
            }
            normalized
                .zip(weights)
                .map(|(s, w)| s * w.max(0.0))
                .sum::<f64>()
                / total
        }
        _ => normalized.sum::<f64>() / scores.len() as f64,
    }
}

/// `round(100 * reduce(scores))`, always within 0..=100
pub fn threat_level(scores: &[f64], reducer: Reducer, weights: Option<&[f64]>) -> u8 {
    (100.0 * reduce(scores, reducer, weights)).round().clamp(0.0, 100.0) as u8
}

pub fn classify(level: u8) -> Severity {
    if level > CRITICAL_ABOVE {
        Severity::Critical
    } else if level > WARNING_ABOVE {
        Severity::Warning
    } else {
        Severity::Info
    }
}

pub fn band_alert(severity: Severity) -> Alert {
    let message = match severity {
        Severity::Critical => "High threat detected!",
        Severity::Warning => "Moderate threat detected.",
        Severity::Info => "System appears safe.",
    };
    Alert {
        message: message.to_string(),
        level: severity,
    }
}

fn degradation_alert(degradation: &Degradation) -> Alert {
    Alert {
        message: format!(
            "Degraded result: {} fell back ({}). Findings may be incomplete.",
            degradation.stage, degradation.kind
        ),
        level: Severity::Warning,
    }
}

/// Everything the report is assembled from
pub struct ReportParts<'a> {
    pub records: &'a RecordSet,
    pub scores: &'a [f64],
    pub weights: Option<&'a [f64]>,
    pub reducer: Reducer,
    pub network: NetworkSummary,
    pub attack_paths: Vec<Vec<Endpoint>>,
    pub degradations: Vec<Degradation>,
}

pub fn assemble(parts: ReportParts<'_>) -> ThreatReport {
    let level = threat_level(parts.scores, parts.reducer, parts.weights);
    let severity = classify(level);

    let vulnerabilities = parts
        .records
        .endpoints
        .iter()
        .zip(parts.scores)
        .map(|(endpoint, score)| {
            let score = normalize(*score);
            Vulnerability {
                endpoint: endpoint.clone(),
                label: classify((100.0 * score).round() as u8),
                score,
            }
        })
        .collect();

    let mut alerts = vec![band_alert(severity)];
    alerts.extend(parts.degradations.iter().map(degradation_alert));

    ThreatReport {
        scan_id: Uuid::new_v4(),
        scanned_at: Utc::now(),
        source: parts.records.source,
        metadata: parts.records.metadata.clone(),
        threat_level: level,
        severity,
        vulnerabilities,
        network: parts.network,
        attack_paths: parts.attack_paths,
        alerts,
        degraded: !parts.degradations.is_empty(),
        degradations: parts.degradations,
    }
}
