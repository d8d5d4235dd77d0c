//! Risk scoring
//!
//! Degrade-not-fail: any model problem yields a neutral score per record and
//! a `Degradation` describing what went wrong.

use std::time::Duration;

use super::with_deadline;
use crate::clients::ModelRegistry;
use crate::error::ScanError;
use crate::models::{Degradation, FeatureRecord};

pub const NEUTRAL_SCORE: f64 = 0.0;

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub scores: Vec<f64>,
    pub degradation: Option<Degradation>,
}

impl ScoreOutcome {
    fn fallback(len: usize, err: &ScanError) -> Self {
        tracing::warn!("Risk scoring degraded to neutral scores for {} records: {}", len, err);
        Self {
            scores: vec![NEUTRAL_SCORE; len],
            degradation: Some(Degradation {
                stage: "risk_scorer",
                kind: err.kind(),
                detail: err.to_string(),
            }),
        }
    }
}

/// Always returns exactly one score per input record
pub async fn score(models: &ModelRegistry, features: &[FeatureRecord], timeout: Duration) -> ScoreOutcome {
    if features.is_empty() {
        return ScoreOutcome { scores: Vec::new(), degradation: None };
    }

    // One deadline covers loading and prediction together
    match with_deadline("model", timeout, try_score(models, features)).await {
        Ok(Ok(scores)) => ScoreOutcome { scores, degradation: None },
        Ok(Err(err)) | Err(err) => ScoreOutcome::fallback(features.len(), &err),
    }
}

async fn try_score(models: &ModelRegistry, features: &[FeatureRecord]) -> Result<Vec<f64>, ScanError> {
    let predictor = models.get().await?;
    let scores = predictor.predict(features).await?;

    if scores.len() != features.len() {
        return Err(ScanError::upstream(
            "model",
            format!("returned {} scores for {} records", scores.len(), features.len()),
        ));
    }

    tracing::debug!("Model '{}' scored {} records", predictor.name(), scores.len());
    Ok(scores)
}
