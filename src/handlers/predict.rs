//! Prediction handler

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;

use super::form::ScanForm;
use crate::{AppResult, AppState};
use crate::error::ScanError;
use crate::models::{Degradation, Endpoint};

#[derive(Debug, Serialize)]
pub struct Prediction {
    pub endpoint: Endpoint,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
}

/// Score every row of an uploaded table
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<PredictResponse>> {
    let upload = ScanForm::read(multipart?)
        .await?
        .file
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ScanError::Input("Upload a file in the 'file' field.".to_string()))?;

    let result = state.engine.predict_upload(&upload).await?;

    let predictions = result
        .endpoints
        .into_iter()
        .zip(result.outcome.scores)
        .map(|(endpoint, score)| Prediction { endpoint, score })
        .collect();

    let degradations: Vec<Degradation> = result.outcome.degradation.into_iter().collect();

    Ok(Json(PredictResponse {
        predictions,
        degraded: !degradations.is_empty(),
        degradations,
    }))
}
