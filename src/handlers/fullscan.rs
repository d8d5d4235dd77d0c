//! Full scan handler

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};

use super::form::ScanForm;
use crate::{AppResult, AppState};
use crate::models::ThreatReport;

/// Crawl a URL or read an upload, then score, map and report
pub async fn fullscan(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ThreatReport>> {
    let input = ScanForm::read(multipart?).await?.into_input()?;
    let report = state.engine.run(&input).await?;
    Ok(Json(report))
}
