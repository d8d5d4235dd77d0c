//! Alert handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::{AppResult, AppState};
use crate::error::ScanError;

/// Queue an alert for the sink and acknowledge immediately
pub async fn push(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(alert) = payload?;
    if !alert.is_object() {
        return Err(ScanError::Input("alert must be a JSON object".to_string()).into());
    }

    state.engine.dispatcher.dispatch(alert);

    Ok(Json(json!({ "status": "alert pushed" })))
}
