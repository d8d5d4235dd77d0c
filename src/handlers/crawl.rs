//! Crawl handler

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use serde::Deserialize;
use validator::Validate;

use super::{form::crawl_options, validation_error};
use crate::{AppResult, AppState};
use crate::models::CrawlResult;

#[derive(Debug, Deserialize, Validate)]
pub struct CrawlForm {
    #[validate(url)]
    pub url: String,
    pub scan_type: Option<String>,
    pub max_pages: Option<String>,
    pub max_depth: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Crawl a site and return what was discovered
pub async fn crawl(
    State(state): State<AppState>,
    payload: Result<Form<CrawlForm>, FormRejection>,
) -> AppResult<Json<CrawlResult>> {
    let Form(form) = payload?;
    form.validate().map_err(validation_error)?;

    let options = crawl_options(
        form.scan_type.as_deref(),
        form.max_pages.as_deref(),
        form.max_depth.as_deref(),
        form.username,
        form.password,
        None,
    )?;

    let result = state.engine.crawl(&form.url, &options).await?;
    Ok(Json(result))
}
