//! Multipart scan form

use axum::extract::Multipart;

use crate::clients::Credentials;
use crate::error::{AppResult, ScanError};
use crate::pipeline::{CrawlOptions, ScanInput, Upload};

/// Raw multipart fields of a scan request
#[derive(Debug, Default)]
pub struct ScanForm {
    pub url: Option<String>,
    pub file: Option<Upload>,
    pub scan_type: Option<String>,
    pub max_pages: Option<String>,
    pub max_depth: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub synthesize_connections: Option<String>,
}

impl ScanForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = ScanForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                form.file = Some(Upload { filename, bytes });
                continue;
            }

            let slot = match name.as_str() {
                "url" => &mut form.url,
                "scan_type" => &mut form.scan_type,
                "max_pages" => &mut form.max_pages,
                "max_depth" => &mut form.max_depth,
                "username" => &mut form.username,
                "password" => &mut form.password,
                "synthesize_connections" => &mut form.synthesize_connections,
                other => {
                    tracing::debug!("Ignoring unknown form field '{}'", other);
                    continue;
                }
            };
            *slot = Some(field.text().await?);
        }

        Ok(form)
    }

    pub fn into_input(self) -> Result<ScanInput, ScanError> {
        let options = crawl_options(
            self.scan_type.as_deref(),
            self.max_pages.as_deref(),
            self.max_depth.as_deref(),
            self.username,
            self.password,
            self.synthesize_connections.as_deref(),
        )?;

        Ok(ScanInput {
            url: self.url,
            file: self.file,
            options,
        })
    }
}

/// Shared by the multipart and urlencoded forms
pub fn crawl_options(
    scan_type: Option<&str>,
    max_pages: Option<&str>,
    max_depth: Option<&str>,
    username: Option<String>,
    password: Option<String>,
    synthesize: Option<&str>,
) -> Result<CrawlOptions, ScanError> {
    let credentials = match username.filter(|u| !u.is_empty()) {
        Some(username) => Some(Credentials {
            username,
            password: password.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(CrawlOptions {
        profile: scan_type.unwrap_or("full").parse()?,
        max_pages: parse_count("max_pages", max_pages)?,
        max_depth: parse_count("max_depth", max_depth)?,
        credentials,
        synthesize_connections: parse_flag("synthesize_connections", synthesize)?,
    })
}

fn parse_count(field: &str, raw: Option<&str>) -> Result<Option<usize>, ScanError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ScanError::Input(format!("{} must be a non-negative integer, got '{}'", field, v))),
    }
}

fn parse_flag(field: &str, raw: Option<&str>) -> Result<bool, ScanError> {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") | Some("on") => Ok(true),
        Some(other) => Err(ScanError::Input(format!("{} must be a boolean, got '{}'", field, other))),
    }
}
