//! Input normalization
//!
//! A scan starts from exactly one of a seed URL or an uploaded table.
//! Both are reduced to the same `RecordSet`.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::with_deadline;
use crate::clients::crawler::parse_seed;
use crate::clients::{Crawler, CrawlRequest, Credentials, TabularParser};
use crate::config::{CrawlConfig, ScanConfig};
use crate::error::ScanError;
use crate::models::{Connection, CrawlResult, Payload, RecordSet, ScanMetadata, ScanSource};

/// Crawl breadth preset, mirrors the scanner UI's scan types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanProfile {
    Quick,
    #[default]
    Full,
    Custom,
}

impl FromStr for ScanProfile {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(ScanProfile::Quick),
            "full" | "" => Ok(ScanProfile::Full),
            "custom" => Ok(ScanProfile::Custom),
            other => Err(ScanError::Input(format!(
                "unknown scan_type '{}' (expected quick, full or custom)",
                other
            ))),
        }
    }
}

const QUICK_MAX_PAGES: usize = 10;
const QUICK_MAX_DEPTH: usize = 1;

#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub profile: ScanProfile,
    pub max_pages: Option<usize>,
    pub max_depth: Option<usize>,
    pub credentials: Option<Credentials>,
    /// Chain endpoints in crawl order instead of using observed links
    pub synthesize_connections: bool,
}

impl CrawlOptions {
    /// (max_pages, max_depth) for this profile; custom values are capped by config
    pub fn limits(&self, config: &CrawlConfig) -> (usize, usize) {
        match self.profile {
            ScanProfile::Quick => (
                QUICK_MAX_PAGES.min(config.max_pages),
                QUICK_MAX_DEPTH.min(config.max_depth),
            ),
            ScanProfile::Full => (config.max_pages, config.max_depth),
            ScanProfile::Custom => (
                self.max_pages.unwrap_or(config.max_pages).clamp(1, config.max_pages.max(1)),
                self.max_depth.unwrap_or(config.max_depth).min(config.max_depth),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanInput {
    pub url: Option<String>,
    pub file: Option<Upload>,
    pub options: CrawlOptions,
}

/// Which branch a request takes
#[derive(Debug)]
pub enum Source<'a> {
    Url(&'a str),
    File(&'a Upload),
}

/// Exactly one of url / file must be present. Blank urls and empty files count as absent.
pub fn select_source(input: &ScanInput) -> Result<Source<'_>, ScanError> {
    let url = input.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let file = input.file.as_ref().filter(|f| !f.bytes.is_empty());

    match (url, file) {
        (None, None) => Err(ScanError::Input("Provide either a URL or a file.".to_string())),
        (Some(url), None) => Ok(Source::Url(url)),
        (None, Some(file)) => Ok(Source::File(file)),
        (Some(_), Some(_)) => Err(ScanError::Input(
            "Provide either a URL or a file, not both.".to_string(),
        )),
    }
}

pub async fn crawl(
    crawler: &dyn Crawler,
    config: &CrawlConfig,
    seed: &str,
    options: &CrawlOptions,
) -> Result<CrawlResult, ScanError> {
    let seed = parse_seed(seed)?;
    let (max_pages, max_depth) = options.limits(config);
    let request = CrawlRequest {
        seed: seed.to_string(),
        max_pages,
        max_depth,
        credentials: options.credentials.clone(),
    };

    tracing::info!(
        "Crawling {} via {} (profile {:?}, max_pages {}, max_depth {})",
        seed, crawler.name(), options.profile, max_pages, max_depth
    );

    with_deadline("crawler", config.timeout, crawler.crawl(request)).await?
}

pub async fn from_url(
    crawler: &dyn Crawler,
    config: &CrawlConfig,
    seed: &str,
    options: &CrawlOptions,
) -> Result<RecordSet, ScanError> {
    let result = crawl(crawler, config, seed, options).await?;

    let (connections, synthesized) = if options.synthesize_connections {
        (chain(&result.endpoints), true)
    } else {
        (result.connections, false)
    };

    Ok(RecordSet {
        source: ScanSource::Url,
        endpoints: result.endpoints,
        connections,
        synthesized,
        payload: Payload::Crawl,
        metadata: ScanMetadata {
            seed: Some(result.seed),
            pages_fetched: Some(result.pages_fetched),
            ..Default::default()
        },
    })
}

/// Sequential connections in endpoint order
pub fn chain(endpoints: &[String]) -> Vec<Connection> {
    endpoints
        .windows(2)
        .map(|pair| Connection::new(pair[0].clone(), pair[1].clone()))
        .collect()
}

pub async fn from_upload(
    parser: Arc<dyn TabularParser>,
    config: &ScanConfig,
    upload: &Upload,
) -> Result<RecordSet, ScanError> {
    let digest = format!("{:x}", Sha256::digest(&upload.bytes));
    tracing::info!(
        "Ingesting upload {} ({} bytes, sha256 {})",
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.bytes.len(),
        digest
    );

    let bytes = upload.bytes.clone();
    let table = tokio::task::spawn_blocking(move || -> Result<_, ScanError> {
        // Removed when `staged` drops, whether or not parsing succeeds
        let mut staged = tempfile::NamedTempFile::new()
            .map_err(|e| ScanError::upstream("staging", e))?;
        staged
            .write_all(&bytes)
            .and_then(|_| staged.flush())
            .map_err(|e| ScanError::upstream("staging", e))?;
        parser.parse(staged.path())
    })
    .await
    .map_err(|e| ScanError::upstream("tabular parser", e))??;
    table.check_shape()?;

    let endpoint_column = table.column(&config.endpoint_column);
    let connections_column = table.column(&config.connections_column);

    let endpoints: Vec<String> = match endpoint_column {
        Some(col) => table.rows.iter().map(|row| row[col].trim().to_string()).collect(),
        None => (0..table.len()).map(|i| i.to_string()).collect(),
    };

    let connections = match connections_column {
        Some(col) => endpoints
            .iter()
            .zip(&table.rows)
            .flat_map(|(source, row)| {
                row[col]
                    .split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(move |target| Connection::new(source.clone(), target))
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(RecordSet {
        source: ScanSource::File,
        endpoints,
        connections,
        synthesized: false,
        payload: Payload::Table {
            table,
            endpoint_column,
            connections_column,
        },
        metadata: ScanMetadata {
            filename: upload.filename.clone(),
            digest: Some(digest),
            ..Default::default()
        },
    })
}
