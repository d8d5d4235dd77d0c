//! Configuration module

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::aggregate::Reducer;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Upper bound for request bodies (multipart uploads included)
    pub max_upload_bytes: usize,

    /// Crawler settings
    pub crawl: CrawlConfig,

    /// Model settings
    pub model: ModelConfig,

    /// Alert sink settings
    pub alert: AlertConfig,

    /// Scan pipeline settings
    pub scan: ScanConfig,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Deadline for a whole crawl
    pub timeout: Duration,
    /// Deadline for a single page fetch
    pub page_timeout: Duration,
    pub max_page_bytes: usize,
    pub max_pages: usize,
    pub max_depth: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// JSON weights file for the bundled linear model
    pub path: Option<String>,

    /// Remote inference service; takes precedence over `path`
    pub url: Option<String>,

    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Webhook receiving alert payloads. Alerts are only logged when unset.
    pub webhook_url: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub reducer: Reducer,

    /// Push the report to the alert sink when threat_level exceeds this.
    /// Disabled when unset.
    pub auto_alert_threshold: Option<u8>,

    pub endpoint_column: String,
    pub connections_column: String,
    pub scale_features: bool,
    pub max_attack_paths: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: parsed("PORT").unwrap_or(defaults.port),

            environment: env::var("ENVIRONMENT")
                .unwrap_or(defaults.environment),

            max_upload_bytes: parsed("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),

            crawl: CrawlConfig {
                timeout: parsed("CRAWL_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.crawl.timeout),
                page_timeout: parsed("CRAWL_PAGE_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.crawl.page_timeout),
                max_page_bytes: parsed("CRAWL_MAX_PAGE_BYTES").unwrap_or(defaults.crawl.max_page_bytes),
                max_pages: parsed("CRAWL_MAX_PAGES").unwrap_or(defaults.crawl.max_pages),
                max_depth: parsed("CRAWL_MAX_DEPTH").unwrap_or(defaults.crawl.max_depth),
                user_agent: env::var("CRAWL_USER_AGENT").unwrap_or(defaults.crawl.user_agent),
            },

            model: ModelConfig {
                path: non_empty("MODEL_PATH"),
                url: non_empty("MODEL_URL"),
                timeout: parsed("MODEL_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.model.timeout),
            },

            alert: AlertConfig {
                webhook_url: non_empty("ALERT_WEBHOOK_URL"),
                timeout: parsed("ALERT_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.alert.timeout),
                max_attempts: parsed::<u32>("ALERT_MAX_ATTEMPTS")
                    .map(|n| n.max(1))
                    .unwrap_or(defaults.alert.max_attempts),
                retry_backoff: parsed("ALERT_RETRY_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.alert.retry_backoff),
            },

            scan: ScanConfig {
                reducer: parsed("SCORE_REDUCER").unwrap_or(defaults.scan.reducer),
                auto_alert_threshold: parsed::<u8>("AUTO_ALERT_THRESHOLD").map(|t| t.min(100)),
                endpoint_column: env::var("ENDPOINT_COLUMN")
                    .unwrap_or(defaults.scan.endpoint_column),
                connections_column: env::var("CONNECTIONS_COLUMN")
                    .unwrap_or(defaults.scan.connections_column),
                scale_features: parsed("SCALE_FEATURES").unwrap_or(defaults.scan.scale_features),
                max_attack_paths: parsed("MAX_ATTACK_PATHS").unwrap_or(defaults.scan.max_attack_paths),
            },

            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            environment: "development".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            crawl: CrawlConfig {
                timeout: Duration::from_secs(30),
                page_timeout: Duration::from_secs(10),
                max_page_bytes: 2 * 1024 * 1024,
                max_pages: 50,
                max_depth: 3,
                user_agent: concat!("threat-scan/", env!("CARGO_PKG_VERSION")).to_string(),
            },
            model: ModelConfig {
                path: None,
                url: None,
                timeout: Duration::from_secs(10),
            },
            alert: AlertConfig {
                webhook_url: None,
                timeout: Duration::from_secs(5),
                max_attempts: 3,
                retry_backoff: Duration::from_millis(500),
            },
            scan: ScanConfig {
                reducer: Reducer::Mean,
                auto_alert_threshold: None,
                endpoint_column: "endpoint".to_string(),
                connections_column: "connects_to".to_string(),
                scale_features: true,
                max_attack_paths: 16,
            },
            log_json: false,
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
