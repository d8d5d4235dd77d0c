//! Same-origin web crawler
//!
//! Breadth-first from the seed, bounded by page count and link depth.
//! Every link between two recorded pages is kept as an observed connection.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header::CONTENT_TYPE, Client, Url};

use crate::config::CrawlConfig;
use crate::error::ScanError;
use crate::models::{Connection, CrawlResult};

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:href|action)\s*=\s*["']([^"'<>\s]+)["']"#).expect("valid link regex")
});

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub seed: String,
    pub max_pages: usize,
    pub max_depth: usize,
    pub credentials: Option<Credentials>,
}

#[async_trait]
pub trait Crawler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn crawl(&self, req: CrawlRequest) -> Result<CrawlResult, ScanError>;
}

pub struct HttpCrawler {
    client: Client,
    /// Bytes of a page body scanned for links; the rest is dropped
    max_page_bytes: usize,
}

impl HttpCrawler {
    /// Each page fetch is bounded by `page_timeout`
    pub fn new(config: &CrawlConfig) -> Result<Self, ScanError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.page_timeout.min(Duration::from_secs(5)))
            .timeout(config.page_timeout)
            .build()
            .map_err(|e| ScanError::upstream("crawler", e))?;

        Ok(Self {
            client,
            max_page_bytes: config.max_page_bytes,
        })
    }

    async fn fetch(&self, url: &Url, credentials: Option<&Credentials>) -> Result<Option<String>, reqwest::Error> {
        let mut request = self.client.get(url.clone());
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let mut response = request.send().await?.error_for_status()?;

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("html"))
            .unwrap_or(true);

        if !is_html {
            return Ok(None);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_page_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!("Truncated {} at {} bytes", url, self.max_page_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn crawl(&self, req: CrawlRequest) -> Result<CrawlResult, ScanError> {
        let seed = parse_seed(&req.seed)?;
        let max_pages = req.max_pages.max(1);

        let mut endpoints = vec![seed.to_string()];
        let mut depth_of: HashMap<String, usize> = HashMap::from([(seed.to_string(), 0)]);
        let mut queue = VecDeque::from([seed.clone()]);
        let mut connections = Vec::new();
        let mut pages_fetched = 0;

        while let Some(page) = queue.pop_front() {
            let depth = depth_of[page.as_str()];

            let body = match self.fetch(&page, req.credentials.as_ref()).await {
                Ok(body) => body,
                Err(e) if page == seed => return Err(ScanError::upstream("crawler", e)),
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", page, e);
                    continue;
                }
            };
            pages_fetched += 1;

            let Some(body) = body else { continue };

            for link in extract_links(&page, &body) {
                if !same_origin(&seed, &link) {
                    continue;
                }
                let key = link.to_string();

                if !depth_of.contains_key(&key) {
                    if endpoints.len() >= max_pages {
                        continue;
                    }
                    depth_of.insert(key.clone(), depth + 1);
                    endpoints.push(key.clone());
                    if depth < req.max_depth {
                        queue.push_back(link);
                    }
                }

                connections.push(Connection::new(page.to_string(), key));
            }
        }

        tracing::info!(
            "Crawled {}: {} endpoints, {} links, {} pages fetched",
            seed, endpoints.len(), connections.len(), pages_fetched
        );

        Ok(CrawlResult {
            seed: seed.to_string(),
            endpoints,
            connections,
            pages_fetched,
        })
    }
}

/// Parse and check a seed URL (http/https only)
pub fn parse_seed(raw: &str) -> Result<Url, ScanError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ScanError::Input(format!("invalid url '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScanError::Input(format!("unsupported url '{}': expected http(s)", raw)));
    }

    url.set_fragment(None);
    Ok(url)
}

/// Absolute, fragment-free http(s) links found in `html`, in document order
pub fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    LINK_RE
        .captures_iter(html)
        .filter_map(|cap| base.join(&cap[1]).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect()
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_resolves_relative() {
        let base = Url::parse("http://example.com/shop/index.html").unwrap();
        let html = r#"
            <a href="/login">Login</a>
            <a href='cart.html#top'>Cart</a>
            <form action="/search"></form>
            <a href="mailto:admin@example.com">Mail</a>
        "#;

        let links: Vec<String> = extract_links(&base, html).iter().map(|u| u.to_string()).collect();
        assert_eq!(links, vec![
            "http://example.com/login",
            "http://example.com/shop/cart.html",
            "http://example.com/search",
        ]);
    }

    #[test]
    fn test_same_origin() {
        let seed = Url::parse("https://example.com/").unwrap();
        assert!(same_origin(&seed, &Url::parse("https://example.com:443/a").unwrap()));
        assert!(!same_origin(&seed, &Url::parse("http://example.com/a").unwrap()));
        assert!(!same_origin(&seed, &Url::parse("https://cdn.example.com/a").unwrap()));
    }

    #[test]
    fn test_parse_seed_rejects_non_http() {
        assert_eq!(parse_seed("ftp://example.com").unwrap_err().kind(), "input_error");
        assert_eq!(parse_seed("not a url").unwrap_err().kind(), "input_error");
        assert_eq!(parse_seed(" https://example.com/#x ").unwrap().as_str(), "https://example.com/");
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr)
    }

    fn local_crawler(page_timeout: Duration, max_page_bytes: usize) -> HttpCrawler {
        HttpCrawler {
            client: Client::builder().no_proxy().timeout(page_timeout).build().unwrap(),
            max_page_bytes,
        }
    }

    #[tokio::test]
    async fn test_slow_and_oversized_pages_do_not_stall_crawl() {
        use axum::{response::Html, routing::get, Router};

        let app = Router::new()
            .route("/", get(|| async { Html(r#"<a href="/slow">slow</a> <a href="/big">big</a>"#) }))
            .route("/slow", get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Html(r#"<a href="/hidden">hidden</a>"#)
            }))
            .route("/big", get(|| async {
                Html(format!("{}<a href=\"/beyond\">beyond</a>", " ".repeat(4096)))
            }));
        let seed = serve(app).await;

        let crawler = local_crawler(Duration::from_millis(300), 1024);
        let started = std::time::Instant::now();
        let result = crawler
            .crawl(CrawlRequest { seed: seed.clone(), max_pages: 10, max_depth: 3, credentials: None })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.endpoints, vec![seed.clone(), format!("{}slow", seed), format!("{}big", seed)]);
        assert_eq!(result.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_seed_timeout_is_upstream_failure() {
        use axum::{routing::get, Router};

        let app = Router::new().route("/", get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "late"
        }));
        let seed = serve(app).await;

        let err = local_crawler(Duration::from_millis(200), 1024)
            .crawl(CrawlRequest { seed, max_pages: 5, max_depth: 1, credentials: None })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_failure");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials { username: "admin".into(), password: "hunter2".into() };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
