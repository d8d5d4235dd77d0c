//! Scan Pipeline
//!
//! ```text
//!   url ──► crawler ─┐
//!                    ├─► RecordSet ─► features ─┬─► risk scorer ──┐
//!   file ─► parser ──┘                          └─► topology ─► paths ─┴─► aggregate ─► ThreatReport
//! ```
//!
//! # Components
//! - `ingest.rs`: url / file selection and normalization
//! - `features.rs`: feature table per endpoint
//! - `scorer.rs`: model scoring with neutral fallback
//! - `topology.rs`: endpoint graph
//! - `paths.rs`: shortest attack paths
//! - `aggregate.rs`: threat level, bands, report assembly
//! - `alerts.rs`: fire-and-forget alert dispatch

pub mod aggregate;
pub mod alerts;
pub mod features;
pub mod ingest;
pub mod paths;
pub mod scorer;
pub mod topology;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::clients::{Crawler, ModelRegistry, TabularParser};
use crate::config::{CrawlConfig, ModelConfig, ScanConfig};
use crate::error::ScanError;
use crate::models::{CrawlResult, Degradation, Endpoint, FeatureRecord, ThreatReport};

pub use aggregate::Reducer;
pub use alerts::AlertDispatcher;
pub use ingest::{CrawlOptions, ScanInput, ScanProfile, Source, Upload};
pub use scorer::ScoreOutcome;
pub use topology::Topology;

/// Run an upstream call under a deadline
pub async fn with_deadline<F: Future>(
    service: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, ScanError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ScanError::UpstreamTimeout { service, timeout })
}

/// Everything a scan needs, shared across requests
pub struct ScanEngine {
    pub crawler: Arc<dyn Crawler>,
    pub parser: Arc<dyn TabularParser>,
    pub models: ModelRegistry,
    pub dispatcher: AlertDispatcher,
    pub crawl_config: CrawlConfig,
    pub model_config: ModelConfig,
    pub scan_config: ScanConfig,
}

/// Per-endpoint scores of an uploaded table
#[derive(Debug, Clone)]
pub struct Predictions {
    pub endpoints: Vec<Endpoint>,
    pub outcome: ScoreOutcome,
}

impl ScanEngine {
    pub async fn crawl(&self, seed: &str, options: &CrawlOptions) -> Result<CrawlResult, ScanError> {
        ingest::crawl(self.crawler.as_ref(), &self.crawl_config, seed, options).await
    }

    pub async fn score(&self, features: &[FeatureRecord]) -> ScoreOutcome {
        scorer::score(&self.models, features, self.model_config.timeout).await
    }

    pub async fn predict_upload(&self, upload: &Upload) -> Result<Predictions, ScanError> {
        let records = ingest::from_upload(self.parser.clone(), &self.scan_config, upload).await?;
        let features = features::extract(&records, self.scan_config.scale_features)?;
        let outcome = self.score(&features).await;

        Ok(Predictions {
            endpoints: records.endpoints,
            outcome,
        })
    }

    /// Full scan: ingest, extract, score and map topology, find paths, aggregate
    pub async fn run(&self, input: &ScanInput) -> Result<ThreatReport, ScanError> {
        let records = match ingest::select_source(input)? {
            Source::Url(url) => {
                ingest::from_url(self.crawler.as_ref(), &self.crawl_config, url, &input.options).await?
            }
            Source::File(upload) => {
                ingest::from_upload(self.parser.clone(), &self.scan_config, upload).await?
            }
        };

        let features = features::extract(&records, self.scan_config.scale_features)?;

        let (outcome, topology) = tokio::join!(
            self.score(&features),
            async { Topology::build(&records.endpoints, &records.connections) },
        );

        let mut degradations: Vec<Degradation> = outcome.degradation.into_iter().collect();

        let attack_paths = match (records.endpoints.first(), records.endpoints.last()) {
            (Some(start), Some(end)) if records.endpoints.len() >= 2 => {
                match paths::all_shortest_paths(&topology, start, end, self.scan_config.max_attack_paths) {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!("Attack path search failed: {}", e);
                        degradations.push(Degradation {
                            stage: "path_analyzer",
                            kind: e.kind(),
                            detail: e.to_string(),
                        });
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let weights: Option<Vec<f64>> = (self.scan_config.reducer == Reducer::Weighted).then(|| {
            records
                .endpoints
                .iter()
                .map(|e| 1.0 + topology.degree(e) as f64)
                .collect()
        });

        let report = aggregate::assemble(aggregate::ReportParts {
            records: &records,
            scores: &outcome.scores,
            weights: weights.as_deref(),
            reducer: self.scan_config.reducer,
            network: topology.summary(records.synthesized),
            attack_paths,
            degradations,
        });

        tracing::info!(
            scan_id = %report.scan_id,
            "Scan complete: {} endpoints, {} nodes, {} edges, {} paths, threat level {} ({}){}",
            records.endpoints.len(),
            topology.node_count(),
            topology.edge_count(),
            report.attack_paths.len(),
            report.threat_level,
            report.severity.as_str(),
            if report.degraded { " [degraded]" } else { "" }
        );

        self.maybe_auto_alert(&report);

        Ok(report)
    }

    fn maybe_auto_alert(&self, report: &ThreatReport) {
        let Some(threshold) = self.scan_config.auto_alert_threshold else {
            return;
        };
        if report.threat_level <= threshold {
            return;
        }

        let headline = report.alerts.first().map(|a| a.message.as_str()).unwrap_or_default();
        self.dispatcher.dispatch(json!({
            "scan_id": report.scan_id,
            "message": headline,
            "level": report.severity,
            "threat_level": report.threat_level,
            "source": report.source,
            "metadata": report.metadata,
            "degraded": report.degraded,
            "attack_paths": report.attack_paths,
        }));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::clients::model::Predictor;
    use crate::clients::{AlertSink, CrawlRequest, CsvParser};
    use crate::config::Config;
    use crate::models::{Connection, Severity};
    use scorer::tests::Stub;

    /// Crawler returning a fixed crawl
    pub(crate) struct FixedCrawler {
        pub endpoints: Vec<&'static str>,
        pub connections: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Crawler for FixedCrawler {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn crawl(&self, req: CrawlRequest) -> Result<CrawlResult, ScanError> {
            Ok(CrawlResult {
                seed: req.seed,
                endpoints: self.endpoints.iter().map(|s| s.to_string()).collect(),
                connections: self.connections.iter().map(|(a, b)| Connection::new(*a, *b)).collect(),
                pages_fetched: self.endpoints.len(),
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingSink {
        pub pushed: AtomicUsize,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn push(&self, _payload: &Value) -> Result<(), ScanError> {
            self.pushed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn engine_with(
        crawler: FixedCrawler,
        predictor: Stub,
        sink: Arc<dyn AlertSink>,
        tweak: impl FnOnce(&mut Config),
    ) -> ScanEngine {
        let mut config = Config::default();
        tweak(&mut config);
        let predictor: Arc<dyn Predictor> = Arc::new(predictor);

        ScanEngine {
            crawler: Arc::new(crawler),
            parser: Arc::new(CsvParser::default()),
            models: ModelRegistry::with_predictor(predictor),
            dispatcher: AlertDispatcher::new(sink, &config.alert),
            crawl_config: config.crawl,
            model_config: config.model,
            scan_config: config.scan,
        }
    }

    fn url_input() -> ScanInput {
        ScanInput { url: Some("http://target.local/".into()), ..Default::default() }
    }

    #[tokio::test]
    async fn test_chain_scan_is_critical() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a", "b", "c"], connections: vec![("a", "b"), ("b", "c")] },
            Stub::Fixed(vec![0.9, 0.9, 0.9]),
            Arc::new(CountingSink::default()),
            |_| {},
        );

        let report = engine.run(&url_input()).await.unwrap();
        assert_eq!(report.threat_level, 90);
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.alerts[0].message, "High threat detected!");
        assert_eq!(report.attack_paths, vec![vec!["a", "b", "c"]]);
        assert_eq!(report.vulnerabilities.len(), 3);
        assert_eq!(report.network.nodes, vec!["a", "b", "c"]);
        assert_eq!(report.network.edges, vec![Connection::new("a", "b"), Connection::new("b", "c")]);
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_single_endpoint_skips_paths() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["solo"], connections: vec![] },
            Stub::Fixed(vec![0.1]),
            Arc::new(CountingSink::default()),
            |_| {},
        );

        let report = engine.run(&url_input()).await.unwrap();
        assert_eq!(report.threat_level, 10);
        assert_eq!(report.severity, Severity::Info);
        assert!(report.attack_paths.is_empty());
        assert_eq!(report.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_scorer_failure_is_flagged() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a", "b"], connections: vec![("a", "b")] },
            Stub::Fail,
            Arc::new(CountingSink::default()),
            |_| {},
        );

        let report = engine.run(&url_input()).await.unwrap();
        assert_eq!(report.threat_level, 0);
        assert_eq!(report.severity, Severity::Info);
        assert!(report.vulnerabilities.iter().all(|v| v.score == 0.0));
        assert!(report.degraded);
        assert_eq!(report.degradations[0].stage, "risk_scorer");
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[1].level, Severity::Warning);
    }

    #[tokio::test]
    async fn test_no_path_is_not_an_error() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a", "b", "c"], connections: vec![("c", "a")] },
            Stub::Fixed(vec![0.5, 0.5, 0.5]),
            Arc::new(CountingSink::default()),
            |_| {},
        );

        let report = engine.run(&url_input()).await.unwrap();
        assert!(report.attack_paths.is_empty());
        assert_eq!(report.severity, Severity::Warning);
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_weighted_reducer_favours_hubs() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["hub", "x", "y"], connections: vec![("hub", "x"), ("hub", "y")] },
            Stub::Fixed(vec![1.0, 0.0, 0.0]),
            Arc::new(CountingSink::default()),
            |c| c.scan.reducer = Reducer::Weighted,
        );

        // weights 3, 2, 2
        let report = engine.run(&url_input()).await.unwrap();
        assert_eq!(report.threat_level, 43);
    }

    #[tokio::test]
    async fn test_file_scan() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec![], connections: vec![] },
            Stub::Fixed(vec![0.3, 0.7]),
            Arc::new(CountingSink::default()),
            |_| {},
        );
        let input = ScanInput {
            file: Some(Upload {
                filename: Some("kdd.csv".into()),
                bytes: b"endpoint,duration,protocol_type\nh1,0,tcp\nh2,12,udp\n".to_vec(),
            }),
            ..Default::default()
        };

        let report = engine.run(&input).await.unwrap();
        assert_eq!(report.threat_level, 50);
        assert_eq!(report.network.nodes, vec!["h1", "h2"]);
        assert!(report.attack_paths.is_empty());
        assert!(report.metadata.digest.is_some());
    }

    #[tokio::test]
    async fn test_rejects_ambiguous_input() {
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a"], connections: vec![] },
            Stub::Fixed(vec![0.0]),
            Arc::new(CountingSink::default()),
            |_| {},
        );
        let input = ScanInput {
            url: Some("http://target.local/".into()),
            file: Some(Upload { filename: None, bytes: b"a\n1\n".to_vec() }),
            ..Default::default()
        };
        assert_eq!(engine.run(&input).await.unwrap_err().kind(), "input_error");
    }

    #[tokio::test]
    async fn test_auto_alert_only_above_threshold() {
        let sink = Arc::new(CountingSink::default());
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a", "b"], connections: vec![] },
            Stub::Fixed(vec![0.9, 0.9]),
            sink.clone(),
            |c| c.scan.auto_alert_threshold = Some(75),
        );
        engine.run(&url_input()).await.unwrap();

        // Delivery happens on a spawned task
        for _ in 0..50 {
            if sink.pushed.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(sink.pushed.load(Ordering::SeqCst), 1);

        let quiet = Arc::new(CountingSink::default());
        let engine = engine_with(
            FixedCrawler { endpoints: vec!["a", "b"], connections: vec![] },
            Stub::Fixed(vec![0.9, 0.9]),
            quiet.clone(),
            |_| {},
        );
        engine.run(&url_input()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(quiet.pushed.load(Ordering::SeqCst), 0);
    }
}
