//! Prediction model
//!
//! Two predictors ship with the server:
//! - `LinearModel`: weights file on disk, scored in-process
//! - `RemoteModel`: JSON inference service reached over HTTP
//!
//! `ModelRegistry` loads the configured one once per process and hands out
//! shared read-only handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::ModelConfig;
use crate::error::ScanError;
use crate::models::FeatureRecord;

#[async_trait]
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    /// One score per record, in input order
    async fn predict(&self, features: &[FeatureRecord]) -> Result<Vec<f64>, ScanError>;
}

impl fmt::Debug for dyn Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor").field("name", &self.name()).finish()
    }
}

// ============================================================================
// LINEAR MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Logistic,
    Identity,
}

/// Weights file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bias: f64,
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl LinearModel {
    pub async fn load(path: &str) -> Result<Self, ScanError> {
        tracing::info!("Loading model weights from: {}", path);

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScanError::upstream("model", format!("cannot read {}: {}", path, e)))?;

        let model: LinearModel = serde_json::from_str(&raw)
            .map_err(|e| ScanError::upstream("model", format!("invalid weights file {}: {}", path, e)))?;

        tracing::info!("Model loaded: {} weights", model.weights.len());
        Ok(model)
    }

    /// Missing features contribute nothing
    pub fn score(&self, record: &FeatureRecord) -> f64 {
        let z = self.bias
            + self
                .weights
                .iter()
                .map(|(name, w)| w * record.get(name).copied().unwrap_or(0.0))
                .sum::<f64>();

        match self.activation {
            Activation::Logistic => 1.0 / (1.0 + (-z).exp()),
            Activation::Identity => z,
        }
    }
}

#[async_trait]
impl Predictor for LinearModel {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("linear")
    }

    async fn predict(&self, features: &[FeatureRecord]) -> Result<Vec<f64>, ScanError> {
        Ok(features.iter().map(|r| self.score(r)).collect())
    }
}

// ============================================================================
// REMOTE MODEL
// ============================================================================

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: &'a [FeatureRecord],
}

#[derive(Deserialize)]
struct PredictResponse {
    scores: Vec<f64>,
}

pub struct RemoteModel {
    client: Client,
    url: String,
}

impl RemoteModel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Predictor for RemoteModel {
    fn name(&self) -> &str {
        &self.url
    }

    async fn predict(&self, features: &[FeatureRecord]) -> Result<Vec<f64>, ScanError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { instances: features })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScanError::upstream("model", e))?;

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| ScanError::upstream("model", e))?;

        Ok(body.scores)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

enum ModelSource {
    Configured(ModelConfig),
    Fixed(Arc<dyn Predictor>),
}

/// Process-wide, initialize-once model handle
pub struct ModelRegistry {
    source: ModelSource,
    loaded: OnceCell<Arc<dyn Predictor>>,
}

impl ModelRegistry {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            source: ModelSource::Configured(config),
            loaded: OnceCell::new(),
        }
    }

    /// Registry around an already-built predictor
    pub fn with_predictor(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            source: ModelSource::Fixed(predictor),
            loaded: OnceCell::new(),
        }
    }

    /// Load on first use. Concurrent first callers wait for a single load;
    /// a failed load leaves the cell empty so the next caller retries.
    pub async fn get(&self) -> Result<Arc<dyn Predictor>, ScanError> {
        self.loaded
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    async fn load(&self) -> Result<Arc<dyn Predictor>, ScanError> {
        match &self.source {
            ModelSource::Fixed(predictor) => Ok(Arc::clone(predictor)),
            ModelSource::Configured(config) => {
                if let Some(url) = &config.url {
                    tracing::info!("Using remote model at {}", url);
                    Ok(Arc::new(RemoteModel::new(url.clone())))
                } else if let Some(path) = &config.path {
                    Ok(Arc::new(LinearModel::load(path).await?))
                } else {
                    Err(ScanError::upstream("model", "no model configured (set MODEL_PATH or MODEL_URL)"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn record(pairs: &[(&str, f64)]) -> FeatureRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn config(path: Option<String>) -> ModelConfig {
        ModelConfig { path, url: None, timeout: Duration::from_secs(1) }
    }

    #[test]
    fn test_linear_score() {
        let model = LinearModel {
            name: None,
            bias: 0.0,
            weights: BTreeMap::from([("x".to_string(), 2.0)]),
            activation: Activation::Identity,
        };
        assert_eq!(model.score(&record(&[("x", 1.5), ("ignored", 9.0)])), 3.0);
        assert_eq!(model.score(&record(&[])), 0.0);
    }

    #[test]
    fn test_logistic_midpoint() {
        let model = LinearModel {
            name: None,
            bias: 0.0,
            weights: BTreeMap::new(),
            activation: Activation::Logistic,
        };
        assert!((model.score(&record(&[])) - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_registry_loads_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bias": 0.1, "weights": {{"a": 1.0}}}}"#).unwrap();
        let registry = Arc::new(ModelRegistry::new(config(Some(file.path().display().to_string()))));

        let (a, b) = tokio::join!(registry.get(), registry.get());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.is_loaded());
    }

    #[tokio::test]
    async fn test_registry_without_model_fails_and_retries() {
        let registry = ModelRegistry::new(config(None));
        tokio_test::assert_err!(registry.get().await);
        assert!(!registry.is_loaded());
        tokio_test::assert_err!(registry.get().await);
    }

    #[tokio::test]
    async fn test_loaded_predictor_debug_names_model() {
        let registry = ModelRegistry::with_predictor(Arc::new(LinearModel {
            name: Some("kdd-linear".into()),
            bias: 0.0,
            weights: BTreeMap::new(),
            activation: Activation::Identity,
        }));
        let predictor = tokio_test::assert_ok!(registry.get().await);
        assert_eq!(format!("{:?}", predictor), r#"Predictor { name: "kdd-linear" }"#);
    }

    #[tokio::test]
    async fn test_bad_weights_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = LinearModel::load(&file.path().display().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_failure");
    }
}
