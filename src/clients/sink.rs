//! Alert sinks

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::ScanError;

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn push(&self, payload: &Value) -> Result<(), ScanError>;
}

/// POSTs the payload as JSON to a webhook
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn push(&self, payload: &Value) -> Result<(), ScanError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScanError::upstream("alert sink", e))?;

        tracing::debug!("Alert accepted by webhook ({})", response.status());
        Ok(())
    }
}

/// Records alerts in the log stream only. Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn push(&self, payload: &Value) -> Result<(), ScanError> {
        tracing::warn!(target: "alerts", %payload, "Alert raised");
        Ok(())
    }
}
