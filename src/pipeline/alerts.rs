//! Alert dispatch
//!
//! Fire-and-forget: delivery runs in its own task, with a deadline per
//! attempt and a fixed backoff between attempts. The last failure is logged.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use super::with_deadline;
use crate::clients::AlertSink;
use crate::config::AlertConfig;

#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, config: &AlertConfig) -> Self {
        Self {
            sink,
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Hand the payload to a background task and return immediately.
    /// The handle resolves to whether delivery succeeded.
    pub fn dispatch(&self, payload: Value) -> JoinHandle<bool> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.deliver(&payload).await })
    }

    pub async fn deliver(&self, payload: &Value) -> bool {
        for attempt in 1..=self.max_attempts {
            let result = with_deadline("alert sink", self.timeout, self.sink.push(payload))
                .await
                .and_then(|r| r);

            match result {
                Ok(()) => {
                    tracing::info!("Alert delivered via {} (attempt {})", self.sink.name(), attempt);
                    return true;
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        "Alert delivery via {} failed (attempt {}/{}): {}",
                        self.sink.name(), attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    tracing::error!(
                        %payload,
                        "Alert dropped after {} attempts via {}: {}",
                        self.max_attempts, self.sink.name(), e
                    );
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::ScanError;

    /// Fails the first `failures` pushes, then accepts
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AlertSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn push(&self, _payload: &Value) -> Result<(), ScanError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ScanError::upstream("alert sink", "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    struct HangingSink;

    #[async_trait]
    impl AlertSink for HangingSink {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn push(&self, _payload: &Value) -> Result<(), ScanError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn config(max_attempts: u32) -> AlertConfig {
        AlertConfig {
            webhook_url: None,
            timeout: Duration::from_millis(50),
            max_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let sink = Arc::new(FlakySink { failures: 2, calls: AtomicU32::new(0) });
        let dispatcher = AlertDispatcher::new(sink.clone(), &config(3));

        let delivered = dispatcher.dispatch(json!({"message": "x"})).await.unwrap();
        assert!(delivered);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = Arc::new(FlakySink { failures: 10, calls: AtomicU32::new(0) });
        let dispatcher = AlertDispatcher::new(sink.clone(), &config(2));

        assert!(!dispatcher.deliver(&json!({})).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hanging_sink_times_out() {
        let dispatcher = AlertDispatcher::new(Arc::new(HangingSink), &config(1));
        assert!(!dispatcher.deliver(&json!({})).await);
    }
}
