//! Error handling

use axum::{
    extract::{multipart::MultipartRejection, rejection::{FormRejection, JsonRejection}},
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::any::Any;
use std::time::Duration;

pub type AppResult<T> = Result<T, AppError>;

/// Failures raised by the scan pipeline and its upstream collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Malformed or ambiguous request
    #[error("{0}")]
    Input(String),

    /// Payload is structurally unreadable
    #[error("unreadable payload: {0}")]
    Schema(String),

    /// Malformed connection data
    #[error("invalid topology: {0}")]
    Topology(String),

    /// Path query against a node absent from the graph
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// External call exceeded its deadline
    #[error("{service} did not answer within {timeout:?}")]
    UpstreamTimeout { service: &'static str, timeout: Duration },

    /// External call returned an error
    #[error("{service} failed: {message}")]
    UpstreamFailure { service: &'static str, message: String },
}

impl ScanError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        ScanError::UpstreamFailure { service, message: err.to_string() }
    }

    /// Machine-readable kind reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Input(_) => "input_error",
            ScanError::Schema(_) => "schema_error",
            ScanError::Topology(_) => "topology_error",
            ScanError::NodeNotFound(_) => "node_not_found",
            ScanError::UpstreamTimeout { .. } => "upstream_timeout",
            ScanError::UpstreamFailure { .. } => "upstream_failure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ScanError::Input(_) => StatusCode::BAD_REQUEST,
            ScanError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScanError::Topology(_) => StatusCode::BAD_REQUEST,
            ScanError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            ScanError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ScanError::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    // Generic errors
    #[error("{0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match &self {
            AppError::Scan(err) => {
                match err {
                    ScanError::UpstreamTimeout { .. } | ScanError::UpstreamFailure { .. } => {
                        tracing::error!("Upstream error: {}", err);
                    }
                    _ => tracing::debug!("Rejected request: {}", err),
                }
                (err.status(), err.kind(), err.to_string())
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Response for a handler that panicked
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    AppError::InternalError(format!("handler panicked: {}", detail)).into_response()
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Scan(ScanError::Input(rejection.body_text()))
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Scan(ScanError::Input(rejection.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Scan(ScanError::Input(rejection.body_text()))
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::Scan(ScanError::Input(format!("malformed multipart body: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ScanError::Input("x".into()), StatusCode::BAD_REQUEST),
            (ScanError::Schema("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ScanError::NodeNotFound("x".into()), StatusCode::NOT_FOUND),
            (ScanError::UpstreamTimeout { service: "crawler", timeout: Duration::from_secs(3) }, StatusCode::GATEWAY_TIMEOUT),
            (ScanError::upstream("model", "boom"), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_panics_become_internal_errors() {
        use axum::{body::{to_bytes, Body}, http::Request, routing::get, Router};
        use tower::ServiceExt;
        use tower_http::catch_panic::CatchPanicLayer;

        let app = Router::new()
            .route("/boom", get(|| async { panic!("index out of bounds") as () }))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "internal_error");
        assert_eq!(body["status"], 500);
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_upstream_message() {
        let err = ScanError::UpstreamTimeout { service: "crawler", timeout: Duration::from_secs(30) };
        assert_eq!(err.to_string(), "crawler did not answer within 30s");
        assert_eq!(err.kind(), "upstream_timeout");
    }
}
