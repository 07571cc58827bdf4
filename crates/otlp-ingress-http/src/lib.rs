//! HTTP Receiver: the three OTLP POST endpoints plus `/health` and
//! `/ready`, content-type driven decode, fast offer-or-drop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use otlp_ingress_codec::InputFormat;
use otlp_ingress_common::{IngressError, MessageFormat, OTLPMessage, SignalKind};
use otlp_ingress_metrics::MetricsRegistry;
use otlp_ingress_queue::SignalQueues;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    queues: Arc<SignalQueues>,
    metrics: Arc<MetricsRegistry>,
    format: MessageFormat,
}

fn monotonic_millis() -> u64 {
    use std::sync::OnceLock;
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);
    start.elapsed().as_millis() as u64
}

async fn handle_signal(
    signal: SignalKind,
    state: &AppState,
    content_type: Option<&str>,
    body: axum::body::Bytes,
) -> Response {
    let format = InputFormat::from_content_type(content_type);

    let decoded = match otlp_ingress_codec::decode(signal, &body, format) {
        Ok(d) => d,
        Err(e) => {
            return bad_request(e);
        }
    };

    let payload = match otlp_ingress_codec::encode(&decoded, state.format) {
        Ok(p) => p,
        Err(e) => return bad_request(e),
    };

    let msg = OTLPMessage::new(signal, payload, monotonic_millis());

    if state.queues.get(signal).offer(msg) {
        state.metrics.increment_received(signal);
        (StatusCode::OK, Json(json!({}))).into_response()
    } else {
        state.metrics.increment_dropped(signal);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Queue full"})),
        )
            .into_response()
    }
}

fn bad_request(e: IngressError) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response()
}

async fn handle_traces(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    handle_signal(SignalKind::Traces, &state, content_type, body).await
}

async fn handle_metrics(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    handle_signal(SignalKind::Metrics, &state, content_type, body).await
}

async fn handle_logs(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    handle_signal(SignalKind::Logs, &state, content_type, body).await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

async fn unknown_endpoint(OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("Unknown endpoint: {uri}")})),
    )
        .into_response()
}

fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/traces", post(handle_traces))
        .route("/v1/metrics", post(handle_metrics))
        .route("/v1/logs", post(handle_logs))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .fallback(unknown_endpoint)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// A running HTTP receiver.
pub struct HttpReceiver {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: tokio::task::JoinHandle<()>,
}

pub async fn start(
    addr: SocketAddr,
    queues: Arc<SignalQueues>,
    metrics: Arc<MetricsRegistry>,
    format: MessageFormat,
    max_body_bytes: usize,
    tls_enabled: bool,
) -> Result<HttpReceiver, IngressError> {
    if tls_enabled {
        return Err(IngressError::ConfigInvalid(
            "otlp.tls.enabled is not implemented for the HTTP receiver".to_string(),
        ));
    }

    let state = AppState {
        queues,
        metrics,
        format,
    };
    let app = router(state, max_body_bytes);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| IngressError::BindFailure {
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| IngressError::BindFailure {
        addr: addr.to_string(),
        source,
    })?;

    info!(addr = %local_addr, "HTTP receiver listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "HTTP receiver exited with an error");
        }
    });

    Ok(HttpReceiver {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        join_handle,
    })
}

impl HttpReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Closes the listening socket and shuts down worker pools, waiting up
    /// to 5 s for quiescence before forcing termination (§4.F Stop, step 2).
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(Duration::from_secs(5), &mut self.join_handle).await {
            Ok(Ok(())) => info!("HTTP receiver stopped"),
            Ok(Err(e)) => warn!(error = %e, "HTTP receiver task panicked"),
            Err(_) => {
                warn!("HTTP receiver did not quiesce within 5s, forcing termination");
                self.join_handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otlp_ingress_proto::opentelemetry::proto::collector::metrics::v1::ExportMetricsServiceRequest;
    use prost::Message;

    #[tokio::test]
    async fn start_and_stop_binds_and_shuts_down_cleanly() {
        let queues = Arc::new(SignalQueues::new(10));
        let metrics = Arc::new(MetricsRegistry::new());
        let receiver = start(
            "127.0.0.1:0".parse().unwrap(),
            queues,
            metrics,
            MessageFormat::Json,
            10 * 1024 * 1024,
            false,
        )
        .await
        .unwrap();
        receiver.stop().await;
    }

    #[tokio::test]
    async fn method_not_allowed_on_get_to_post_only_route() {
        let queues = Arc::new(SignalQueues::new(10));
        let metrics = Arc::new(MetricsRegistry::new());
        let app = router(
            AppState {
                queues,
                metrics,
                format: MessageFormat::Json,
            },
            10 * 1024 * 1024,
        );

        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/traces")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_returns_404_with_message() {
        let queues = Arc::new(SignalQueues::new(10));
        let metrics = Arc::new(MetricsRegistry::new());
        let app = router(
            AppState {
                queues,
                metrics,
                format: MessageFormat::Json,
            },
            10 * 1024 * 1024,
        );

        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn protobuf_body_decodes_and_enqueues() {
        let queues = Arc::new(SignalQueues::new(10));
        let metrics = Arc::new(MetricsRegistry::new());
        let app = router(
            AppState {
                queues: queues.clone(),
                metrics: metrics.clone(),
                format: MessageFormat::Protobuf,
            },
            10 * 1024 * 1024,
        );

        let req = ExportMetricsServiceRequest {
            resource_metrics: vec![],
        };
        let bytes = req.encode_to_vec();

        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/metrics")
                    .header("content-type", "application/x-protobuf")
                    .body(Body::from(bytes))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(queues.get(SignalKind::Metrics).size(), 1);
        assert_eq!(metrics.received(SignalKind::Metrics), 1);
    }

    #[tokio::test]
    async fn queue_full_returns_503() {
        let queues = Arc::new(SignalQueues::new(1));
        queues
            .get(SignalKind::Logs)
            .offer(OTLPMessage::new(SignalKind::Logs, "x".to_string(), 0));
        let metrics = Arc::new(MetricsRegistry::new());
        let app = router(
            AppState {
                queues: queues.clone(),
                metrics: metrics.clone(),
                format: MessageFormat::Protobuf,
            },
            10 * 1024 * 1024,
        );

        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/logs")
                    .header("content-type", "application/x-protobuf")
                    .body(Body::from(
                        otlp_ingress_proto::opentelemetry::proto::collector::logs::v1::ExportLogsServiceRequest {
                            resource_logs: vec![],
                        }
                        .encode_to_vec(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(metrics.dropped(SignalKind::Logs), 1);
    }
}
