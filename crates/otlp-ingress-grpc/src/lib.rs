//! gRPC Receiver: the three OTLP collector services (trace, metrics, logs),
//! each handler doing exactly decode-offer-acknowledge.
//!
//! tonic has already decoded the protobuf body by the time a handler runs,
//! so unlike the HTTP receiver there is no wire-format branch here — only
//! the codec's re-encode into the configured payload format, and the
//! queue offer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use otlp_ingress_codec::DecodedRequest;
use otlp_ingress_common::{IngressError, MessageFormat, OTLPMessage, SignalKind};
use otlp_ingress_metrics::MetricsRegistry;
use otlp_ingress_proto::opentelemetry::proto::collector::{
    logs::v1::{
        logs_service_server::{LogsService, LogsServiceServer},
        ExportLogsServiceRequest, ExportLogsServiceResponse,
    },
    metrics::v1::{
        metrics_service_server::{MetricsService, MetricsServiceServer},
        ExportMetricsServiceRequest, ExportMetricsServiceResponse,
    },
    trace::v1::{
        trace_service_server::{TraceService, TraceServiceServer},
        ExportTraceServiceRequest, ExportTraceServiceResponse,
    },
};
use otlp_ingress_queue::SignalQueues;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

/// State shared by all three service handlers.
struct Dispatcher {
    queues: Arc<SignalQueues>,
    metrics: Arc<MetricsRegistry>,
    format: MessageFormat,
}

impl Dispatcher {
    /// decode-offer-ack, parametrised by signal kind. The "decode" step is
    /// a no-op re-wrap: tonic already produced a typed request, the codec
    /// only needs to serialise it into the configured outbound format.
    fn handle(&self, decoded: DecodedRequest) -> Result<(), Status> {
        let signal = decoded.signal();
        let payload = otlp_ingress_codec::encode(&decoded, self.format)
            .map_err(|e| Status::internal(format!("failed to encode payload: {e}")))?;

        let ingest_time = monotonic_millis();
        let msg = OTLPMessage::new(signal, payload, ingest_time);

        if self.queues.get(signal).offer(msg) {
            self.metrics.increment_received(signal);
        } else {
            self.metrics.increment_dropped(signal);
        }

        // Acknowledges buffering, not downstream delivery — see §4.D.
        Ok(())
    }
}

fn monotonic_millis() -> u64 {
    use std::sync::OnceLock;
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);
    start.elapsed().as_millis() as u64
}

struct TraceHandler(Arc<Dispatcher>);

#[tonic::async_trait]
impl TraceService for TraceHandler {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        self.0.handle(DecodedRequest::Traces(request.into_inner()))?;
        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

struct MetricsHandler(Arc<Dispatcher>);

#[tonic::async_trait]
impl MetricsService for MetricsHandler {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        self.0.handle(DecodedRequest::Metrics(request.into_inner()))?;
        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

struct LogsHandler(Arc<Dispatcher>);

#[tonic::async_trait]
impl LogsService for LogsHandler {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        self.0.handle(DecodedRequest::Logs(request.into_inner()))?;
        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

/// A running gRPC receiver. Dropping this without calling [`Self::stop`]
/// aborts the server task immediately; `stop` is the documented path.
pub struct GrpcReceiver {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: tokio::task::JoinHandle<Result<(), tonic::transport::Error>>,
}

/// Binds and starts the three collector services on `addr`.
///
/// TLS is a declared extension (§4.D, §9 Open Questions): this
/// implementation fails fast rather than silently serving plaintext when
/// `tls_enabled` is set, since no certificate material is wired into the
/// transport builder here.
pub async fn start(
    addr: SocketAddr,
    queues: Arc<SignalQueues>,
    metrics: Arc<MetricsRegistry>,
    format: MessageFormat,
    tls_enabled: bool,
) -> Result<GrpcReceiver, IngressError> {
    if tls_enabled {
        return Err(IngressError::ConfigInvalid(
            "otlp.tls.enabled is not implemented for the gRPC receiver".to_string(),
        ));
    }

    let dispatcher = Arc::new(Dispatcher {
        queues,
        metrics,
        format,
    });

    let trace_server = TraceServiceServer::new(TraceHandler(dispatcher.clone()));
    let metrics_server = MetricsServiceServer::new(MetricsHandler(dispatcher.clone()));
    let logs_server = LogsServiceServer::new(LogsHandler(dispatcher));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let router = Server::builder()
        .add_service(trace_server)
        .add_service(metrics_server)
        .add_service(logs_server);

    // Bind synchronously so a port conflict surfaces before this function
    // returns, not as a silent failure deep inside the spawned task.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| IngressError::BindFailure {
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| IngressError::BindFailure {
        addr: addr.to_string(),
        source,
    })?;
    let incoming = tonic::transport::server::TcpIncoming::from(listener);

    info!(addr = %local_addr, "gRPC receiver listening");

    let join_handle = tokio::spawn(async move {
        router
            .serve_with_incoming_shutdown(incoming, async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(GrpcReceiver {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        join_handle,
    })
}

impl GrpcReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Requests graceful shutdown and waits up to 5 s for outstanding RPCs
    /// to complete. On timeout or interruption, forces termination by
    /// aborting the server task (§4.F Stop, step 2).
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(Duration::from_secs(5), &mut self.join_handle).await {
            Ok(Ok(Ok(()))) => info!("gRPC receiver stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "gRPC receiver exited with an error"),
            Ok(Err(e)) => warn!(error = %e, "gRPC receiver task panicked"),
            Err(_) => {
                warn!("gRPC receiver did not quiesce within 5s, forcing termination");
                self.join_handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otlp_ingress_proto::opentelemetry::proto::collector::trace::v1::trace_service_client::TraceServiceClient;
    use otlp_ingress_queue::SignalQueues;

    #[tokio::test]
    async fn export_offers_to_queue_and_acks() {
        let queues = Arc::new(SignalQueues::new(10));
        let metrics = Arc::new(MetricsRegistry::new());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        // Bind manually to learn the ephemeral port, then hand the same
        // listener contract off through the library's `start`.
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let bound_addr = listener.local_addr().unwrap();
        drop(listener);

        let receiver = start(bound_addr, queues.clone(), metrics.clone(), MessageFormat::Json, false)
            .await
            .unwrap();

        // Give the spawned server a moment to start accepting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = TraceServiceClient::connect(format!("http://{bound_addr}"))
            .await
            .unwrap();
        let response = client
            .export(ExportTraceServiceRequest {
                resource_spans: vec![],
            })
            .await;
        assert!(response.is_ok());

        assert_eq!(queues.get(SignalKind::Traces).size(), 1);
        assert_eq!(metrics.received(SignalKind::Traces), 1);

        receiver.stop().await;
    }

    #[test]
    fn tls_enabled_is_rejected_at_start() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(async {
            let queues = Arc::new(SignalQueues::new(10));
            let metrics = Arc::new(MetricsRegistry::new());
            start(
                "127.0.0.1:0".parse().unwrap(),
                queues,
                metrics,
                MessageFormat::Json,
                true,
            )
            .await
        });
        assert!(matches!(result, Err(IngressError::ConfigInvalid(_))));
    }
}
