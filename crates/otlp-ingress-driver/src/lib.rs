//! Source Driver: the poll/commit lifecycle a Kafka Connect-style
//! framework drives, plus the offset bookkeeping that makes restarts
//! resumable (§4.F).

pub mod offset;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use otlp_ingress_common::{IngressError, MessageFormat, PartitionKey, Record, SignalKind};
use otlp_ingress_config::RuntimeConfig;
use otlp_ingress_metrics::MetricsRegistry;
use otlp_ingress_queue::SignalQueues;
use tracing::{error, info, warn};

pub use offset::{FileOffsetStore, NullOffsetStore, OffsetReader, OffsetWriter};

const POLL_WAIT: Duration = Duration::from_millis(100);
const BATCH_PER_SIGNAL: usize = 100;
const DRAIN_TICK: Duration = Duration::from_millis(100);
const T_DRAIN: Duration = Duration::from_secs(5);
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(30);

fn signal_index(signal: SignalKind) -> usize {
    SignalKind::ALL.iter().position(|s| *s == signal).expect("SignalKind::ALL is exhaustive")
}

struct PerSignal<T> {
    traces: T,
    metrics: T,
    logs: T,
}

impl<T> PerSignal<T> {
    fn get(&self, signal: SignalKind) -> &T {
        match signal {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics,
            SignalKind::Logs => &self.logs,
        }
    }
}

/// The running instance: counters, queues, receivers, and the offset
/// store this session resumed from.
pub struct SourceDriver {
    connector_name: String,
    session_id: String,
    config: RuntimeConfig,
    queues: Arc<SignalQueues>,
    metrics: Arc<MetricsRegistry>,
    next: PerSignal<AtomicI64>,
    committed: PerSignal<AtomicI64>,
    stopping: AtomicBool,
    grpc: StdMutex<Option<otlp_ingress_grpc::GrpcReceiver>>,
    http: StdMutex<Option<otlp_ingress_http::HttpReceiver>>,
    last_metrics_log: StdMutex<Instant>,
}

impl SourceDriver {
    /// Ordered start sequence from §4.F: fresh session id, best-effort
    /// metrics registration, per-signal offset resume, then receiver
    /// construction. Receiver startup failure is fatal and this function
    /// returns the error without partially registering metrics state that
    /// would outlive a failed instance.
    pub async fn start(
        config: RuntimeConfig,
        offset_reader: &dyn OffsetReader,
    ) -> Result<Self, IngressError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.register(&config.connector_name);

        let mut next = [0i64; 3];
        let mut committed = [-1i64; 3];

        for signal in SignalKind::ALL {
            let idx = signal_index(signal);
            let partition = PartitionKey {
                connector_name: config.connector_name.clone(),
                signal_name: signal.name().to_string(),
            };
            if let Some(record) = offset_reader.read(&partition) {
                next[idx] = record.sequence;
                committed[idx] = record.sequence;
                if record.session_id != session_id {
                    warn!(
                        signal = signal.name(),
                        prior_session = record.session_id,
                        new_session = session_id,
                        resumed_sequence = record.sequence,
                        "resuming across a session restart"
                    );
                }
            }
        }

        let queues = Arc::new(SignalQueues::new(config.otlp.message.queue_size));
        metrics.set_queue_capacity(config.otlp.message.queue_size as u64);

        let bind_ip: std::net::IpAddr = config
            .otlp
            .bind_address
            .parse()
            .map_err(|e| IngressError::ConfigInvalid(format!("invalid otlp.bind_address: {e}")))?;

        let message_format = match config.otlp.message.format {
            otlp_ingress_config::MessageFormatConfig::Json => MessageFormat::Json,
            otlp_ingress_config::MessageFormatConfig::Protobuf => MessageFormat::Protobuf,
        };

        let grpc = if config.otlp.grpc.enabled {
            let addr = std::net::SocketAddr::new(bind_ip, config.otlp.grpc.port);
            Some(
                otlp_ingress_grpc::start(
                    addr,
                    queues.clone(),
                    metrics.clone(),
                    message_format,
                    config.otlp.tls.enabled,
                )
                .await?,
            )
        } else {
            None
        };

        let http = if config.otlp.http.enabled {
            let addr = std::net::SocketAddr::new(bind_ip, config.otlp.http.port);
            Some(
                otlp_ingress_http::start(
                    addr,
                    queues.clone(),
                    metrics.clone(),
                    message_format,
                    config.otlp.http.max_body_bytes,
                    config.otlp.tls.enabled,
                )
                .await?,
            )
        } else {
            None
        };

        info!(session_id, connector_name = %config.connector_name, "driver started");

        Ok(Self {
            connector_name: config.connector_name.clone(),
            session_id,
            config,
            queues,
            metrics,
            next: PerSignal {
                traces: AtomicI64::new(next[0]),
                metrics: AtomicI64::new(next[1]),
                logs: AtomicI64::new(next[2]),
            },
            committed: PerSignal {
                traces: AtomicI64::new(committed[0]),
                metrics: AtomicI64::new(committed[1]),
                logs: AtomicI64::new(committed[2]),
            },
            stopping: AtomicBool::new(false),
            grpc: StdMutex::new(grpc),
            http: StdMutex::new(http),
            last_metrics_log: StdMutex::new(Instant::now()),
        })
    }

    /// The gRPC receiver's bound address, useful for tests that configure
    /// port 0 and need to discover the OS-assigned ephemeral port.
    pub fn grpc_addr(&self) -> Option<std::net::SocketAddr> {
        self.grpc.lock().ok()?.as_ref().map(|g| g.local_addr())
    }

    /// The HTTP receiver's bound address; see [`Self::grpc_addr`].
    pub fn http_addr(&self) -> Option<std::net::SocketAddr> {
        self.http.lock().ok()?.as_ref().map(|h| h.local_addr())
    }

    fn topic_for(&self, signal: SignalKind) -> String {
        match signal {
            SignalKind::Traces => self.config.kafka.topic_traces.clone(),
            SignalKind::Metrics => self.config.kafka.topic_metrics.clone(),
            SignalKind::Logs => self.config.kafka.topic_logs.clone(),
        }
    }

    /// Returns `None` while stopping or when a poll cycle drained nothing;
    /// otherwise a batch of at most 300 records assembled in the fixed
    /// `TRACES, METRICS, LOGS` order (§4.F Poll).
    pub async fn poll(&self) -> Option<Vec<Record>> {
        if self.stopping.load(Ordering::Acquire) {
            return None;
        }

        let mut records = Vec::new();

        for signal in SignalKind::ALL {
            let queue = self.queues.get(signal);
            let Some(first) = queue.poll(POLL_WAIT) else {
                continue;
            };
            let mut batch = Vec::with_capacity(BATCH_PER_SIGNAL);
            batch.push(first);
            batch.extend(queue.drain_up_to(BATCH_PER_SIGNAL - 1));

            let next_counter = self.next.get(signal);
            let topic = self.topic_for(signal);
            for msg in batch {
                let sequence = next_counter.fetch_add(1, Ordering::AcqRel) + 1;
                records.push(Record {
                    topic: topic.clone(),
                    value: msg.payload,
                    value_type: "string",
                    timestamp: msg.ingest_time,
                    partition_key: PartitionKey {
                        connector_name: self.connector_name.clone(),
                        signal_name: signal.name().to_string(),
                    },
                    offset_key: otlp_ingress_common::OffsetKey {
                        session_id: self.session_id.clone(),
                        signal_name: signal.name().to_string(),
                        sequence,
                    },
                });
            }
        }

        if records.is_empty() {
            return None;
        }

        self.metrics.increment_records_produced(records.len() as u64);
        self.maybe_log_metrics();

        Some(records)
    }

    fn maybe_log_metrics(&self) {
        let mut last = match self.last_metrics_log.lock() {
            Ok(l) => l,
            Err(_) => return,
        };
        if last.elapsed() < METRICS_LOG_INTERVAL {
            return;
        }
        *last = Instant::now();
        let snapshot = self.metrics.snapshot();
        info!(
            total_received = snapshot.total_received,
            total_dropped = snapshot.total_dropped,
            records_produced = snapshot.records_produced,
            max_queue_utilization_percent = snapshot.max_queue_utilization_percent,
            total_lag = snapshot.total_lag,
            drop_rate = snapshot.drop_rate,
            "ingress metrics"
        );
    }

    /// Updates the committed watermark for the signal named in
    /// `record.offset_key`. Any panic while doing so is caught and
    /// swallowed (`CommitCallbackFault`, §7): a faulty commit must never
    /// interrupt the commit stream.
    ///
    /// `committed(s)` only ever advances: an out-of-order commit with a
    /// lower sequence is logged as a gap but does not regress the
    /// watermark, which is what keeps P5 (commit safety) true under
    /// concurrent, possibly reordered commits.
    pub fn commit(&self, record: &Record) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.commit_inner(record)
        }));
        if let Err(e) = outcome {
            error!(error = ?e, "commit callback fault, swallowed");
        }
    }

    fn commit_inner(&self, record: &Record) {
        let Some(signal) = SignalKind::from_name(&record.offset_key.signal_name) else {
            warn!(signal = record.offset_key.signal_name, "commit for unknown signal ignored");
            return;
        };
        let new = record.offset_key.sequence;
        let counter = self.committed.get(signal);

        let previous = counter.fetch_max(new, Ordering::AcqRel);
        if previous > 0 && new != previous + 1 {
            warn!(
                signal = signal.name(),
                previous,
                new,
                gap = new - previous - 1,
                "commit gap detected"
            );
        }
    }

    pub fn committed_sequence(&self, signal: SignalKind) -> i64 {
        self.committed.get(signal).load(Ordering::Acquire)
    }

    /// The `received(s)` counter, for tests and operational inspection.
    pub fn received(&self, signal: SignalKind) -> u64 {
        self.metrics.received(signal)
    }

    /// The `dropped(s)` counter, for tests and operational inspection.
    pub fn dropped(&self, signal: SignalKind) -> u64 {
        self.metrics.dropped(signal)
    }

    /// The drain state machine from §4.F Stop, bounded 5s (receivers) + 5s
    /// (receivers) + 5s (drain) ≈ 15s worst case (§6).
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);

        if let Some(grpc) = self.grpc.lock().ok().and_then(|mut g| g.take()) {
            grpc.stop().await;
        }
        if let Some(http) = self.http.lock().ok().and_then(|mut h| h.take()) {
            http.stop().await;
        }

        let deadline = Instant::now() + T_DRAIN;
        loop {
            let mut drained_any = false;
            for signal in SignalKind::ALL {
                let drained = self.queues.get(signal).drain_up_to(BATCH_PER_SIGNAL);
                if !drained.is_empty() {
                    drained_any = true;
                }
            }
            if !drained_any || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(DRAIN_TICK).await;
        }

        let snapshot = self.metrics.snapshot();
        info!(
            total_received = snapshot.total_received,
            total_dropped = snapshot.total_dropped,
            records_produced = snapshot.records_produced,
            "final ingress metrics"
        );
        self.metrics.unregister();
    }
}
