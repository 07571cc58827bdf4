//! Signal Queue Fabric: three independent bounded FIFOs, one per
//! [`SignalKind`], with non-blocking offer and a timed, best-effort drain.
//!
//! Many concurrent producers (receiver worker threads) and exactly one
//! consumer (the driver's poll thread) are expected; an MPSC-shaped
//! bounded channel is sufficient and cheaper than a full MPMC queue.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use otlp_ingress_common::{OTLPMessage, SignalKind};
use tracing::warn;

/// A single bounded FIFO. Offers never block; the caller observes `false`
/// and is expected to count a drop.
pub struct Queue {
    signal: SignalKind,
    sender: Sender<OTLPMessage>,
    receiver: Receiver<OTLPMessage>,
    capacity: usize,
}

impl Queue {
    fn new(signal: SignalKind, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            signal,
            sender,
            receiver,
            capacity,
        }
    }

    /// Never blocks. Returns `false` and logs a warning with the current
    /// size when the queue is full; the caller is responsible for
    /// incrementing the drop counter.
    pub fn offer(&self, msg: OTLPMessage) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    signal = self.signal.name(),
                    size = self.size(),
                    "queue full, dropping message"
                );
                false
            }
        }
    }

    /// Waits up to `timeout` for one message.
    pub fn poll(&self, timeout: Duration) -> Option<OTLPMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Atomic best-effort drain of at most `k` available messages, without
    /// blocking.
    pub fn drain_up_to(&self, k: usize) -> Vec<OTLPMessage> {
        let mut out = Vec::with_capacity(k.min(self.capacity));
        for _ in 0..k {
            match self.receiver.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    pub fn size(&self) -> usize {
        self.receiver.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.size())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The three independent per-signal queues. Saturation of one never
/// affects the others because each signal owns its own channel.
pub struct SignalQueues {
    traces: Queue,
    metrics: Queue,
    logs: Queue,
}

impl SignalQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            traces: Queue::new(SignalKind::Traces, capacity),
            metrics: Queue::new(SignalKind::Metrics, capacity),
            logs: Queue::new(SignalKind::Logs, capacity),
        }
    }

    pub fn get(&self, signal: SignalKind) -> &Queue {
        match signal {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics,
            SignalKind::Logs => &self.logs,
        }
    }
}
