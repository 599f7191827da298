//! Relay Telemetry
//!
//! In-process counters and histograms for connections, messages, sessions
//! and bandwidth, exported in Prometheus text format on `/metrics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Upper bounds (seconds) for message processing latency.
const PROCESSING_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Upper bounds for broadcast fan-out size.
const RECIPIENT_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0];

/// Cumulative histogram.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// `(upper_bound, cumulative_count)` pairs.
    pub buckets: Vec<(f64, u64)>,
}

impl Histogram {
    fn with_bounds(bounds: &[f64]) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            buckets: bounds.iter().map(|&b| (b, 0)).collect(),
        }
    }

    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        for (bound, count) in self.buckets.iter_mut() {
            if value <= *bound {
                *count += 1;
            }
        }
    }

    fn write_prometheus(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (bound, count) in &self.buckets {
            out.push_str(&format!(
                "{}_bucket{{{}{}le=\"{}\"}} {}\n",
                name, labels, sep, bound, count
            ));
        }
        out.push_str(&format!(
            "{}_bucket{{{}{}le=\"+Inf\"}} {}\n",
            name, labels, sep, self.count
        ));
        let suffix = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels)
        };
        out.push_str(&format!("{}_sum{} {}\n", name, suffix, self.sum));
        out.push_str(&format!("{}_count{} {}\n", name, suffix, self.count));
    }
}

/// Telemetry shared by every connection task.
#[derive(Debug)]
pub struct Telemetry {
    active_connections: AtomicI64,
    total_connections: AtomicU64,
    connection_errors: AtomicU64,
    total_sessions: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: RwLock<BTreeMap<&'static str, u64>>,
    messages_sent: RwLock<BTreeMap<&'static str, u64>>,
    send_errors: RwLock<BTreeMap<&'static str, u64>>,
    processing: RwLock<BTreeMap<&'static str, Histogram>>,
    broadcast_recipients: RwLock<Histogram>,
    start_time: Instant,
}

impl Telemetry {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            active_connections: AtomicI64::new(0),
            total_connections: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            total_sessions: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: RwLock::new(BTreeMap::new()),
            messages_sent: RwLock::new(BTreeMap::new()),
            send_errors: RwLock::new(BTreeMap::new()),
            processing: RwLock::new(BTreeMap::new()),
            broadcast_recipients: RwLock::new(Histogram::with_bounds(RECIPIENT_BUCKETS)),
            start_time: Instant::now(),
        }
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// A WebSocket handshake completed.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection task finished.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// A handshake or read failed unexpectedly.
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was created.
    pub fn session_created(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame of `kind` was read.
    pub async fn message_received(&self, kind: &'static str, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.messages_received.write().await.entry(kind).or_insert(0) += 1;
    }

    /// An outbound frame of `kind` was written.
    pub async fn message_sent(&self, kind: &'static str, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.messages_sent.write().await.entry(kind).or_insert(0) += 1;
    }

    /// An outbound frame of `kind` could not be written.
    pub async fn send_failed(&self, kind: &'static str) {
        *self.send_errors.write().await.entry(kind).or_insert(0) += 1;
    }

    /// Time spent dispatching one inbound frame of `kind`.
    pub async fn record_processing(&self, kind: &'static str, elapsed: Duration) {
        self.processing
            .write()
            .await
            .entry(kind)
            .or_insert_with(|| Histogram::with_bounds(PROCESSING_BUCKETS))
            .record(elapsed.as_secs_f64());
    }

    /// Number of recipients of one broadcast.
    pub async fn record_broadcast(&self, recipients: usize) {
        self.broadcast_recipients.write().await.record(recipients as f64);
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Connections currently open.
    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Connections accepted since start.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Bytes written to clients since start.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Frames of `kind` written since start.
    pub async fn sent_count(&self, kind: &str) -> u64 {
        self.messages_sent.read().await.get(kind).copied().unwrap_or(0)
    }

    /// Frames of `kind` read since start.
    pub async fn received_count(&self, kind: &str) -> u64 {
        self.messages_received.read().await.get(kind).copied().unwrap_or(0)
    }

    /// Failed writes of `kind` since start.
    pub async fn send_error_count(&self, kind: &str) -> u64 {
        self.send_errors.read().await.get(kind).copied().unwrap_or(0)
    }

    /// Render everything in Prometheus text format.
    ///
    /// `players` and `sessions` are the live gauges owned by the registry.
    pub async fn export_prometheus(&self, players: usize, sessions: usize) -> String {
        let mut out = String::new();

        let gauge = |out: &mut String, name: &str, help: &str, value: String| {
            out.push_str(&format!("# HELP {} {}\n# TYPE {} gauge\n{} {}\n", name, help, name, name, value));
        };
        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP {} {}\n# TYPE {} counter\n{} {}\n", name, help, name, name, value));
        };

        gauge(&mut out, "relay_uptime_seconds", "Seconds since start", self.start_time.elapsed().as_secs().to_string());
        gauge(&mut out, "relay_active_connections", "Open WebSocket connections", self.active_connections().to_string());
        counter(&mut out, "relay_connections_total", "Accepted WebSocket connections", self.total_connections());
        counter(&mut out, "relay_connection_errors_total", "Failed handshakes and reads", self.connection_errors.load(Ordering::Relaxed));
        gauge(&mut out, "relay_players", "Connected players", players.to_string());
        gauge(&mut out, "relay_active_sessions", "Live sessions", sessions.to_string());
        counter(&mut out, "relay_sessions_total", "Sessions created", self.total_sessions.load(Ordering::Relaxed));
        counter(&mut out, "relay_bytes_received_total", "Inbound payload bytes", self.bytes_received.load(Ordering::Relaxed));
        counter(&mut out, "relay_bytes_sent_total", "Outbound payload bytes", self.bytes_sent());

        for (name, help, map) in [
            ("relay_messages_received_total", "Inbound frames by type", &self.messages_received),
            ("relay_messages_sent_total", "Outbound frames by type", &self.messages_sent),
            ("relay_send_errors_total", "Failed writes by type", &self.send_errors),
        ] {
            out.push_str(&format!("# HELP {} {}\n# TYPE {} counter\n", name, help, name));
            for (kind, value) in map.read().await.iter() {
                out.push_str(&format!("{}{{type=\"{}\"}} {}\n", name, kind, value));
            }
        }

        out.push_str("# HELP relay_processing_seconds Dispatch latency by type\n");
        out.push_str("# TYPE relay_processing_seconds histogram\n");
        for (kind, histogram) in self.processing.read().await.iter() {
            histogram.write_prometheus(&mut out, "relay_processing_seconds", &format!("type=\"{}\"", kind));
        }

        out.push_str("# HELP relay_broadcast_recipients Recipients per broadcast\n");
        out.push_str("# TYPE relay_broadcast_recipients histogram\n");
        self.broadcast_recipients
            .read()
            .await
            .write_prometheus(&mut out, "relay_broadcast_recipients", "");

        out
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
