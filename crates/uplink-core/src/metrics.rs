use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

use crate::protocol::Envelope;

/// Window size used by the dashboard list-view sparkline.
pub const DASHBOARD_WINDOW: usize = 20;

/// Window size used by the server detail charts. Default for sessions.
pub const DETAIL_WINDOW: usize = 50;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One heartbeat-derived sample. The timestamp is wall-clock at receipt,
/// never agent-supplied, so agent clock skew cannot reorder the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    pub timestamp_ms: u64,
    pub cpu_percent: f64,
    pub ram_bytes: f64,
}

impl MetricSample {
    /// Presentation helper: RAM in gigabytes (1 GB = 1024^3 bytes).
    pub fn ram_gigabytes(&self) -> f64 {
        self.ram_bytes / BYTES_PER_GB
    }
}

/// Fixed-capacity rolling window of heartbeat samples for one agent.
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DETAIL_WINDOW)
    }
}

impl MetricsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity,
        }
    }

    /// Fold a HEARTBEAT envelope into the window.
    ///
    /// Missing or non-numeric fields read as zero; heartbeat fields may sit
    /// inside `payload` or directly at the frame's top level, depending on
    /// agent version. Every heartbeat yields a sample.
    pub fn record(&mut self, env: &Envelope, timestamp_ms: u64) -> MetricSample {
        let fields = env.payload_fields();
        let sample = MetricSample {
            timestamp_ms,
            cpu_percent: numeric_field(fields, "cpu_usage"),
            ram_bytes: numeric_field(fields, "ram_usage"),
        };
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        sample
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn numeric_field(fields: Option<&serde_json::Map<String, Value>>, name: &str) -> f64 {
    fields
        .and_then(|f| f.get(name))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}
