pub mod event_log;
pub mod install;
pub mod metrics;
pub mod protocol;
pub mod status;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::protocol::{Envelope, decode_frame};

    /// Text frame for an AGENT_STATUS report with a top-level status field.
    pub fn status_frame(status: &str) -> String {
        serde_json::json!({ "type": "AGENT_STATUS", "status": status }).to_string()
    }

    /// Text frame for a HEARTBEAT carrying cpu percent and ram bytes.
    pub fn heartbeat_frame(cpu_usage: f64, ram_usage: f64) -> String {
        serde_json::json!({
            "type": "HEARTBEAT",
            "payload": { "cpu_usage": cpu_usage, "ram_usage": ram_usage },
        })
        .to_string()
    }

    /// Text frame for one console LOG line.
    pub fn log_frame(line: &str) -> String {
        serde_json::json!({ "type": "LOG", "payload": { "line": line } }).to_string()
    }

    /// Text frame replacing the server.properties map.
    pub fn properties_frame(pairs: &[(&str, &str)]) -> String {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect();
        serde_json::json!({ "type": "PROPERTIES", "payload": map }).to_string()
    }

    /// Decoded AGENT_STATUS envelope.
    pub fn make_status(status: &str) -> Envelope {
        decode_frame(&status_frame(status))
    }

    /// Decoded HEARTBEAT envelope.
    pub fn make_heartbeat(cpu_usage: f64, ram_usage: f64) -> Envelope {
        decode_frame(&heartbeat_frame(cpu_usage, ram_usage))
    }

    /// Decoded LOG envelope.
    pub fn make_log(line: &str) -> Envelope {
        decode_frame(&log_frame(line))
    }

    /// Decoded RAW envelope, as produced for unparseable traffic.
    pub fn make_raw(text: &str) -> Envelope {
        Envelope::raw_fallback(text)
    }
}
