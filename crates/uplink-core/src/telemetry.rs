use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::protocol::{Envelope, MessageKind};

/// Marker the agent writes into log traffic to announce the installed
/// server description ("METADATA: Paper 1.20.4" and similar).
pub const METADATA_MARKER: &str = "METADATA:";

/// Auxiliary operational state carried alongside the metric stream:
/// game-server process status, install metadata, configured memory, public
/// address, and the server.properties map. Folded in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentTelemetry {
    pub server_status: Option<String>,
    pub metadata: Option<String>,
    pub ram_mb: Option<u64>,
    pub server_ip: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl AgentTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one envelope in. Returns true when any field changed.
    pub fn observe(&mut self, env: &Envelope) -> bool {
        let before = self.clone();
        match env.kind() {
            MessageKind::Heartbeat => self.observe_heartbeat(env),
            MessageKind::Properties => self.observe_properties(env),
            MessageKind::Log => {
                if let Some(rest) = env.log_line().and_then(|l| l.strip_prefix(METADATA_MARKER)) {
                    self.metadata = Some(rest.trim().to_string());
                }
            },
            MessageKind::Raw => {
                // Unparsed frames can still carry the metadata notice.
                if let Some(text) = env.raw.as_deref()
                    && let Some(idx) = text.find(METADATA_MARKER)
                {
                    let rest = &text[idx + METADATA_MARKER.len()..];
                    self.metadata = Some(rest.trim().to_string());
                }
            },
            _ => {},
        }
        *self != before
    }

    /// Whether the agent has a concrete server installed: metadata is
    /// present and contains neither an "Unknown" placeholder nor a "?".
    pub fn is_installed(&self) -> bool {
        self.metadata
            .as_deref()
            .is_some_and(|m| !m.is_empty() && !m.contains("Unknown") && !m.contains('?'))
    }

    fn observe_heartbeat(&mut self, env: &Envelope) {
        let Some(fields) = env.payload_fields() else {
            return;
        };
        if let Some(status) = non_empty_str(fields.get("server_status")) {
            self.server_status = Some(status.to_string());
        }
        if let Some(metadata) = non_empty_str(fields.get("metadata")) {
            self.metadata = Some(metadata.to_string());
        }
        if let Some(ram_mb) = fields.get("config").and_then(|c| c.get("ram_mb")) {
            // Agents report this as a number or a numeric string.
            let parsed = ram_mb
                .as_u64()
                .or_else(|| ram_mb.as_str().and_then(|s| s.parse().ok()));
            if let Some(mb) = parsed {
                self.ram_mb = Some(mb);
            }
        }
        if let Some(ip) = non_empty_str(fields.get("server_ip")) {
            self.server_ip = Some(ip.to_string());
        }
    }

    fn observe_properties(&mut self, env: &Envelope) {
        let Some(map) = env.payload.as_ref().and_then(Value::as_object) else {
            return;
        };
        self.properties = map
            .iter()
            .map(|(k, v)| {
                let value = match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;

    #[test]
    fn heartbeat_extras_update_fields() {
        let mut telemetry = AgentTelemetry::new();
        let env = decode_frame(
            r#"{"type":"HEARTBEAT","payload":{"cpu_usage":3.0,"server_status":"ONLINE","metadata":"Paper 1.20.4","config":{"ram_mb":2048},"server_ip":"203.0.113.9"}}"#,
        );
        assert!(telemetry.observe(&env));
        assert_eq!(telemetry.server_status.as_deref(), Some("ONLINE"));
        assert_eq!(telemetry.metadata.as_deref(), Some("Paper 1.20.4"));
        assert_eq!(telemetry.ram_mb, Some(2048));
        assert_eq!(telemetry.server_ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn heartbeat_without_extras_keeps_previous_values() {
        let mut telemetry = AgentTelemetry::new();
        telemetry.observe(&decode_frame(
            r#"{"type":"HEARTBEAT","payload":{"server_status":"ONLINE"}}"#,
        ));
        let changed = telemetry.observe(&decode_frame(
            r#"{"type":"HEARTBEAT","payload":{"cpu_usage":9.5}}"#,
        ));
        assert!(!changed);
        assert_eq!(telemetry.server_status.as_deref(), Some("ONLINE"));
    }

    #[test]
    fn ram_mb_accepts_numeric_strings() {
        let mut telemetry = AgentTelemetry::new();
        telemetry.observe(&decode_frame(
            r#"{"type":"HEARTBEAT","payload":{"config":{"ram_mb":"4096"}}}"#,
        ));
        assert_eq!(telemetry.ram_mb, Some(4096));
    }

    #[test]
    fn properties_replace_the_whole_map() {
        let mut telemetry = AgentTelemetry::new();
        telemetry.observe(&decode_frame(
            r#"{"type":"PROPERTIES","payload":{"gamemode":"survival","max-players":"20"}}"#,
        ));
        assert_eq!(
            telemetry.properties.get("gamemode").map(String::as_str),
            Some("survival")
        );

        telemetry.observe(&decode_frame(
            r#"{"type":"PROPERTIES","payload":{"difficulty":"hard"}}"#,
        ));
        assert!(telemetry.properties.get("gamemode").is_none());
        assert_eq!(
            telemetry.properties.get("difficulty").map(String::as_str),
            Some("hard")
        );
    }

    #[test]
    fn log_metadata_prefix_updates_metadata() {
        let mut telemetry = AgentTelemetry::new();
        let env = decode_frame(r#"{"type":"LOG","payload":{"line":"METADATA: Vanilla 1.21"}}"#);
        assert!(telemetry.observe(&env));
        assert_eq!(telemetry.metadata.as_deref(), Some("Vanilla 1.21"));
    }

    #[test]
    fn log_marker_must_be_a_prefix() {
        let mut telemetry = AgentTelemetry::new();
        let env =
            decode_frame(r#"{"type":"LOG","payload":{"line":"note: METADATA: Vanilla 1.21"}}"#);
        assert!(!telemetry.observe(&env));
        assert!(telemetry.metadata.is_none());
    }

    #[test]
    fn raw_marker_matches_anywhere() {
        let mut telemetry = AgentTelemetry::new();
        let env = decode_frame("garbage METADATA: Paper 1.20.4 trailing");
        assert_eq!(env.kind(), MessageKind::Raw);
        assert!(telemetry.observe(&env));
        assert_eq!(telemetry.metadata.as_deref(), Some("Paper 1.20.4 trailing"));
    }

    #[test]
    fn is_installed_rejects_placeholders() {
        let mut telemetry = AgentTelemetry::new();
        assert!(!telemetry.is_installed());

        telemetry.metadata = Some("Unknown version".to_string());
        assert!(!telemetry.is_installed());

        telemetry.metadata = Some("Paper ?".to_string());
        assert!(!telemetry.is_installed());

        telemetry.metadata = Some(String::new());
        assert!(!telemetry.is_installed());

        telemetry.metadata = Some("Paper 1.20.4".to_string());
        assert!(telemetry.is_installed());
    }
}
