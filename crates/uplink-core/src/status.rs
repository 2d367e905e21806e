use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{Envelope, MessageKind};

/// Connectivity of the relayed channel between dashboard and backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    #[default]
    Disconnected,
    Connected,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// The agent's own reported readiness, decoupled from transport state:
/// the channel terminates at the backend relay, so a healthy connection
/// says nothing about the agent process behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentLifecycleState {
    #[default]
    Offline,
    Online,
}

impl AgentLifecycleState {
    /// Map a reported status string. Anything other than "ONLINE" is OFFLINE.
    pub fn from_report(status: &str) -> Self {
        if status == "ONLINE" {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl std::fmt::Display for AgentLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "OFFLINE"),
            Self::Online => write!(f, "ONLINE"),
        }
    }
}

/// Tracks both availability axes for one agent and derives the composite
/// usability signal that gates command dispatch.
///
/// The two axes are deliberately never collapsed into one field: callers
/// display and reason about them separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReconciler {
    transport: TransportState,
    lifecycle: AgentLifecycleState,
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Socket opened. The agent stays OFFLINE until it reports in.
    pub fn transport_opened(&mut self) {
        self.transport = TransportState::Connected;
    }

    /// Socket closed or errored. A disconnected transport cannot carry a
    /// trustworthy agent status, so the lifecycle axis is forced OFFLINE.
    pub fn transport_closed(&mut self) {
        self.transport = TransportState::Disconnected;
        self.lifecycle = AgentLifecycleState::Offline;
    }

    pub fn agent_reported(&mut self, state: AgentLifecycleState) {
        self.lifecycle = state;
    }

    /// Fold an AGENT_STATUS envelope in. Returns the new lifecycle state,
    /// or None when the envelope is not an AGENT_STATUS frame.
    ///
    /// The status string sits at the frame's top level on current agents
    /// and inside `payload` on older ones; top level wins.
    pub fn observe(&mut self, env: &Envelope) -> Option<AgentLifecycleState> {
        if env.kind() != MessageKind::AgentStatus {
            return None;
        }
        let reported = env
            .extra
            .get("status")
            .or_else(|| env.payload.as_ref()?.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("OFFLINE");
        self.lifecycle = AgentLifecycleState::from_report(reported);
        Some(self.lifecycle)
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn lifecycle(&self) -> AgentLifecycleState {
        self.lifecycle
    }

    /// Commands may only be dispatched when both axes are up.
    pub fn is_usable(&self) -> bool {
        self.transport == TransportState::Connected
            && self.lifecycle == AgentLifecycleState::Online
    }
}
