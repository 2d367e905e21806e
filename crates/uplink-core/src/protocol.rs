use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel message discriminator. Tags are the wire contract with the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    // Agent -> dashboard
    AgentStatus,
    Heartbeat,
    Log,
    Properties,
    /// Synthetic fallback for frames that could not be parsed.
    Raw,

    // Dashboard -> agent
    Command,

    /// Tags this build does not recognize. Preserved so newer agents can
    /// emit new kinds without the dashboard losing traffic.
    Other(String),
}

impl MessageKind {
    /// Map a wire tag to its kind. Unknown tags are preserved verbatim.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "AGENT_STATUS" => Self::AgentStatus,
            "HEARTBEAT" => Self::Heartbeat,
            "LOG" => Self::Log,
            "PROPERTIES" => Self::Properties,
            "RAW" => Self::Raw,
            "COMMAND" => Self::Command,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire tag for this kind.
    pub fn tag(&self) -> &str {
        match self {
            Self::AgentStatus => "AGENT_STATUS",
            Self::Heartbeat => "HEARTBEAT",
            Self::Log => "LOG",
            Self::Properties => "PROPERTIES",
            Self::Raw => "RAW",
            Self::Command => "COMMAND",
            Self::Other(tag) => tag,
        }
    }
}

/// One unit of channel traffic, inbound or outbound.
///
/// Inbound frames always become exactly one Envelope: a typed one when the
/// frame parses, or a `RAW` fallback carrying the original text when it
/// does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Top-level fields outside the envelope shape (e.g. `status` on
    /// AGENT_STATUS frames) are preserved here verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_tag(&self.tag)
    }

    /// Synthetic RAW envelope preserving an unparseable frame.
    pub fn raw_fallback(text: &str) -> Self {
        Self {
            tag: MessageKind::Raw.tag().to_string(),
            payload: None,
            raw: Some(text.to_string()),
            extra: serde_json::Map::new(),
        }
    }

    /// Outbound command envelope: `{"type":"COMMAND","payload":{"command":…}}`.
    pub fn command(command: &str) -> Self {
        Self {
            tag: MessageKind::Command.tag().to_string(),
            payload: Some(serde_json::json!({ "command": command })),
            raw: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The `payload.line` of a LOG envelope, if present.
    pub fn log_line(&self) -> Option<&str> {
        self.payload.as_ref()?.get("line")?.as_str()
    }

    /// The object a data-bearing frame's fields are read from: the payload
    /// when the frame carries one, the frame's own top level otherwise.
    /// Older agents put heartbeat fields at the top level.
    pub fn payload_fields(&self) -> Option<&serde_json::Map<String, Value>> {
        match &self.payload {
            Some(payload) => payload.as_object(),
            None => Some(&self.extra),
        }
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    Encode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "Encode error: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Decode one inbound text frame.
///
/// Total: frames that fail to parse are preserved as RAW envelopes rather
/// than dropped, so malformed traffic stays visible for debugging.
pub fn decode_frame(text: &str) -> Envelope {
    match serde_json::from_str::<Envelope>(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable frame preserved as RAW");
            Envelope::raw_fallback(text)
        },
    }
}

/// Encode an envelope as a text frame.
pub fn encode_envelope(env: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(env).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encode an outbound COMMAND frame.
pub fn encode_command(command: &str) -> Result<String, ProtocolError> {
    encode_envelope(&Envelope::command(command))
}
