/// Errors surfaced by the transport session and the REST client.
#[derive(Debug)]
pub enum ClientError {
    /// The configured base URL has a scheme the channel cannot use.
    InvalidUrl(String),
    /// The WebSocket handshake failed.
    Connect(String),
    /// The HTTP request itself failed (network, TLS, decode).
    Http(reqwest::Error),
    /// The backend answered with a non-success status.
    Api { status: u16, detail: String },
    /// The session's transport task has already shut down.
    Closed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "Invalid URL scheme: {url}"),
            Self::Connect(msg) => write!(f, "WebSocket connect failed: {msg}"),
            Self::Http(e) => write!(f, "HTTP request failed: {e}"),
            Self::Api { status, detail } => write!(f, "API error {status}: {detail}"),
            Self::Closed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}
