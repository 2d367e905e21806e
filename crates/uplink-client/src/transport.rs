use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the channel URL for one agent from the backend base URL.
///
/// `http(s)` bases map to `ws(s)`; explicit `ws(s)` bases pass through.
pub fn agent_channel_url(
    api_base: &str,
    ws_path: &str,
    agent_id: &str,
) -> Result<String, ClientError> {
    let base = api_base.trim_end_matches('/');
    let ws_base = if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else {
        return Err(ClientError::InvalidUrl(base.to_string()));
    };
    Ok(format!("{ws_base}{ws_path}/{agent_id}"))
}

/// Open the WebSocket leg of a session.
pub async fn connect(url: &str) -> Result<WsStream, ClientError> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    Ok(stream)
}
