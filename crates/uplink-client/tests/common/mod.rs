use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc};

use uplink_client::config::{ClientConfig, InstallConfig};

/// In-process stand-in for the relay's client-facing channel endpoint.
///
/// Frames pushed with `push_frame` fan out to every connected session;
/// frames a session sends upstream arrive via `next_client_frame`.
pub struct TestRelay {
    pub addr: SocketAddr,
    to_clients: broadcast::Sender<String>,
    from_clients: Mutex<mpsc::UnboundedReceiver<String>>,
    kick: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
    _server: tokio::task::JoinHandle<()>,
}

#[derive(Clone)]
struct RelayState {
    to_clients: broadcast::Sender<String>,
    from_clients: mpsc::UnboundedSender<String>,
    kick: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
}

impl TestRelay {
    pub async fn new() -> Self {
        let (to_clients, _) = broadcast::channel(64);
        let (from_tx, from_rx) = mpsc::unbounded_channel();
        let (kick, _) = broadcast::channel(4);
        let connections = Arc::new(AtomicUsize::new(0));

        let state = RelayState {
            to_clients: to_clients.clone(),
            from_clients: from_tx,
            kick: kick.clone(),
            connections: Arc::clone(&connections),
        };

        let app = Router::new()
            .route("/ws/client/{agent_id}", get(channel_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the relay a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            to_clients,
            from_clients: Mutex::new(from_rx),
            kick,
            connections,
            _server: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Push a frame to every connected session.
    pub fn push_frame(&self, frame: &str) {
        self.to_clients.send(frame.to_string()).unwrap();
    }

    /// Next frame a session sent upstream, or None on timeout.
    pub async fn next_client_frame(&self, timeout_ms: u64) -> Option<String> {
        let mut rx = self.from_clients.lock().await;
        tokio::time::timeout(Duration::from_millis(timeout_ms), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drop every connected session from the relay side.
    pub fn kick_clients(&self) {
        let _ = self.kick.send(());
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn channel_handler(
    State(state): State<RelayState>,
    Path(_agent_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_channel(socket, state))
}

async fn handle_channel(socket: WebSocket, state: RelayState) {
    // Subscribe before bumping the counter so a connection counted as live
    // is guaranteed to see pushed frames.
    let mut push_rx = state.to_clients.subscribe();
    let mut kick_rx = state.kick.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = push_rx.recv() => {
                let Ok(frame) = frame else { break };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = state.from_clients.send(text.to_string());
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {},
                }
            }
            _ = kick_rx.recv() => break,
        }
    }

    state.connections.fetch_sub(1, Ordering::SeqCst);
}

/// Client config pointed at the test relay, with a short redirect delay.
pub fn test_config(relay: &TestRelay) -> ClientConfig {
    ClientConfig {
        api_base: relay.base_url(),
        install: InstallConfig {
            redirect_delay_ms: 50,
        },
        ..ClientConfig::default()
    }
}

/// Wait until the relay sees exactly `count` live connections.
pub async fn wait_for_connections(relay: &TestRelay, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.connection_count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for relay connections");
}
