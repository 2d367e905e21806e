use tokio::sync::{broadcast, mpsc};

use uplink_core::install::InstallPhase;
use uplink_core::protocol::encode_command;
use uplink_core::status::TransportState;

use crate::session::{SessionEvent, SharedAgentState};

/// Fire-and-forget command sender for one session.
///
/// Dispatch is rejected while the transport is down; nothing is awaited
/// beyond queueing — the protocol has no request/response correlation, so
/// success shows up only as later status changes and log lines.
#[derive(Clone)]
pub struct CommandDispatcher {
    agent_id: String,
    state: SharedAgentState,
    events: broadcast::Sender<SessionEvent>,
    outbound: mpsc::Sender<String>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        agent_id: String,
        state: SharedAgentState,
        events: broadcast::Sender<SessionEvent>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            agent_id,
            state,
            events,
            outbound,
        }
    }

    /// Queue a console command. Returns false when the dispatch was dropped
    /// (transport down or session gone).
    pub async fn send_command(&self, command: &str) -> bool {
        let frame = match encode_command(command) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(agent_id = %self.agent_id, error = %e, "Failed to encode command");
                return false;
            },
        };
        {
            let state = self.state.read().await;
            if state.reconciler.transport() != TransportState::Connected {
                tracing::debug!(agent_id = %self.agent_id, command, "Command dropped, channel not connected");
                return false;
            }
        }
        self.outbound.send(frame).await.is_ok()
    }

    pub async fn start(&self) -> bool {
        self.send_command("start").await
    }

    pub async fn stop(&self) -> bool {
        self.send_command("stop").await
    }

    /// Request an install of the given server kind and version. Arms the
    /// install tracker so the session starts watching log traffic.
    pub async fn install(&self, kind: &str, version: &str) -> bool {
        let frame = match encode_command(&format!("install {kind} {version}")) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(agent_id = %self.agent_id, error = %e, "Failed to encode command");
                return false;
            },
        };
        {
            let mut state = self.state.write().await;
            if state.reconciler.transport() != TransportState::Connected {
                tracing::debug!(agent_id = %self.agent_id, "Install dropped, channel not connected");
                return false;
            }
            state.install.request();
        }
        let _ = self
            .events
            .send(SessionEvent::InstallPhase(InstallPhase::Requested));
        self.outbound.send(frame).await.is_ok()
    }
}
