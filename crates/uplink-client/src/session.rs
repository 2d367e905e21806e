use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::tungstenite::Message;

use uplink_core::event_log::EventLog;
use uplink_core::install::{InstallPhase, InstallTracker};
use uplink_core::metrics::{MetricSample, MetricsWindow};
use uplink_core::protocol::{Envelope, MessageKind, decode_frame, encode_command};
use uplink_core::status::{AgentLifecycleState, StatusReconciler, TransportState};
use uplink_core::telemetry::AgentTelemetry;

use crate::commands::CommandDispatcher;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{self, WsStream};

/// Everything the session tracks for one agent. Owned by the session's
/// I/O task; handles read it through the shared lock.
#[derive(Debug)]
pub struct AgentState {
    pub reconciler: StatusReconciler,
    pub event_log: EventLog,
    pub metrics: MetricsWindow,
    pub install: InstallTracker,
    pub telemetry: AgentTelemetry,
}

impl AgentState {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            reconciler: StatusReconciler::new(),
            event_log: EventLog::with_capacity(config.buffers.event_log_capacity),
            metrics: MetricsWindow::new(config.buffers.metrics_window),
            install: InstallTracker::new(),
            telemetry: AgentTelemetry::new(),
        }
    }
}

pub type SharedAgentState = Arc<RwLock<AgentState>>;

/// Fan-out notifications emitted by a session as traffic is folded in.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An envelope that was appended to the event log.
    Envelope(Envelope),
    Transport(TransportState),
    AgentStatus(AgentLifecycleState),
    Metric(MetricSample),
    InstallPhase(InstallPhase),
    /// A successful install finished its post-success delay; callers
    /// showing an install view should switch to the console.
    ConsoleRedirect,
    /// The session's I/O task has exited. Terminal.
    Closed,
}

/// One live channel to one agent.
///
/// Opening connects the relayed WebSocket and spawns an I/O task that owns
/// the socket. The handle is the sole owner of the task: dropping it (or
/// calling [`AgentSession::close`]) shuts the channel down on every path.
pub struct AgentSession {
    agent_id: String,
    state: SharedAgentState,
    events: broadcast::Sender<SessionEvent>,
    outbound: mpsc::Sender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AgentSession {
    /// Connect to the agent's channel and start the session.
    pub async fn open(config: &ClientConfig, agent_id: &str) -> Result<Self, ClientError> {
        let url = transport::agent_channel_url(&config.api_base, &config.ws_path, agent_id)?;
        let ws_stream = transport::connect(&url).await?;
        tracing::info!(agent_id, url = %url, "Channel opened");

        let mut state = AgentState::new(config);
        state.reconciler.transport_opened();
        let state = Arc::new(RwLock::new(state));

        let (events, _) = broadcast::channel(config.buffers.broadcast_capacity);
        let (out_tx, out_rx) = mpsc::channel(config.buffers.outbound_queue);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let ctx = IoContext {
            agent_id: agent_id.to_string(),
            state: Arc::clone(&state),
            events: events.clone(),
            retain_heartbeats: config.buffers.retain_heartbeats,
            redirect_delay: Duration::from_millis(config.install.redirect_delay_ms),
        };
        let task = tokio::spawn(session_io_loop(ws_stream, out_rx, shutdown_rx, ctx));

        Ok(Self {
            agent_id: agent_id.to_string(),
            state,
            events,
            outbound: out_tx,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Shared view of the session's buffers and status.
    pub fn state(&self) -> SharedAgentState {
        Arc::clone(&self.state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event feed as a `Stream`, for `select!`-style consumers.
    pub fn event_stream(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(
            self.agent_id.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
            self.outbound.clone(),
        )
    }

    /// Arm the install tracker for a request issued outside
    /// [`CommandDispatcher::install`], e.g. a raw console command.
    pub async fn mark_install_requested(&self) {
        {
            let mut state = self.state.write().await;
            state.install.request();
        }
        let _ = self
            .events
            .send(SessionEvent::InstallPhase(InstallPhase::Requested));
    }

    /// Whether the I/O task is still running.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Close the channel and wait for the I/O task to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!(agent_id = %self.agent_id, error = %e, "Session task ended abnormally");
        }
    }
}

struct IoContext {
    agent_id: String,
    state: SharedAgentState,
    events: broadcast::Sender<SessionEvent>,
    retain_heartbeats: bool,
    redirect_delay: Duration,
}

/// Single consumer loop per agent: owns the socket, folds inbound frames
/// into the shared state in strict arrival order, drains the outbound
/// queue, and fires the post-install redirect. Exiting the loop on any
/// path resets the status axes and emits `Closed`.
async fn session_io_loop(
    ws_stream: WsStream,
    mut out_rx: mpsc::Receiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    ctx: IoContext,
) {
    let (mut sink, mut reader) = ws_stream.split();
    let mut redirect_at: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&ctx, text.as_str()).await {
                            // Install succeeded: start the server and give the
                            // operator a moment to read the success line.
                            match encode_command("start") {
                                Ok(frame) => {
                                    if sink.send(Message::Text(frame.into())).await.is_err() {
                                        tracing::warn!(agent_id = %ctx.agent_id, "Channel send failed");
                                        break;
                                    }
                                    redirect_at = Some(Instant::now() + ctx.redirect_delay);
                                },
                                Err(e) => {
                                    tracing::error!(agent_id = %ctx.agent_id, error = %e, "Failed to encode start command");
                                },
                            }
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(agent_id = %ctx.agent_id, "Channel closed by relay");
                        break;
                    },
                    Some(Err(e)) => {
                        tracing::warn!(agent_id = %ctx.agent_id, error = %e, "Channel error");
                        break;
                    },
                    _ => {}, // Binary/Ping/Pong — ignore
                }
            },
            cmd = out_rx.recv() => {
                match cmd {
                    Some(frame) => {
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            tracing::warn!(agent_id = %ctx.agent_id, "Channel send failed");
                            break;
                        }
                    },
                    None => {
                        // Session handle and all dispatchers dropped.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    },
                }
            },
            _ = &mut shutdown_rx => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            },
            _ = sleep_until_redirect(redirect_at), if redirect_at.is_some() => {
                redirect_at = None;
                let _ = ctx.events.send(SessionEvent::ConsoleRedirect);
            },
        }
    }

    {
        let mut state = ctx.state.write().await;
        state.reconciler.transport_closed();
    }
    let _ = ctx
        .events
        .send(SessionEvent::Transport(TransportState::Disconnected));
    let _ = ctx.events.send(SessionEvent::Closed);
    tracing::info!(agent_id = %ctx.agent_id, "Session closed");
}

async fn sleep_until_redirect(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Classify one inbound frame and route it. Returns true when the frame
/// completed an install, so the loop can trigger the start-and-redirect
/// side effect.
async fn handle_frame(ctx: &IoContext, text: &str) -> bool {
    let env = decode_frame(text);
    let mut state = ctx.state.write().await;
    let mut install_succeeded = false;

    match env.kind() {
        MessageKind::AgentStatus => {
            // Status reports feed the reconciler only, never the log.
            if let Some(lifecycle) = state.reconciler.observe(&env) {
                let _ = ctx.events.send(SessionEvent::AgentStatus(lifecycle));
            }
        },
        MessageKind::Heartbeat => {
            let sample = state.metrics.record(&env, now_millis());
            state.telemetry.observe(&env);
            let _ = ctx.events.send(SessionEvent::Metric(sample));
            if ctx.retain_heartbeats {
                state.event_log.append(env.clone());
                let _ = ctx.events.send(SessionEvent::Envelope(env));
            }
        },
        _ => {
            state.telemetry.observe(&env);
            if let Some(phase) = state.install.observe_batch(std::slice::from_ref(&env)) {
                install_succeeded = matches!(phase, InstallPhase::Succeeded);
                let _ = ctx.events.send(SessionEvent::InstallPhase(phase));
            }
            state.event_log.append(env.clone());
            let _ = ctx.events.send(SessionEvent::Envelope(env));
        },
    }

    install_succeeded
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
