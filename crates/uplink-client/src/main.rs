use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use uplink_client::config::ClientConfig;
use uplink_client::session::{AgentSession, SessionEvent};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(agent_id) = std::env::args().nth(1) else {
        eprintln!("Usage: uplink-client <agent-id>");
        std::process::exit(1);
    };

    let config = ClientConfig::load();
    config.validate();

    tracing::info!(agent_id = %agent_id, "Opening agent channel");

    let session = match AgentSession::open(&config, &agent_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(agent_id = %agent_id, error = %e, "Failed to open channel");
            std::process::exit(1);
        },
    };

    let dispatcher = session.dispatcher();
    let mut events = session.subscribe();
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::Envelope(env)) => {
                        if let Some(line) = env.log_line() {
                            println!("{line}");
                        } else if let Ok(text) = serde_json::to_string(&env) {
                            println!("{text}");
                        }
                    },
                    Ok(SessionEvent::Transport(state)) => {
                        tracing::info!(state = ?state, "Transport state changed");
                    },
                    Ok(SessionEvent::AgentStatus(state)) => {
                        tracing::info!(state = ?state, "Agent reported status");
                    },
                    Ok(SessionEvent::InstallPhase(phase)) => {
                        tracing::info!(phase = ?phase, "Install phase changed");
                    },
                    Ok(SessionEvent::ConsoleRedirect) => {
                        tracing::info!("Install finished, server is starting");
                    },
                    // Heartbeat samples are for dashboards, not the console.
                    Ok(SessionEvent::Metric(_)) => {},
                    Ok(SessionEvent::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let sent = if let Some(rest) = line.strip_prefix("install ") {
                            let mut parts = rest.split_whitespace();
                            match (parts.next(), parts.next()) {
                                (Some(kind), Some(version)) => {
                                    dispatcher.install(kind, version).await
                                },
                                _ => dispatcher.send_command(line).await,
                            }
                        } else {
                            dispatcher.send_command(line).await
                        };
                        if !sent {
                            tracing::warn!(command = %line, "Command not sent, channel not connected");
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    },
                }
            }
        }
    }

    session.close().await;
}
