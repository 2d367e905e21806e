use std::collections::HashMap;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::AgentSession;

/// Owns the live sessions, at most one per agent.
pub struct SessionManager {
    config: ClientConfig,
    sessions: HashMap<String, AgentSession>,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Open a session to the given agent. An existing session for the same
    /// id is closed first, so exactly one connection exists per agent.
    pub async fn open(&mut self, agent_id: &str) -> Result<&AgentSession, ClientError> {
        if let Some(old) = self.sessions.remove(agent_id) {
            tracing::info!(agent_id, "Replacing existing session");
            old.close().await;
        }
        let session = AgentSession::open(&self.config, agent_id).await?;
        self.sessions.insert(agent_id.to_string(), session);
        Ok(&self.sessions[agent_id])
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentSession> {
        self.sessions.get(agent_id)
    }

    /// Close the session for the given agent. Returns false when none exists.
    pub async fn close(&mut self, agent_id: &str) -> bool {
        match self.sessions.remove(agent_id) {
            Some(session) => {
                session.close().await;
                true
            },
            None => false,
        }
    }

    pub async fn close_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
