use std::collections::BTreeMap;

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;

/// One managed agent as listed by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    /// The caller's role on this agent, when the backend reports one.
    #[serde(default)]
    pub role: Option<String>,
}

/// Response to agent creation. The id is backend-issued and is what the
/// operator enters into the agent process config.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCreated {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collaborator {
    pub id: u64,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModSearchResult {
    pub project_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Error body the backend attaches to non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Bearer-authenticated client for the backend's REST surface.
///
/// Covers everything the channel does not: account handling, agent
/// inventory, HTTP fallbacks for lifecycle commands, version metadata,
/// mods, and collaborators.
pub struct ApiClient {
    client: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("uplink-client/0.1")
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(base: &str, token: &str) -> Self {
        let mut api = Self::new(base);
        api.token = Some(token.to_string());
        api
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Exchange credentials for a bearer token and keep it for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(format!("{}/auth/token", self.base))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let token: TokenResponse = check(resp).await?.json().await?;
        self.token = Some(token.access_token);
        Ok(())
    }

    /// Create an account. The backend issues a token right away.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(format!("{}/auth/register", self.base))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = check(resp).await?.json().await?;
        self.token = Some(token.access_token);
        Ok(())
    }

    pub async fn me(&self) -> Result<CurrentUser, ClientError> {
        let resp = self.request(Method::GET, "/auth/me").send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, ClientError> {
        let resp = self.request(Method::GET, "/api/agents").send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn create_agent(&self, name: &str) -> Result<AgentCreated, ClientError> {
        let resp = self
            .request(Method::POST, "/api/agents/create")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        let resp = self
            .request(Method::DELETE, &format!("/api/agent/{agent_id}"))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn start_server(&self, agent_id: &str) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/start"))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn stop_server(&self, agent_id: &str) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/stop"))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// HTTP fallback for a console command when no channel is open.
    pub async fn send_console_command(
        &self,
        agent_id: &str,
        command: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/command"))
            .json(&serde_json::json!({ "command": command }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Ask the backend to install a server of the given kind and version on
    /// the agent. Progress arrives as log lines over the channel.
    pub async fn request_install(
        &self,
        agent_id: &str,
        kind: &str,
        version: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/install"))
            .json(&serde_json::json!({ "type": kind, "version": version }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn update_config(&self, agent_id: &str, ram_mb: u64) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/config"))
            .json(&serde_json::json!({ "ram_mb": ram_mb }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Ask the agent to publish its server.properties. The map itself comes
    /// back over the channel as a PROPERTIES envelope.
    pub async fn request_properties(&self, agent_id: &str) -> Result<(), ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/agent/{agent_id}/properties/fetch"),
            )
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Replace server.properties. The body is the bare property map.
    pub async fn update_properties(
        &self,
        agent_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/agent/{agent_id}/properties/update"),
            )
            .json(properties)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn list_collaborators(&self, agent_id: &str) -> Result<Vec<Collaborator>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/agent/{agent_id}/collaborators"))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn add_collaborator(
        &self,
        agent_id: &str,
        username: &str,
        role: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/collaborators"))
            .json(&serde_json::json!({ "username": username, "role": role }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn remove_collaborator(
        &self,
        agent_id: &str,
        collaborator_id: u64,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(
                Method::DELETE,
                &format!("/api/agent/{agent_id}/collaborators/{collaborator_id}"),
            )
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Installable versions for a server kind, newest first.
    pub async fn list_versions(&self, kind: &str) -> Result<Vec<VersionInfo>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/metadata/versions/{kind}"))
            .send()
            .await?;
        let raw: Vec<Value> = check(resp).await?.json().await?;
        Ok(normalize_versions(raw))
    }

    pub async fn search_mods(&self, query: &str) -> Result<Vec<ModSearchResult>, ClientError> {
        let resp = self
            .request(Method::GET, "/api/mods/search")
            .query(&[("query", query)])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Install a mod file on the agent from a resolved download URL.
    pub async fn install_mod(
        &self,
        agent_id: &str,
        url: &str,
        filename: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/agent/{agent_id}/mods"))
            .json(&serde_json::json!({ "url": url, "filename": filename }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = match resp.json::<ErrorBody>().await {
        Ok(body) => body.detail,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}

/// Normalize the two version-list shapes the metadata endpoint serves:
/// bare strings listed oldest-first, or objects with an `id` field listed
/// newest-first.
fn normalize_versions(raw: Vec<Value>) -> Vec<VersionInfo> {
    let all_strings = raw.iter().all(Value::is_string);
    if all_strings {
        raw.iter()
            .rev()
            .filter_map(Value::as_str)
            .map(|s| VersionInfo { id: s.to_string() })
            .collect()
    } else {
        raw.into_iter()
            .filter_map(|v| {
                v.get("id")
                    .and_then(Value::as_str)
                    .map(|s| VersionInfo { id: s.to_string() })
            })
            .collect()
    }
}
