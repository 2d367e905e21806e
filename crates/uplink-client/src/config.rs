use serde::Deserialize;

use uplink_core::event_log::DEFAULT_LOG_CAPACITY;
use uplink_core::metrics::DETAIL_WINDOW;

/// Top-level client configuration, loaded from `uplink.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL. The channel endpoint is derived from it.
    pub api_base: String,
    /// Path of the relayed channel endpoint; the agent id is appended.
    pub ws_path: String,
    pub auth: AuthConfig,
    pub buffers: BufferConfig,
    pub install: InstallConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8080".to_string(),
            ws_path: "/ws/client".to_string(),
            auth: AuthConfig::default(),
            buffers: BufferConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

/// Buffer sizes for one session (channel queues and retained history).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub event_log_capacity: usize,
    pub metrics_window: usize,
    /// Outbound command queue depth per session.
    pub outbound_queue: usize,
    /// Session event fan-out capacity per subscriber.
    pub broadcast_capacity: usize,
    /// When true, heartbeats are also appended to the event log instead of
    /// being folded into the metrics window only.
    pub retain_heartbeats: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: DEFAULT_LOG_CAPACITY,
            metrics_window: DETAIL_WINDOW,
            outbound_queue: 256,
            broadcast_capacity: 1024,
            retain_heartbeats: false,
        }
    }
}

/// Install flow configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Delay before the console redirect fires after a successful install.
    pub redirect_delay_ms: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            redirect_delay_ms: 1500,
        }
    }
}

impl ClientConfig {
    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        let scheme_ok = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|s| self.api_base.starts_with(s));
        if !scheme_ok {
            tracing::error!(url = %self.api_base, "api_base must use http, https, ws or wss");
            std::process::exit(1);
        }
        if !self.ws_path.starts_with('/') {
            tracing::error!(path = %self.ws_path, "ws_path must start with '/'");
            std::process::exit(1);
        }

        // Warn about secrets in config file (should use env vars in production)
        if self.auth.bearer_token.is_some() {
            tracing::warn!(
                "bearer_token is set in config file — use UPLINK_API_TOKEN env var in production"
            );
        }

        if self.buffers.event_log_capacity == 0 {
            tracing::error!("buffers.event_log_capacity must be > 0");
            std::process::exit(1);
        }
        if self.buffers.metrics_window == 0 {
            tracing::error!("buffers.metrics_window must be > 0");
            std::process::exit(1);
        }
        if self.buffers.outbound_queue == 0 {
            tracing::error!("buffers.outbound_queue must be > 0");
            std::process::exit(1);
        }
        if self.buffers.broadcast_capacity == 0 {
            tracing::error!("buffers.broadcast_capacity must be > 0");
            std::process::exit(1);
        }
    }

    /// Load config from `uplink.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("uplink.toml") {
            Ok(content) => match toml::from_str::<ClientConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from uplink.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse uplink.toml: {e}, using defaults");
                    ClientConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No uplink.toml found, using defaults");
                ClientConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(base) = std::env::var("UPLINK_API_BASE")
            && !base.is_empty()
        {
            config.api_base = base;
        }
        if let Ok(path) = std::env::var("UPLINK_WS_PATH")
            && !path.is_empty()
        {
            config.ws_path = path;
        }
        if let Ok(token) = std::env::var("UPLINK_API_TOKEN")
            && !token.is_empty()
        {
            config.auth.bearer_token = Some(token);
        }

        // Buffer overrides
        if let Ok(val) = std::env::var("UPLINK_EVENT_LOG_CAPACITY")
            && let Ok(n) = val.parse::<usize>()
        {
            config.buffers.event_log_capacity = n;
        }
        if let Ok(val) = std::env::var("UPLINK_METRICS_WINDOW")
            && let Ok(n) = val.parse::<usize>()
        {
            config.buffers.metrics_window = n;
        }
        if let Ok(val) = std::env::var("UPLINK_REDIRECT_DELAY_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.install.redirect_delay_ms = n;
        }

        config
    }
}
