//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `PANELBRIDGE_LISTEN`, `PANELBRIDGE_API_KEY`,
//!    and per panel `PANELBRIDGE_<ID>_USERNAME` / `PANELBRIDGE_<ID>_PASSWORD`
//!    (id upper-cased, `-` becomes `_`)
//! 2. **Config file** — path via `--config <path>`, or `panelbridge.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! request_timeout_secs = 60
//! connect_timeout_secs = 10
//!
//! [auth]
//! api_key = "your-secret-key"   # omit to leave the data routes open
//!
//! [logging]
//! level = "info"
//!
//! [[panels]]
//! id = "d-group"
//! preset = "dgroup"
//! base_url = "http://panel.example.com"
//! # username / password usually come from the environment
//!
//! [[panels]]
//! id = "custom"
//! base_url = "http://other.example.com"
//! preset = "mait"
//! cooldown_secs = 120
//! [panels.sms]
//! path = "/ints/agent/res/data_smscdr.php"
//! window = "today"
//! s_echo = "1"
//! display_length = 100
//! sort_dir = "desc"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::normalize::{InventoryLayout, MessageLayout};
use crate::panel::profile::{QuerySpec, TokenConfig};

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// One entry per external panel; each gets its own long-lived session.
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

/// HTTP server and outbound request settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Hard bound on every outbound panel request, in seconds (default 60).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bound on TCP/TLS connection setup, in seconds (default 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Authentication for the bridge's own data routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared key. Override with `PANELBRIDGE_API_KEY`. When unset, the
    /// data routes are unauthenticated and a warning is logged at startup.
    pub api_key: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One external panel.
///
/// `preset` fills in everything except `id`, `base_url` and the credentials;
/// any section given here replaces the preset's section wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelConfig {
    /// Route segment and log label, e.g. `d-group`.
    pub id: String,
    /// Scheme and host, e.g. `http://203.0.113.7`.
    pub base_url: String,
    /// Name of a built-in preset (see `panelbridge presets`).
    pub preset: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub login_path: Option<String>,
    pub signin_path: Option<String>,
    /// Page that embeds the session token once signed in.
    pub reports_path: Option<String>,
    pub reports_referer: Option<String>,
    pub user_agent: Option<String>,
    /// Send `Origin: <base_url>` on sign-in and queries.
    pub send_origin: Option<bool>,
    /// Extra headers sent on every request, as `[name, value]` pairs.
    pub headers: Option<Vec<(String, String)>>,
    pub token: Option<TokenConfig>,
    pub sms: Option<QuerySpec>,
    pub sms_layout: Option<MessageLayout>,
    pub numbers: Option<QuerySpec>,
    pub numbers_layout: Option<InventoryLayout>,
    /// Seconds to stay away after the panel blocks us (default 60).
    pub cooldown_secs: Option<u64>,
    /// Login-page substrings that mean "blocked" (default `["Forbidden"]`).
    pub block_markers: Option<Vec<String>>,
    /// Return undecodable query bodies verbatim instead of failing (default true).
    pub passthrough_undecodable: Option<bool>,
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Read { path: String, source: std::io::Error },
    /// The config file is not valid TOML for [`Config`].
    Parse { path: String, message: String },
    /// A panel entry is incomplete or inconsistent.
    Panel { id: String, message: String },
    /// Two panel entries share an id.
    DuplicatePanel(String),
    /// The HTTP client for a panel could not be built.
    Transport(String),
}

impl ConfigError {
    pub(crate) fn panel(id: &str, message: impl Into<String>) -> Self {
        Self::Panel {
            id: id.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "failed to read config file {path}: {source}"),
            Self::Parse { path, message } => {
                write!(f, "failed to parse config file {path}: {message}")
            }
            Self::Panel { id, message } => write!(f, "panel {id:?}: {message}"),
            Self::DuplicatePanel(id) => write!(f, "panel id {id:?} is configured twice"),
            Self::Transport(e) => write!(f, "failed to build HTTP client: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Environment variable prefix for a panel id: `d-group` → `PANELBRIDGE_D_GROUP`.
pub fn env_prefix(panel_id: &str) -> String {
    let id: String = panel_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PANELBRIDGE_{id}")
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `panelbridge.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.or_else(|| Path::new("panelbridge.toml").exists().then_some("panelbridge.toml"));
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_string(),
                    source,
                })?;
                Self::from_toml(&content).map_err(|e| match e {
                    ConfigError::Parse { message, .. } => ConfigError::Parse {
                        path: p.to_string(),
                        message,
                    },
                    other => other,
                })?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = lookup("PANELBRIDGE_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(key) = lookup("PANELBRIDGE_API_KEY") {
            self.auth.api_key = Some(key);
        }
        for panel in &mut self.panels {
            let prefix = env_prefix(&panel.id);
            if let Some(user) = lookup(&format!("{prefix}_USERNAME")) {
                panel.username = user;
            }
            if let Some(pass) = lookup(&format!("{prefix}_PASSWORD")) {
                panel.password = pass;
            }
        }
    }
}
