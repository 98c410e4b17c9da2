//! Resolved, immutable per-panel configuration.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::preset;
use super::window::DateWindow;
use crate::config::{ConfigError, PanelConfig};
use crate::normalize::{InventoryLayout, MessageLayout};

/// User-Agent sent when neither the preset nor the config names one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K)";

const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Longest accepted `cooldown_secs` (one day).
pub const MAX_COOLDOWN_SECS: u64 = 86_400;

/// What to do when the reports page carries no token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMissingToken {
    /// Fail the login with `TokenNotFound`.
    #[default]
    Fail,
    /// Carry on with the cookies alone.
    Cookies,
}

/// How a panel hands out its session token, as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Query parameter the token is sent back in (`sesskey`, `csstr`).
    #[serde(default)]
    pub param: String,
    /// Regexes tried in order; capture group 1 is the token.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub on_missing: OnMissingToken,
    /// The session is the cookie jar alone; skip the reports page.
    #[serde(default)]
    pub cookies_only: bool,
}

/// [`TokenConfig`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub param: String,
    pub patterns: Vec<Regex>,
    pub on_missing: OnMissingToken,
    pub cookies_only: bool,
}

fn default_true() -> bool {
    true
}
fn default_sort_dir() -> String {
    "desc".to_string()
}
fn default_window() -> DateWindow {
    DateWindow::None
}

/// DataTables query for one report endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuerySpec {
    /// Endpoint path (or absolute URL).
    pub path: String,
    /// Referer path (or absolute URL).
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "default_window")]
    pub window: DateWindow,
    /// Send the session token as the policy's query parameter.
    #[serde(default = "default_true")]
    pub send_token: bool,
    pub s_echo: String,
    /// Page size; `-1` asks for every row.
    pub display_length: i64,
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
    /// Emit per-column `mDataProp_i` flags for this many columns.
    #[serde(default)]
    pub columns: Option<usize>,
    /// With `columns`, also emit the search/regex/sortable flags a browser sends.
    #[serde(default)]
    pub full_column_flags: bool,
    #[serde(default)]
    pub unsortable_columns: Vec<usize>,
    /// Fixed filter parameters (`frange`, `fclient`, `fg`, ...), sent in order.
    #[serde(default)]
    pub extra: Vec<(String, String)>,
}

impl QuerySpec {
    /// Build the ordered query string pairs.
    pub fn params(
        &self,
        bounds: Option<(String, String)>,
        token: Option<(&str, &str)>,
    ) -> Vec<(String, String)> {
        let mut p: Vec<(String, String)> = Vec::with_capacity(16);
        let mut push = |k: &str, v: &str| p.push((k.to_string(), v.to_string()));

        if let Some((from, to)) = bounds {
            push("fdate1", &from);
            push("fdate2", &to);
        }
        for (k, v) in &self.extra {
            push(k, v);
        }
        if let Some((name, value)) = token {
            push(name, value);
        }
        push("sEcho", &self.s_echo);
        if let Some(n) = self.columns {
            push("iColumns", &n.to_string());
            if self.full_column_flags {
                push("sColumns", &",".repeat(n.saturating_sub(1)));
                push("iDisplayStart", "0");
            }
        }
        push("iDisplayLength", &self.display_length.to_string());
        if let Some(n) = self.columns {
            for i in 0..n {
                let idx = i.to_string();
                push(&format!("mDataProp_{idx}"), &idx);
                if self.full_column_flags {
                    push(&format!("sSearch_{idx}"), "");
                    push(&format!("bRegex_{idx}"), "false");
                }
                push(&format!("bSearchable_{idx}"), "true");
                if self.full_column_flags {
                    let sortable = !self.unsortable_columns.contains(&i);
                    push(&format!("bSortable_{idx}"), if sortable { "true" } else { "false" });
                }
            }
            if self.full_column_flags {
                push("sSearch", "");
                push("bRegex", "false");
            }
        }
        push("iSortingCols", "1");
        if self.full_column_flags {
            push("iSortCol_0", "0");
        }
        push("sSortDir_0", &self.sort_dir);
        p
    }
}

/// Everything a preset knows about a panel deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSpec {
    pub login_path: String,
    pub signin_path: String,
    pub reports_path: Option<String>,
    pub reports_referer: Option<String>,
    pub user_agent: String,
    pub send_origin: bool,
    pub headers: Vec<(String, String)>,
    pub token: TokenConfig,
    pub sms: QuerySpec,
    pub sms_layout: MessageLayout,
    pub numbers: QuerySpec,
    pub numbers_layout: InventoryLayout,
}

/// Sign-in credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One report endpoint with its absolute URLs and row layout.
#[derive(Debug, Clone)]
pub struct ReportSpec<L> {
    pub url: String,
    pub referer: Option<String>,
    pub query: QuerySpec,
    pub layout: L,
}

/// Immutable configuration of one panel for the process lifetime.
#[derive(Debug, Clone)]
pub struct PanelProfile {
    pub id: String,
    pub base_url: String,
    pub login_url: String,
    pub signin_url: String,
    pub reports_url: Option<String>,
    pub reports_referer: Option<String>,
    pub credentials: Credentials,
    pub user_agent: String,
    pub send_origin: bool,
    pub headers: Vec<(String, String)>,
    pub token: TokenPolicy,
    pub sms: ReportSpec<MessageLayout>,
    pub numbers: ReportSpec<InventoryLayout>,
    pub cooldown: Duration,
    pub block_markers: Vec<String>,
    pub passthrough_undecodable: bool,
}

/// Resolve `path` against `base`; absolute URLs pass through.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl PanelProfile {
    /// Merge a config entry over its preset and validate the result.
    pub fn from_config(cfg: &PanelConfig) -> Result<Self, ConfigError> {
        let id = cfg.id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ConfigError::panel(
                &cfg.id,
                "id must be non-empty and use only letters, digits, '-' or '_'",
            ));
        }
        let err = |m: String| ConfigError::panel(id, m);

        let base = match cfg.preset.as_deref() {
            Some(name) => Some(preset::lookup(name).ok_or_else(|| {
                err(format!(
                    "unknown preset {name:?} (known: {})",
                    preset::NAMES.join(", ")
                ))
            })?),
            None => None,
        };

        macro_rules! pick {
            ($field:ident) => {
                match (&cfg.$field, &base) {
                    (Some(v), _) => v.clone(),
                    (None, Some(p)) => p.$field.clone(),
                    (None, None) => {
                        return Err(err(format!(
                            "{} is required when no preset is given",
                            stringify!($field)
                        )))
                    }
                }
            };
        }

        let login_path = pick!(login_path);
        let signin_path = pick!(signin_path);
        let token_cfg = pick!(token);
        let sms = pick!(sms);
        let sms_layout = pick!(sms_layout);
        let numbers = pick!(numbers);
        let numbers_layout = pick!(numbers_layout);
        let reports_path = cfg
            .reports_path
            .clone()
            .or_else(|| base.as_ref().and_then(|p| p.reports_path.clone()));
        let reports_referer = cfg
            .reports_referer
            .clone()
            .or_else(|| base.as_ref().and_then(|p| p.reports_referer.clone()));
        let user_agent = cfg
            .user_agent
            .clone()
            .or_else(|| base.as_ref().map(|p| p.user_agent.clone()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let send_origin = cfg
            .send_origin
            .or_else(|| base.as_ref().map(|p| p.send_origin))
            .unwrap_or(false);
        let headers = cfg
            .headers
            .clone()
            .or_else(|| base.as_ref().map(|p| p.headers.clone()))
            .unwrap_or_default();

        if !cfg.base_url.starts_with("http://") && !cfg.base_url.starts_with("https://") {
            return Err(err(format!("base_url {:?} must be http(s)", cfg.base_url)));
        }
        if cfg.username.is_empty() || cfg.password.is_empty() {
            return Err(err(format!(
                "credentials missing; set {0}_USERNAME and {0}_PASSWORD",
                crate::config::env_prefix(id)
            )));
        }

        let patterns = token_cfg
            .patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| err(format!("bad token pattern {p:?}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        if !token_cfg.cookies_only {
            if patterns.is_empty() {
                return Err(err("token.patterns is empty".into()));
            }
            if token_cfg.param.is_empty() {
                return Err(err("token.param is empty".into()));
            }
            if reports_path.is_none() {
                return Err(err("reports_path is required unless token.cookies_only".into()));
            }
        }

        let cooldown_secs = cfg.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS);
        if cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(err(format!(
                "cooldown_secs = {cooldown_secs} exceeds the maximum of {MAX_COOLDOWN_SECS}"
            )));
        }

        sms.window.validate().map_err(|m| err(format!("sms.window: {m}")))?;
        numbers.window.validate().map_err(|m| err(format!("numbers.window: {m}")))?;
        sms_layout.validate().map_err(|m| err(format!("sms_layout: {m}")))?;
        numbers_layout.validate().map_err(|m| err(format!("numbers_layout: {m}")))?;

        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        let abs = |p: &str| join_url(&base_url, p);

        Ok(Self {
            id: id.to_string(),
            login_url: abs(&login_path),
            signin_url: abs(&signin_path),
            reports_url: reports_path.as_deref().map(abs),
            reports_referer: reports_referer.as_deref().map(abs),
            credentials: Credentials {
                username: cfg.username.clone(),
                password: cfg.password.clone(),
            },
            user_agent,
            send_origin,
            headers,
            token: TokenPolicy {
                param: token_cfg.param,
                patterns,
                on_missing: token_cfg.on_missing,
                cookies_only: token_cfg.cookies_only,
            },
            sms: ReportSpec {
                url: abs(&sms.path),
                referer: sms.referer.as_deref().map(abs),
                query: sms,
                layout: sms_layout,
            },
            numbers: ReportSpec {
                url: abs(&numbers.path),
                referer: numbers.referer.as_deref().map(abs),
                query: numbers,
                layout: numbers_layout,
            },
            cooldown: Duration::from_secs(cooldown_secs),
            block_markers: cfg
                .block_markers
                .clone()
                .unwrap_or_else(|| vec!["Forbidden".to_string()]),
            passthrough_undecodable: cfg.passthrough_undecodable.unwrap_or(true),
            base_url,
        })
    }
}
