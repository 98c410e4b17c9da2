//! The set of configured panels, one long-lived [`SessionClient`] each.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{Config, ConfigError};
use crate::panel::PanelProfile;
use crate::session::SessionClient;

/// Panel clients in config order, looked up by id.
#[derive(Default)]
pub struct PanelRegistry {
    clients: Vec<Arc<SessionClient>>,
}

impl PanelRegistry {
    /// Wrap already-built clients. Ids must be unique.
    pub fn new(clients: Vec<Arc<SessionClient>>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for client in &clients {
            if !seen.insert(client.id().to_string()) {
                return Err(ConfigError::DuplicatePanel(client.id().to_string()));
            }
        }
        Ok(Self { clients })
    }

    /// Resolve every `[[panels]]` entry and give each its own HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.server.request_timeout_secs);
        let connect_timeout = Duration::from_secs(config.server.connect_timeout_secs);
        let clients = config
            .panels
            .iter()
            .map(|entry| {
                let profile = PanelProfile::from_config(entry)?;
                info!(
                    panel = %profile.id,
                    base_url = %profile.base_url,
                    preset = entry.preset.as_deref().unwrap_or("-"),
                    "panel configured"
                );
                SessionClient::from_profile(Arc::new(profile), timeout, connect_timeout)
                    .map(Arc::new)
                    .map_err(|e| ConfigError::Transport(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(clients)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SessionClient>> {
        self.clients.iter().find(|c| c.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SessionClient>> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PANELS: &str = r#"
        [[panels]]
        id = "d-group"
        preset = "dgroup"
        base_url = "http://192.0.2.10"
        username = "u"
        password = "p"

        [[panels]]
        id = "mait"
        preset = "mait"
        base_url = "http://192.0.2.11"
        username = "u"
        password = "p"
    "#;

    #[test]
    fn test_from_config() {
        let config = Config::from_toml(TWO_PANELS).unwrap();
        let registry = PanelRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("d-group").is_some());
        assert!(registry.get("mait").is_some());
        assert!(registry.get("other").is_none());
        let ids: Vec<&str> = registry.iter().map(|c| c.id()).collect();
        assert_eq!(ids, ["d-group", "mait"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let doubled = format!("{TWO_PANELS}{}", TWO_PANELS.replace("d-group", "x"));
        let config = Config::from_toml(&doubled).unwrap();
        let err = PanelRegistry::from_config(&config).err().unwrap();
        assert!(matches!(err, ConfigError::DuplicatePanel(ref id) if id == "mait"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = Config::from_toml(&TWO_PANELS.replacen("password = \"p\"", "", 1)).unwrap();
        let err = PanelRegistry::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("PANELBRIDGE_D_GROUP_PASSWORD"));
    }

    #[test]
    fn test_empty() {
        let registry = PanelRegistry::from_config(&Config::default()).unwrap();
        assert!(registry.is_empty());
    }
}
