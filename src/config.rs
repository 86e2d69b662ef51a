use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mqtt::config::SessionSettings;
use crate::protocol::templates::{TopicScheme, DEFAULT_NAMESPACE};

const CONFIG_DIR: &str = ".config/thatsapp-debugger";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_BROKER_URL: &str = "ws://broker.hivemq.com:8000/mqtt";
pub const DEFAULT_SECURE_BROKER_URL: &str = "wss://broker.hivemq.com:8884/mqtt";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub broker: BrokerConfig,
    pub session: SessionSettings,
    pub view: ViewConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Unset picks the public test broker matching `session.secure_context`
    pub url: Option<String>,
    /// Unset generates a random one per connect
    pub client_id: Option<String>,
    pub auto_connect: bool,
    /// Subscribed each time a connect succeeds
    pub subscriptions: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: None,
            client_id: None,
            auto_connect: false,
            subscriptions: vec![TopicScheme::default().wildcard()],
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    pub topic_filter: String,
    pub suppress_duplicates: bool,
    /// Echo matching arrivals as they come in
    pub follow: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            topic_filter: String::new(),
            suppress_duplicates: true,
            follow: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub namespace: String,
    pub sender_id: String,
    pub recipient_id: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            sender_id: "debugger".to_string(),
            recipient_id: "recipient".to_string(),
        }
    }
}

impl ConsoleConfig {
    pub fn broker_url(&self) -> &str {
        match &self.broker.url {
            Some(url) => url,
            None if self.session.secure_context => DEFAULT_SECURE_BROKER_URL,
            None => DEFAULT_BROKER_URL,
        }
    }

    pub fn client_id(&self) -> &str {
        self.broker.client_id.as_deref().unwrap_or_default()
    }

    /// Reads the config at `path`, writing the defaults there first if it does not exist.
    pub async fn load_or_init(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }
}

pub fn default_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
