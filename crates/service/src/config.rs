use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::operation::{Defaults, Html, Route};
use common::prelude::{MemoryNodeStore, Node, Role, Secret};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// address for the HTTP server to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// scheme used in hop URLs between nodes
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// path storage nodes receive bounces on
    #[serde(default = "default_bounce_path")]
    pub bounce_path: String,
    /// number of storage hops when the caller does not ask for a count
    #[serde(default = "default_node_count")]
    pub node_count: u8,
    /// how long sealed results stay decodable, in seconds
    #[serde(default = "default_max_results_age_secs")]
    pub max_results_age_secs: i64,

    // ui defaults
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_message_color")]
    pub message_color: String,
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_progress_color")]
    pub progress_color: String,

    /// keys callers must present in `accessKey`; empty means open access
    #[serde(default)]
    pub access_keys: Vec<String>,

    /// nodes served by this process
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleConfig {
    Access,
    Storage,
}

impl From<RoleConfig> for Role {
    fn from(role: RoleConfig) -> Self {
        match role {
            RoleConfig::Access => Role::Access,
            RoleConfig::Storage => Role::Storage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: String,
    pub domain: String,
    pub role: RoleConfig,
    /// when the node joined; defaults to load time
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
    /// base64url key for the fixed-nonce scrambler
    pub scrambler: String,
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    /// base64url encoded 32 byte key
    pub key: String,
    pub created: DateTime<Utc>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 8080)
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_bounce_path() -> String {
    "/swift/bounce".to_string()
}

fn default_node_count() -> u8 {
    10
}

fn default_max_results_age_secs() -> i64 {
    60
}

fn default_title() -> String {
    "Swift".to_string()
}

fn default_message() -> String {
    "Bouncing to update your preferences".to_string()
}

fn default_message_color() -> String {
    "darkslategray".to_string()
}

fn default_background_color() -> String {
    "white".to_string()
}

fn default_progress_color() -> String {
    "darkgreen".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            scheme: default_scheme(),
            bounce_path: default_bounce_path(),
            node_count: default_node_count(),
            max_results_age_secs: default_max_results_age_secs(),
            title: default_title(),
            message: default_message(),
            message_color: default_message_color(),
            background_color: default_background_color(),
            progress_color: default_progress_color(),
            access_keys: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.bounce_path.starts_with('/') {
            return Err(ConfigError::InvalidBouncePath(self.bounce_path.clone()));
        }
        if self.node_count == 0 || self.node_count == u8::MAX {
            return Err(ConfigError::InvalidNodeCount(self.node_count));
        }
        Ok(())
    }

    /// Defaults applied to create requests that omit parameters
    pub fn defaults(&self) -> Defaults {
        Defaults {
            node_count: self.node_count,
            html: Html {
                title: self.title.clone(),
                message: self.message.clone(),
                message_color: self.message_color.clone(),
                background_color: self.background_color.clone(),
                progress_color: self.progress_color.clone(),
            },
            route: Route {
                scheme: self.scheme.clone(),
                path: self.bounce_path.clone(),
            },
        }
    }

    pub fn max_results_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_results_age_secs)
    }

    /// Build the node directory described by `nodes`
    pub fn build_store(&self) -> Result<MemoryNodeStore, ConfigError> {
        let store = MemoryNodeStore::new();
        let now = Utc::now();
        for entry in &self.nodes {
            let created = entry.created.unwrap_or(now);
            let scrambler = Secret::from_key(&entry.scrambler, created)
                .map_err(|e| ConfigError::InvalidNode(entry.domain.clone(), e.to_string()))?;
            let node = Node::new(
                entry.network.clone(),
                entry.domain.clone(),
                created,
                entry.expires,
                entry.role.into(),
                scrambler,
            )
            .map_err(|e| ConfigError::InvalidNode(entry.domain.clone(), e.to_string()))?;
            for secret in &entry.secrets {
                let secret = Secret::from_key(&secret.key, secret.created)
                    .map_err(|e| ConfigError::InvalidNode(entry.domain.clone(), e.to_string()))?;
                node.add_secret(secret);
            }
            if !node.is_active_at(now) {
                tracing::warn!(domain = %entry.domain, "node is not active");
            }
            store
                .set_node(node)
                .map_err(|e| ConfigError::InvalidNode(entry.domain.clone(), e.to_string()))?;
            tracing::info!(
                domain = %entry.domain,
                network = %entry.network,
                role = ?entry.role,
                "loaded node"
            );
        }
        Ok(store)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("bounce path '{0}' must start with '/'")]
    InvalidBouncePath(String),
    #[error("node count {0} must be between 1 and 254")]
    InvalidNodeCount(u8),
    #[error("invalid node '{0}': {1}")]
    InvalidNode(String, String),
}
