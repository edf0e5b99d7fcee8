//! TOML-based configuration for twine nodes.

use std::path::Path;

use serde::Deserialize;

use twine_link::udp6::DEFAULT_PORT;

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub udp6: Udp6Section,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// Hex-encoded secret key. A fresh identity is generated when unset.
    pub secret_key: Option<String>,
    /// Seconds between advertisement cycles.
    #[serde(default = "default_adv_interval")]
    pub adv_interval_secs: u64,
    /// Whether to forward transit datagrams.
    #[serde(default = "default_forwarding")]
    pub forwarding: bool,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            secret_key: None,
            adv_interval_secs: default_adv_interval(),
            forwarding: default_forwarding(),
        }
    }
}

fn default_adv_interval() -> u64 {
    5
}

fn default_forwarding() -> bool {
    true
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// The `[udp6]` section: IPv6 link-local links.
#[derive(Debug, Deserialize)]
pub struct Udp6Section {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Restrict to these interface names when non-empty.
    #[serde(default)]
    pub allowed: Vec<String>,
    /// Never use these interfaces.
    #[serde(default)]
    pub ignored: Vec<String>,
}

impl Default for Udp6Section {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_port(),
            allowed: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
