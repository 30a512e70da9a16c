//! TOML configuration with defaults for every field.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8888
//!
//! [chat]
//! responder = "openai"
//! model = "gpt-3.5-turbo"
//!
//! [client]
//! stall_timeout_secs = 120
//!
//! [visualizations]
//! theme = "dark"
//! activities = "activities.json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::fragment::DEFAULT_MARKER;
use crate::viz::Theme;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tandarunner.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub client: ClientConfig,
    pub visualizations: VisualizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Try to open the page in a browser after binding.
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            open_browser: false,
        }
    }
}

/// Which reply source the server streams from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponderKind {
    Echo,
    Openai,
}

impl std::fmt::Display for ResponderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderKind::Echo => write!(f, "echo"),
            ResponderKind::Openai => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Root attribute marking a fragment as non-final.
    pub marker_attribute: String,
    pub responder: ResponderKind,
    pub model: String,
    pub system_prompt: Option<String>,
    /// Pause between words for the echo responder.
    pub echo_delay_ms: u64,
    pub openai_base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER.to_string(),
            responder: ResponderKind::Echo,
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: None,
            echo_delay_ms: 60,
            openai_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Give up on a turn when no fragment arrives for this long. 0 disables.
    pub stall_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 120,
        }
    }
}

impl ClientConfig {
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.stall_timeout_secs > 0).then(|| Duration::from_secs(self.stall_timeout_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub theme: Theme,
    /// JSON activity export to chart. The sample training log is used when unset.
    pub activities: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(s: &str, origin: &str) -> Result<Self> {
        toml::from_str(s).map_err(|source| ChatError::Config {
            path: origin.to_string(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Load `path` if given; otherwise `tandarunner.toml` if it exists, else
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
