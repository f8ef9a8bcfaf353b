//! `arbor.toml` configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use arbor_core::DEFAULT_SCENE_FILE;
use arbor_server::ServerConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "arbor.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArborConfig {
    pub server: ServerSection,
    pub scene: SceneSection,
    pub query: QuerySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    /// Relative paths resolve against the repository root
    pub path: PathBuf,
    /// Reload the scene when the file changes (serve only)
    pub watch: bool,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SCENE_FILE),
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    /// Artificial delay added to every hierarchy query
    pub latency_ms: u64,
}

impl ArborConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn scene_path(&self, root: &Path) -> PathBuf {
        if self.scene.path.is_absolute() {
            self.scene.path.clone()
        } else {
            root.join(&self.scene.path)
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        (self.query.latency_ms > 0).then(|| Duration::from_millis(self.query.latency_ms))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
        }
    }
}
