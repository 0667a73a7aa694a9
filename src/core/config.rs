use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Executable spoken to over the run protocol: one JSON message per
    /// stdout line. Invoked per run as
    /// `<command> <args..> [--resume <token>] [--system-prompt <text>] <prompt>`.
    #[serde(default = "default_engine_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory handed to the engine process.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    17917
}
fn default_engine_command() -> String {
    "agent-engine".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
            workdir: None,
        }
    }
}

impl AppConfig {
    /// Loads `config.toml` from the data dir; a missing file means all
    /// defaults, a malformed one is an error worth failing startup over.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config in {}", path.display()))
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".feedline"))
        .unwrap_or_else(|| PathBuf::from(".feedline"))
}
