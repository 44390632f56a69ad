use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::buffer::DEFAULT_BUFFER_CAP;
use super::session::AgentType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub terminal: TerminalConfig,
    /// Per-agent executable override paths, checked before resolution.
    #[serde(default)]
    pub agent_overrides: HashMap<AgentType, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the one-JSON-file-per-session records.
    pub sessions_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Retention cap in bytes for each session's raw output buffer.
    pub buffer_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        let sessions_dir = directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("AgentsMonitor")
            .join("Sessions");

        Config {
            storage: StorageConfig { sessions_dir },
            terminal: TerminalConfig {
                buffer_cap: DEFAULT_BUFFER_CAP,
            },
            agent_overrides: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(config_dir) = directories::ProjectDirs::from("com", "agentsmonitor", "agentsmon")
        {
            let config_file = config_dir.config_dir().join("config.toml");
            if config_file.exists() {
                let content = std::fs::read_to_string(&config_file)?;
                match toml::from_str::<Config>(&content) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config {}: {}", config_file.display(), e)
                    }
                }
            }
        }
        Ok(Config::default())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(config_dir) = directories::ProjectDirs::from("com", "agentsmonitor", "agentsmon")
        {
            std::fs::create_dir_all(config_dir.config_dir())?;
            let config_file = config_dir.config_dir().join("config.toml");
            let content = toml::to_string_pretty(self)?;
            std::fs::write(config_file, content)?;
        }
        Ok(())
    }

    pub fn override_for(&self, agent_type: AgentType) -> Option<&str> {
        self.agent_overrides
            .get(&agent_type)
            .and_then(|p| p.to_str())
    }
}
