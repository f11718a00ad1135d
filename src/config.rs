// ABOUTME: Bridge configuration: whitelist, agent binary, model catalog, timeouts.
// ABOUTME: Loaded from TOML with environment variable overrides for deployment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// One entry in the model picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    /// Model id passed to the backend
    pub id: String,
    /// Display name shown to the user
    pub name: String,
}

fn default_models() -> Vec<ModelChoice> {
    vec![
        ModelChoice {
            id: "claude-opus-4-6".to_string(),
            name: "Claude Opus 4.6".to_string(),
        },
        ModelChoice {
            id: DEFAULT_MODEL.to_string(),
            name: "Claude Sonnet 4.5".to_string(),
        },
        ModelChoice {
            id: "claude-haiku-4-5-20251001".to_string(),
            name: "Claude Haiku 4.5".to_string(),
        },
    ]
}

fn default_binary_path() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_send_timeout() -> u64 {
    30
}

fn default_gate_timeout() -> u64 {
    60
}

/// Who is allowed to talk to the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// User ids permitted to use the bridge; everyone else is ignored
    pub allowed_users: Vec<String>,
}

/// How the agent backend runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_models")]
    pub models: Vec<ModelChoice>,
}

/// Operation timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_send_timeout")]
    pub send_secs: u64,
    #[serde(default = "default_gate_timeout")]
    pub gate_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            send_secs: default_send_timeout(),
            gate_secs: default_gate_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send_secs)
    }

    pub fn gate(&self) -> Duration {
        Duration::from_secs(self.gate_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the file, so deployments can tweak
    /// settings without editing it
    pub fn apply_env_overrides(&mut self) {
        if let Ok(users) = std::env::var("ALLOWED_USER_IDS") {
            let users: Vec<String> = users
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !users.is_empty() {
                self.bot.allowed_users = users;
            }
        }
        if let Ok(model) = std::env::var("CLAUDE_MODEL") {
            if !model.is_empty() {
                self.agent.default_model = model;
            }
        }
        if let Ok(dir) = std::env::var("WORK_DIR") {
            if !dir.is_empty() {
                self.agent.work_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("CLAUDE_BINARY_PATH") {
            if !path.is_empty() {
                self.agent.binary_path = path;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.allowed_users.is_empty() {
            anyhow::bail!("Config error: bot.allowed_users must not be empty");
        }
        if self.agent.binary_path.trim().is_empty() {
            anyhow::bail!("Config error: agent.binary_path must not be empty");
        }
        if self.agent.default_model.trim().is_empty() {
            anyhow::bail!("Config error: agent.default_model must not be empty");
        }
        if self.agent.models.is_empty() {
            anyhow::bail!("Config error: agent.models must not be empty");
        }
        if self.timeouts.send_secs == 0 || self.timeouts.gate_secs == 0 {
            anyhow::bail!("Config error: timeouts must be positive");
        }
        Ok(())
    }
}
