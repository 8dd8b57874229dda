use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::model::{Message, ProviderKind, ReasoningEffort};

pub const DEFAULT_SYSTEM: &str = "You are a skilled Python programmer who writes tersely.";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Settings remembered between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SessionFile")]
pub struct SessionConfig {
    pub system: String,
    pub model: String,
    pub temperature: f32,
    pub conversation: bool,
    pub messages: Vec<Message>,
    pub use_tools: bool,
    pub reasoning_effort: ReasoningEffort,
    pub provider: ProviderKind,
    pub max_tokens: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            conversation: false,
            messages: Vec::new(),
            use_tools: false,
            reasoning_effort: ReasoningEffort::default(),
            provider: ProviderKind::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// On-disk shape. The older `system_message` key is read only when `system` is absent.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct SessionFile {
    system: Option<String>,
    system_message: Option<String>,
    model: String,
    temperature: f32,
    conversation: bool,
    messages: Vec<Message>,
    use_tools: bool,
    reasoning_effort: ReasoningEffort,
    provider: ProviderKind,
    max_tokens: u32,
}

impl Default for SessionFile {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            system: None,
            system_message: None,
            model: defaults.model,
            temperature: defaults.temperature,
            conversation: defaults.conversation,
            messages: defaults.messages,
            use_tools: defaults.use_tools,
            reasoning_effort: defaults.reasoning_effort,
            provider: defaults.provider,
            max_tokens: defaults.max_tokens,
        }
    }
}

impl From<SessionFile> for SessionConfig {
    fn from(file: SessionFile) -> Self {
        Self {
            system: file
                .system
                .or(file.system_message)
                .unwrap_or_else(|| DEFAULT_SYSTEM.to_string()),
            model: file.model,
            temperature: file.temperature,
            conversation: file.conversation,
            messages: file.messages,
            use_tools: file.use_tools,
            reasoning_effort: file.reasoning_effort,
            provider: file.provider,
            max_tokens: file.max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable file yields defaults.
    pub fn load(&self) -> SessionConfig {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session config yet, using defaults");
                return SessionConfig::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read session config");
                return SessionConfig::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => {
                debug!(path = %self.path.display(), "loaded session config");
                config
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "session config is malformed, using defaults"
                );
                SessionConfig::default()
            }
        }
    }

    pub fn save(&self, config: &SessionConfig) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
        }
        let body =
            serde_json::to_string_pretty(config).context("Failed to serialize session config")?;
        fs::write(&self.path, body).with_context(|| {
            format!("Failed to write session config '{}'", self.path.display())
        })?;
        debug!(
            path = %self.path.display(),
            message_count = config.messages.len(),
            "saved session config"
        );
        Ok(())
    }
}
