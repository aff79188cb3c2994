use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rcutil_events::{Event, FixedEvent, TickPhase};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatcher::EventDispatcher;
use crate::error::ProtocolError;
use crate::script::ScriptHandle;
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcutilConfig {
    /// Host the script server listens on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the script server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Permission level a player needs to run script commands
    #[serde(default = "default_permission_level")]
    pub required_permission_level: u8,

    /// Game ticks per second driven by the host loop
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    /// Scripts registered at startup (script name -> config)
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Where callbacks for this script are delivered
    pub address: String,

    #[serde(default)]
    pub description: String,

    /// Fixed event name -> callback method
    #[serde(default)]
    pub callbacks: BTreeMap<String, String>,

    #[serde(default)]
    pub timers: Vec<TimerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    pub callback: String,

    #[serde(default = "default_phase")]
    pub phase: TickPhase,

    #[serde(default)]
    pub delay: u64,

    /// Makes this a clock repeating every `period` ticks
    #[serde(default)]
    pub period: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    37265
}

fn default_permission_level() -> u8 {
    2
}

fn default_tick_rate() -> u32 {
    20
}

fn default_phase() -> TickPhase {
    TickPhase::Start
}

impl Default for RcutilConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            required_permission_level: default_permission_level(),
            tick_rate: default_tick_rate(),
            scripts: BTreeMap::new(),
        }
    }
}

impl RcutilConfig {
    /// Default config location in the platform config directory
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rcutil").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path().ok_or(ConfigLoadError::NotFound)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigLoadError> {
        toml::from_str(content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Address the script server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Register every configured script with its callbacks and timers.
    ///
    /// All or nothing: on the first failure every script installed by this
    /// call is removed again before the error is returned.
    pub fn install_scripts<T: Transport>(
        &self,
        dispatcher: &EventDispatcher<T>,
    ) -> Result<Vec<ScriptHandle>, ProtocolError> {
        let mut installed = Vec::with_capacity(self.scripts.len());
        for (name, script_config) in &self.scripts {
            let outcome = dispatcher
                .register_script(
                    name.as_str(),
                    script_config.description.as_str(),
                    script_config.address.as_str(),
                )
                .and_then(|script| {
                    installed.push(script.clone());
                    script_config.install(dispatcher, &script)
                });

            if let Err(e) = outcome {
                warn!("Failed to install script {}: {}", name, e);
                for script in installed {
                    dispatcher.remove_script(script.name()).ok();
                }
                return Err(e);
            }
        }
        Ok(installed)
    }
}

impl ScriptConfig {
    fn install<T: Transport>(
        &self,
        dispatcher: &EventDispatcher<T>,
        script: &ScriptHandle,
    ) -> Result<(), ProtocolError> {
        for (event_name, callback) in &self.callbacks {
            let event: FixedEvent = event_name.parse()?;
            dispatcher.register_callback(script, Event::Fixed(event), callback.as_str())?;
        }

        for timer in &self.timers {
            match timer.period {
                Some(period) => dispatcher.schedule_clock(
                    script,
                    timer.phase,
                    timer.delay,
                    period,
                    timer.callback.as_str(),
                )?,
                None => dispatcher.schedule_timer(
                    script,
                    timer.phase,
                    timer.delay,
                    timer.callback.as_str(),
                )?,
            };
        }
        Ok(())
    }
}
