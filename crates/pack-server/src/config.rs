use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pack_registry::WatchConfig;
use serde::{Deserialize, Serialize};
use serde_yaml_bw as serde_yaml;

/// Written out when no settings file exists yet.
pub const SETTINGS_TEMPLATE: &str = include_str!("../config/settings.template.yaml");

const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";
const FALLBACK_SETTINGS_FILE: &str = "config/settings.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub packs: PacksSettings,
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacksSettings {
    pub directory: PathBuf,
    pub file_monitor: bool,
    /// Settle delay in seconds.
    pub file_monitor_interval: f64,
    /// Seconds.
    pub scan_cooldown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// `None` logs to stdout only.
    pub file: Option<PathBuf>,
}

/// Settings together with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: PathBuf,
    /// The template was written because no settings file existed.
    pub created: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
        }
    }
}

impl Default for PacksSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./resourcepacks"),
            file_monitor: true,
            file_monitor_interval: 1.0,
            scan_cooldown: 2.0,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("logs/server.log")),
        }
    }
}

impl Settings {
    /// Locate, load and finalize settings relative to `base`.
    ///
    /// An explicit path must exist. Otherwise `settings.yaml` and then
    /// `config/settings.yaml` are tried, and the template is written to
    /// `settings.yaml` when neither exists.
    pub fn discover(base: &Path, explicit: Option<&Path>) -> Result<LoadedSettings> {
        let (path, created) = match explicit {
            Some(path) => (base.join(path), false),
            None => match [DEFAULT_SETTINGS_FILE, FALLBACK_SETTINGS_FILE]
                .iter()
                .map(|candidate| base.join(candidate))
                .find(|candidate| candidate.is_file())
            {
                Some(path) => (path, false),
                None => {
                    let path = base.join(DEFAULT_SETTINGS_FILE);
                    fs::write(&path, SETTINGS_TEMPLATE)
                        .with_context(|| format!("failed to write default settings to {:?}", path))?;
                    (path, true)
                }
            },
        };

        let mut settings = Self::load_from_path(&path)?;
        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.finalize()?;
        Ok(LoadedSettings {
            settings,
            path,
            created,
        })
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("failed to parse settings file {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply the documented environment overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("SERVER_PORT `{port}` is not a valid port"))?;
        }
        if let Some(directory) = lookup("PACKS_DIRECTORY") {
            self.packs.directory = PathBuf::from(directory);
        }
        if let Some(flag) = lookup("PACKS_FILE_MONITOR") {
            self.packs.file_monitor = parse_flag("PACKS_FILE_MONITOR", &flag)?;
        }
        if let Some(secs) = lookup("PACKS_FILE_MONITOR_INTERVAL") {
            self.packs.file_monitor_interval = parse_seconds("PACKS_FILE_MONITOR_INTERVAL", &secs)?;
        }
        if let Some(secs) = lookup("PACKS_SCAN_COOLDOWN") {
            self.packs.scan_cooldown = parse_seconds("PACKS_SCAN_COOLDOWN", &secs)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate durations and fold `server.debug` into the log level.
    pub fn finalize(&mut self) -> Result<()> {
        self.watch_config()?;
        if self.server.debug {
            self.logging.level = "debug".to_string();
        }
        Ok(())
    }

    pub fn watch_config(&self) -> Result<WatchConfig> {
        Ok(WatchConfig {
            enabled: self.packs.file_monitor,
            settle_delay: seconds("packs.file_monitor_interval", self.packs.file_monitor_interval)?,
            scan_cooldown: seconds("packs.scan_cooldown", self.packs.scan_cooldown)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("{key} must be a non-negative number of seconds, got {value}");
    }
    Duration::try_from_secs_f64(value).with_context(|| format!("{key} is out of range"))
}

fn parse_seconds(key: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} `{raw}` is not a number"))?;
    seconds(key, value)?;
    Ok(value)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key} `{other}` is not a boolean"),
    }
}
