use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tracing output. Keys missing from the file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, e.g. `"info,alpha_sync::infrastructure::bluetooth=trace"`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub console: bool,
    pub ansi: bool,
    /// Rolling log file; `null` turns file output off
    pub file: Option<LogFileSettings>,
    pub source_location: bool,
    pub thread_ids: bool,
    pub target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            ansi: true,
            file: Some(LogFileSettings::default()),
            source_location: true,
            thread_ids: false,
            target: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileSettings {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: LogRotation,
}

impl Default for LogFileSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            prefix: "alpha_sync".to_string(),
            rotation: LogRotation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectStrategy {
    /// Retry as soon as the platform reports the failure
    #[default]
    Immediate,
    /// Double the wait after each failed attempt, up to `max_delay_ms`
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default)]
    pub strategy: ReconnectStrategy,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Pause between "connected" and service discovery
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            max_listeners: default_max_listeners(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_max_listeners() -> usize {
    16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FixAccuracy {
    Coarse,
    #[default]
    Fine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRequestSettings {
    #[serde(default = "default_fix_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_fix_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_fix_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub accuracy: FixAccuracy,
}

impl Default for FixRequestSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_fix_interval_ms(),
            min_interval_ms: default_fix_min_interval_ms(),
            max_delay_ms: default_fix_max_delay_ms(),
            accuracy: FixAccuracy::default(),
        }
    }
}

fn default_fix_interval_ms() -> u64 {
    10_000
}
fn default_fix_min_interval_ms() -> u64 {
    5_000
}
fn default_fix_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub fix_request: FixRequestSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Use an explicit settings file; missing or unreadable files yield defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("AlphaSync");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
