//! Layered configuration.
//!
//! Settings are merged from, in increasing precedence:
//! - Default values
//! - `.dbtpc/settings.toml` (searched upwards from the current directory)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables are prefixed with `DBTPC_` and use double underscores
//! to separate nested levels:
//! - `DBTPC_WATCHER__DEBOUNCE_MS=500` sets `watcher.debounce_ms`
//! - `DBTPC_DISCOVERY__MODULES_DIR=dbt_packages` sets `discovery.modules_dir`
//! - `DBTPC_RUNNER__INTERPRETER=/usr/bin/python3` sets `runner.interpreter`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory holding the settings file.
pub const LOCAL_DIR: &str = ".dbtpc";
/// Settings file name inside [`LOCAL_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "DBTPC_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directories searched for projects. Empty means nothing is discovered.
    #[serde(default)]
    pub workspace_roots: Vec<PathBuf>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// File whose presence marks a directory as a project root
    #[serde(default = "default_descriptor_file")]
    pub descriptor_file: String,

    /// Directory holding installed third-party packages inside a project.
    /// Never descended into during discovery.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,

    /// Path segment marking isolated-environment package directories.
    /// Descriptors below such a segment are dropped.
    #[serde(default = "default_ignore_token")]
    pub ignore_token: String,

    /// Extra gitignore-style patterns excluded from discovery
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Honour `.gitignore` files while searching
    #[serde(default = "default_false")]
    pub respect_gitignore: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Watch workspace roots for top-level create/delete events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after a top-level creation before rebuilding
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How often pending creations are checked
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct RunnerConfig {
    /// Interpreter used to start the tool runner. Unset means no runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `dbt_project_cache = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_descriptor_file() -> String {
    "dbt_project.yml".to_string()
}
fn default_modules_dir() -> String {
    "dbt_modules".to_string()
}
fn default_ignore_token() -> String {
    "site-packages".to_string()
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_tick_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_roots: Vec::new(),
            discovery: DiscoveryConfig::default(),
            watcher: WatcherConfig::default(),
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            descriptor_file: default_descriptor_file(),
            modules_dir: default_modules_dir(),
            ignore_token: default_ignore_token(),
            exclude_patterns: Vec::new(),
            respect_gitignore: false,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(LOCAL_DIR).join(SETTINGS_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still layering environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting levels, single underscore stays in names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                settings.absolutize_roots();
                settings
            })
    }

    /// Resolve relative workspace roots against the current directory.
    fn absolutize_roots(&mut self) {
        let Ok(current) = std::env::current_dir() else {
            return;
        };
        for root in &mut self.workspace_roots {
            if root.is_relative() {
                *root = current.join(&*root);
            }
        }
    }

    /// Find `.dbtpc/settings.toml` in the current directory or any ancestor.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(LOCAL_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory.
    ///
    /// The current directory becomes the single workspace root.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(LOCAL_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        if let Ok(current_dir) = std::env::current_dir() {
            settings.workspace_roots.push(current_dir);
        }

        settings.save(&config_path)?;
        Ok(config_path)
    }
}
