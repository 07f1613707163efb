//! Configuration loading
//!
//! Configuration comes from a TOML file, then environment variables override
//! individual fields. Every section has defaults, so an empty file is a
//! valid (if token-less) configuration.

use crate::bus::DEFAULT_TOPIC;
use crate::db::DatabaseConfig;
use crate::error::ConfigError;
use crate::menu::MenuStyle;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ON_DEMAND_RADIUS_KM: f64 = 10.0;
pub const DEFAULT_DISPATCH_RADIUS_KM: f64 = 3.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeomatchConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub menu: MenuConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub application_id: Option<u64>,
}

fn default_prefix() -> String {
    "!".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefix: default_prefix(),
            application_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusBackend {
    #[default]
    InProcess,
    Surreal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Buffer size of the in-process channel.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_capacity() -> usize {
    256
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            topic: default_topic(),
            capacity: default_capacity(),
        }
    }
}

/// The two proximity radii, kept apart on purpose: "search next" looks
/// further than the automatic dispatch after a search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_on_demand_radius")]
    pub on_demand_radius_km: f64,
    #[serde(default = "default_dispatch_radius")]
    pub dispatch_radius_km: f64,
}

fn default_on_demand_radius() -> f64 {
    DEFAULT_ON_DEMAND_RADIUS_KM
}

fn default_dispatch_radius() -> f64 {
    DEFAULT_DISPATCH_RADIUS_KM
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            on_demand_radius_km: DEFAULT_ON_DEMAND_RADIUS_KM,
            dispatch_radius_km: DEFAULT_DISPATCH_RADIUS_KM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuConfig {
    #[serde(default)]
    pub style: MenuStyle,
}

/// Load configuration from a TOML file
pub async fn load_config(path: &Path) -> Result<GeomatchConfig> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "file".to_string(),
            expected: "readable TOML file".to_string(),
            cause: ConfigError::Io(e.to_string()),
        }
    })?;

    parse_config(&content, path)
}

fn parse_config(content: &str, path: &Path) -> Result<GeomatchConfig> {
    toml::from_str(content).map_err(|e| CoreError::ConfigurationError {
        config_path: path.display().to_string(),
        field: "content".to_string(),
        expected: "valid TOML configuration".to_string(),
        cause: ConfigError::TomlParse(e.to_string()),
    })
}

/// Standard configuration locations, most specific first
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Project-specific config
    paths.push(PathBuf::from("geomatch.toml"));

    // User config directory
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("geomatch").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".geomatch").join("config.toml"));
    }

    paths
}

/// Load configuration from standard locations
pub async fn load_config_from_standard_locations() -> Result<GeomatchConfig> {
    for path in config_paths() {
        if path.exists() {
            tracing::info!("Loading configuration from {}", path.display());
            return load_config(&path).await;
        }
    }

    tracing::info!("No configuration file found, using defaults");
    Ok(GeomatchConfig::default())
}

impl GeomatchConfig {
    /// Loads from `path` if given, else from the standard locations, then
    /// applies environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config(path).await?,
            None => load_config_from_standard_locations().await?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from any variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.discord.token = token;
        }
        if let Some(app_id) = lookup("APP_ID") {
            match app_id.parse() {
                Ok(id) => self.discord.application_id = Some(id),
                Err(_) => tracing::warn!("Ignoring non-numeric APP_ID '{}'", app_id),
            }
        }
        if let Some(prefix) = lookup("GEOMATCH_PREFIX") {
            self.discord.prefix = prefix;
        }
        if let Some(path) = lookup("GEOMATCH_DB_PATH") {
            self.database = DatabaseConfig::Embedded { path };
        }
        if let Some(topic) = lookup("GEOMATCH_BUS_TOPIC") {
            self.bus.topic = topic;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| CoreError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.discord.token.trim().is_empty() {
            return Err(invalid(
                "discord.token",
                "set it in the config file or DISCORD_TOKEN",
            ));
        }
        if self.discord.prefix.is_empty() {
            return Err(invalid("discord.prefix", "must not be empty"));
        }
        for (field, radius) in [
            ("matching.on_demand_radius_km", self.matching.on_demand_radius_km),
            ("matching.dispatch_radius_km", self.matching.dispatch_radius_km),
        ] {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(invalid(field, "must be a positive number of kilometres"));
            }
        }
        if self.bus.topic.trim().is_empty() {
            return Err(invalid("bus.topic", "must not be empty"));
        }
        if self.bus.backend == BusBackend::Surreal && self.database.is_memory() {
            return Err(invalid(
                "bus.backend",
                "the surreal bus needs an embedded or remote database",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("", Path::new("geomatch.toml")).unwrap();
        assert_eq!(config, GeomatchConfig::default());
        assert_eq!(config.matching.on_demand_radius_km, 10.0);
        assert_eq!(config.matching.dispatch_radius_km, 3.0);
        assert_eq!(config.bus.topic, "geo-match-search");
        assert_eq!(config.discord.prefix, "!");
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
            [discord]
            token = "abc"
            prefix = "/"

            [database]
            type = "memory"

            [bus]
            backend = "in_process"
            topic = "matches"

            [matching]
            on_demand_radius_km = 25.0
            dispatch_radius_km = 5.5

            [menu]
            style = "commands"
        "#;
        let config = parse_config(toml, Path::new("x.toml")).unwrap();
        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.database, DatabaseConfig::Memory);
        assert_eq!(config.bus.topic, "matches");
        assert_eq!(config.matching.dispatch_radius_km, 5.5);
        assert_eq!(config.menu.style, MenuStyle::Commands);
        config.validate().unwrap();
    }

    #[test]
    fn bad_toml_reports_path() {
        let err = parse_config("[discord", Path::new("/etc/geomatch.toml")).unwrap_err();
        let output = format!("{:?}", miette::Report::new(err));
        assert!(output.contains("/etc/geomatch.toml"));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("DISCORD_TOKEN", "from-env"),
            ("APP_ID", "1234"),
            ("GEOMATCH_DB_PATH", "/tmp/geo.db"),
        ]
        .into_iter()
        .collect();

        let mut config = GeomatchConfig::default();
        config.apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.discord.token, "from-env");
        assert_eq!(config.discord.application_id, Some(1234));
        assert_eq!(
            config.database,
            DatabaseConfig::Embedded {
                path: "/tmp/geo.db".to_string()
            }
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = GeomatchConfig::default();
        assert!(config.validate().is_err());

        config.discord.token = "token".to_string();
        config.validate().unwrap();

        config.matching.dispatch_radius_km = 0.0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig { field, .. }) if field == "matching.dispatch_radius_km"
        ));

        config.matching.dispatch_radius_km = 3.0;
        config.database = DatabaseConfig::Memory;
        config.bus.backend = BusBackend::Surreal;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn missing_file_is_configuration_error() {
        let err = load_config(Path::new("/definitely/not/here.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError { .. }));
    }
}
