//! Configuration system for keepsake.
//!
//! Every component takes its configuration by value at construction time;
//! nothing here is global or mutable after the fact.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audit::AuditConfig;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::tags::TagConfig;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Check that a configured table name can be spliced into SQL.
pub fn validate_identifier(name: &str) -> KeepsakeResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(KeepsakeError::invalid_identifier(name))
    }
}

/// Version store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Table holding version rows.
    pub table: String,
    /// Record field used as the version name when none is given.
    pub name_field: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            table: "versions".to_string(),
            name_field: "title".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl VersioningConfig {
    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Check the configuration before it is used to build SQL.
    pub fn validate(&self) -> KeepsakeResult<()> {
        validate_identifier(&self.table)?;
        if self.name_field.is_empty() {
            return Err(KeepsakeError::validation_with_suggestion(
                "name_field must not be empty",
                "Use the record field that holds a human-readable title",
            ));
        }
        Ok(())
    }
}

/// Main keepsake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepsakeConfig {
    /// Path to the SQLite database.
    pub database_path: PathBuf,
    /// Version store configuration.
    pub versioning: VersioningConfig,
    /// Tag synchronization configuration.
    pub tags: TagConfig,
    /// Audit field mapping.
    pub audit: AuditConfig,
}

impl Default for KeepsakeConfig {
    fn default() -> Self {
        let keepsake_dir = dirs::home_dir()
            .map(|h| h.join(".keepsake"))
            .unwrap_or_else(|| PathBuf::from(".keepsake"));

        Self {
            database_path: keepsake_dir.join("versions.db"),
            versioning: VersioningConfig::default(),
            tags: TagConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl KeepsakeConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> KeepsakeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| KeepsakeError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| KeepsakeError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| KeepsakeError::Configuration(e.to_string()))?,
            _ => {
                return Err(KeepsakeError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("KEEPSAKE_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(table) = std::env::var("KEEPSAKE_VERSIONS_TABLE") {
            config.versioning.table = table;
        }
        if let Ok(field) = std::env::var("KEEPSAKE_NAME_FIELD") {
            config.versioning.name_field = field;
        }
        if let Some(ms) = std::env::var("KEEPSAKE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.versioning.busy_timeout_ms = ms;
            config.tags.busy_timeout_ms = ms;
        }

        config
    }

    /// Validate every table name and field mapping.
    pub fn validate(&self) -> KeepsakeResult<()> {
        self.versioning.validate()?;
        self.tags.validate()?;
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> KeepsakeConfigBuilder {
        KeepsakeConfigBuilder::default()
    }
}

/// Builder for KeepsakeConfig.
#[derive(Default)]
pub struct KeepsakeConfigBuilder {
    config: KeepsakeConfig,
}

impl KeepsakeConfigBuilder {
    /// Set database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Set version store configuration.
    pub fn versioning(mut self, config: VersioningConfig) -> Self {
        self.config.versioning = config;
        self
    }

    /// Set tag configuration.
    pub fn tags(mut self, config: TagConfig) -> Self {
        self.config.tags = config;
        self
    }

    /// Set audit field mapping.
    pub fn audit(mut self, config: AuditConfig) -> Self {
        self.config.audit = config;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> KeepsakeResult<KeepsakeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
