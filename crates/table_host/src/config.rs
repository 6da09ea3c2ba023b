//! Configuration management for the table host.
//!
//! This module handles loading, validation, and CLI overrides of the host
//! configuration stored in a TOML file.

use local_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::cli::CliArgs;

/// Default interval between sweeps for half-closed seats
fn default_reap_interval() -> u64 {
    100
}

fn default_rounds() -> u32 {
    3
}

/// Application configuration loaded from TOML file.
///
/// Encompasses the hosted table, the in-process transport and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Table settings
    pub table: TableSettings,
    /// In-process transport settings
    #[serde(default)]
    pub transport: TransportConfig,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Settings for the hosted table and the bots attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSettings {
    /// Listener name the bots connect to (e.g., "table-1")
    pub name: String,
    /// Number of bot clients to attach
    pub bots: usize,
    /// Dice rounds each bot plays before leaving
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Milliseconds between sweeps that drop seats whose bot has left
    #[serde(default = "default_reap_interval")]
    pub reap_interval_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table: TableSettings {
                name: "table-1".to_string(),
                bots: 4,
                rounds: 3,
                reap_interval_ms: 100,
            },
            transport: TransportConfig::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to that
    /// path and returns it.
    pub async fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(table) = &args.table {
            self.table.name = table.clone();
        }
        if let Some(bots) = args.bots {
            self.table.bots = bots;
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.table.name.is_empty() {
            return Err("Table name cannot be empty".to_string());
        }
        if self.table.bots == 0 {
            return Err("At least one bot is required".to_string());
        }
        if self.table.reap_interval_ms == 0 {
            return Err("Reap interval must be greater than zero".to_string());
        }
        if self.transport.backlog_capacity == 0 {
            return Err("Backlog capacity must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
