// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Agent and analyzer configuration via `topograph.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::{GraphError, Result};
use crate::core::sync::ForwarderOptions;

/// Identity of this host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Root node identifier. Defaults to the machine hostname.
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Analyzer addresses as `host:port`. Only the first is used.
    pub analyzers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwarderSection {
    pub queue_capacity: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ForwarderSection {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            backoff_initial_ms: 250,
            backoff_max_ms: 30_000,
        }
    }
}

impl From<&ForwarderSection> for ForwarderOptions {
    fn from(section: &ForwarderSection) -> Self {
        Self {
            queue_capacity: section.queue_capacity,
            backoff_initial: Duration::from_millis(section.backoff_initial_ms),
            backoff_max: Duration::from_millis(section.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    pub listen: String,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8082".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Configuration from `topograph.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopographConfig {
    pub host: HostSection,
    pub agent: AgentSection,
    pub forwarder: ForwarderSection,
    pub analyzer: AnalyzerSection,
    pub logging: LoggingSection,
}

impl TopographConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "topograph.yaml";

    /// Load configuration from a file. Returns error if the file is missing
    /// or cannot be parsed.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            GraphError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config = Self::parse(&content).map_err(|e| {
            GraphError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;

        tracing::info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a file, returning defaults if the file is
    /// missing or unparseable.
    pub fn load_or_default(config_path: &Path) -> Self {
        if !config_path.exists() {
            tracing::debug!("No {} found, using defaults", config_path.display());
            return Self::default();
        }

        match Self::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document is a null, not a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Host identity: `host.id`, else the machine hostname, else `localhost`.
    pub fn host_id(&self) -> String {
        self.host
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(system_hostname)
    }

    /// The analyzer the agent forwards to.
    pub fn analyzer_address(&self) -> Result<&str> {
        self.agent
            .analyzers
            .first()
            .map(String::as_str)
            .ok_or_else(|| GraphError::Configuration("agent.analyzers is empty".into()))
    }

    pub fn forwarder_options(&self) -> ForwarderOptions {
        ForwarderOptions::from(&self.forwarder)
    }
}

fn system_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
