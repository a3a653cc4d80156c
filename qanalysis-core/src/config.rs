//! Configuration system for qanalysis.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> CLI overrides. The user config lives
//! at `~/.config/qanalysis/config.toml` (platform equivalent elsewhere).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analyzer::TargetPerf;
use crate::error::{QueueError, Result};
use crate::model::MAX_CAPACITY;
use crate::search::SearchOptions;
use crate::service::{CompositionPolicy, RequestSize, ServiceParms};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub request: RequestSize,
    /// Default targets for `size` when none are given on the command line.
    #[serde(default)]
    pub targets: TargetPerf,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Inference server and queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of requests served concurrently (N).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Maximum number of requests waiting for a batch slot.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default)]
    pub service: ServiceParms,
    #[serde(default)]
    pub policy: CompositionPolicy,
    /// Fraction trimmed off both ends of the admissible rate range.
    #[serde(default = "default_rate_margin")]
    pub rate_margin: f64,
    #[serde(default)]
    pub search: SearchOptions,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_queue_size: default_max_queue_size(),
            service: ServiceParms::default(),
            policy: CompositionPolicy::default(),
            rate_margin: default_rate_margin(),
            search: SearchOptions::default(),
        }
    }
}

impl QueueConfig {
    /// Structural checks; coefficient checks happen when composing rates.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(QueueError::config("max batch size must be positive"));
        }
        self.capacity()?;
        if !(self.rate_margin > 0.0 && self.rate_margin < 0.5) {
            return Err(QueueError::config(format!(
                "rate margin must lie in (0, 0.5), got {}",
                self.rate_margin
            )));
        }
        if !(self.search.tolerance.is_finite() && self.search.tolerance >= 0.0) {
            return Err(QueueError::config("search tolerance must be non-negative"));
        }
        if self.search.max_iterations == 0 {
            return Err(QueueError::config("search needs at least one iteration"));
        }
        Ok(())
    }

    /// Maximum number of requests admitted: batch slots plus queue slots.
    pub fn capacity(&self) -> Result<usize> {
        self.max_batch_size
            .checked_add(self.max_queue_size)
            .filter(|k| *k <= MAX_CAPACITY)
            .ok_or_else(|| {
                QueueError::config(format!(
                    "max batch size {} plus max queue size {} exceeds the capacity limit {}",
                    self.max_batch_size, self.max_queue_size, MAX_CAPACITY
                ))
            })
    }
}

fn default_max_batch_size() -> usize {
    256
}

fn default_max_queue_size() -> usize {
    100
}

fn default_rate_margin() -> f64 {
    0.001
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "llm-inferno", "qanalysis")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `QANALYSIS_`)
/// 3. Explicit config file
/// 4. User config (`~/.config/qanalysis/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> std::result::Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // QANALYSIS_QUEUE__MAX_BATCH_SIZE, QANALYSIS_SERVER__PORT, etc.
    figment = figment.merge(Env::prefixed("QANALYSIS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
