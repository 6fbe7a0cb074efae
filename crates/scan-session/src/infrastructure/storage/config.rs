//! TOML-based configuration for the scan-session binary.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\ScanSession\config.toml`
//! - Linux:    `~/.config/scansession/config.toml`
//! - macOS:    `~/Library/Application Support/ScanSession/config.toml`
//!
//! ```toml
//! [session]
//! log_level = "debug"
//! ready_action = "initialize_and_preview"
//!
//! [scan]
//! mode = "v2"
//! unit_size = 2.5
//!
//! [network]
//! role = "mirror"
//!
//! [storage]
//! root = "/data/scans"
//! layout = "nested"
//!
//! [[pipeline]]
//! op = "decimate"
//! ratio = 0.9
//!
//! [[pipeline]]
//! op = "smooth"
//! iterations = 10
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or
//! an older file without newer keys all load cleanly.

use std::path::{Path, PathBuf};

use scan_core::{
    CaptureSource, DeviceRole, PipelineOperation, ScanParameters, ScanningModeVersion,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::mesh_pipeline::MeshPipeline;
use crate::application::session_machine::{ReadyAction, SessionOptions};
use crate::infrastructure::storage::mesh_store::{MeshStore, StoreLayout};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cleanup steps applied after a mesh is generated.
    #[serde(default)]
    pub pipeline: Vec<PipelineOperation>,
}

/// Session behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// What to do on the first `visualizerReady`.
    #[serde(default)]
    pub ready_action: ReadyAction,
    /// Frame source used when `initialize_scanner` is called without one.
    #[serde(default)]
    pub capture_source: CaptureSource,
}

/// Scanning mode and unit size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    #[serde(default)]
    pub mode: ScanningModeVersion,
    /// Unit size in the mode's display unit (millimeters for v2).
    #[serde(default = "default_unit_size")]
    pub unit_size: f64,
}

/// Two-device pairing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Role applied at startup.  Absent means a standalone device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<DeviceRole>,
}

/// Where meshes are written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub layout: StoreLayout,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_unit_size() -> f64 {
    ScanParameters::default().unit_size
}
fn default_store_root() -> PathBuf {
    PathBuf::from("scans")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ready_action: ReadyAction::default(),
            capture_source: CaptureSource::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanningModeVersion::default(),
            unit_size: default_unit_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            layout: StoreLayout::default(),
        }
    }
}

impl AppConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ready_action: self.session.ready_action,
            capture_source: self.session.capture_source,
            parameters: ScanParameters {
                mode: self.scan.mode,
                unit_size: self.scan.unit_size,
            },
        }
    }

    pub fn pipeline(&self) -> MeshPipeline {
        MeshPipeline::new(self.pipeline.clone())
    }

    pub fn mesh_store(&self) -> MeshStore {
        MeshStore::new(self.storage.root.clone(), self.storage.layout)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `ScanSession` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ScanSession"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("scansession"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ScanSession")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
