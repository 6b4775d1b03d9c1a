//! Configuration file loading.
//!
//! The file is plain JSON in the shape of [`LibvirtConfig`]; every field is
//! optional. Lookup order: the explicit `--config` path, then
//! `<config dir>/kvmdeck/config.json` when it exists, then built-in defaults.

use kvmdeck_libvirt::types::LibvirtConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `<config dir>/kvmdeck/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kvmdeck").join("config.json"))
}

pub fn load_file(path: &Path) -> Result<LibvirtConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// An explicit path must exist; the default location is optional.
pub fn load(explicit: Option<&Path>) -> Result<LibvirtConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => load_file(&path),
        _ => Ok(LibvirtConfig::default()),
    }
}
