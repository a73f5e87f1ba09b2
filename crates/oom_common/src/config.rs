//! Configuration for oomctl.
//!
//! Loaded from the first of `$OOMCTL_CONFIG`, `~/.config/oomctl/config.toml`
//! and `/etc/oomctl/config.toml` that exists. No file means defaults.
//! Command-line flags override anything set here.

use crate::error::{OomError, Result};
use crate::parser::DEFAULT_PAGE_SIZE_KB;
use crate::report::{DEFAULT_SHOW, DEFAULT_TOP_N};
use crate::scan::DEFAULT_MAX_SOURCE_MB;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "OOMCTL_CONFIG";

/// System-wide config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/oomctl/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OomConfig {
    /// Refuse log files larger than this (MB) unless overridden
    #[serde(default = "default_max_source_mb")]
    pub max_source_mb: u64,

    /// Incidents shown in detail
    #[serde(default = "default_show")]
    pub show: usize,

    /// Rows in each incident's consumer table
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// kB per RSS page
    #[serde(default = "default_page_size_kb")]
    pub page_size_kb: u64,

    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_max_source_mb() -> u64 {
    DEFAULT_MAX_SOURCE_MB
}

fn default_show() -> usize {
    DEFAULT_SHOW
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_page_size_kb() -> u64 {
    DEFAULT_PAGE_SIZE_KB
}

fn default_color() -> bool {
    true
}

impl Default for OomConfig {
    fn default() -> Self {
        Self {
            max_source_mb: default_max_source_mb(),
            show: default_show(),
            top_n: default_top_n(),
            page_size_kb: default_page_size_kb(),
            color: default_color(),
        }
    }
}

impl OomConfig {
    /// Load from the first config file found, or defaults
    pub fn load() -> Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&explicit));
        }

        match search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from_path(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| OomError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml(&content).map_err(|message| OomError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn from_toml(content: &str) -> std::result::Result<Self, String> {
        let config: OomConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.page_size_kb == 0 {
            return Err("page_size_kb must be greater than zero".to_string());
        }
        Ok(config)
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("oomctl").join("config.toml"));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OomConfig::default();
        assert_eq!(config.max_source_mb, 300);
        assert_eq!(config.show, 5);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.page_size_kb, 4);
        assert!(config.color);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = OomConfig::from_toml("show = 12\ncolor = false\n").unwrap();
        assert_eq!(config.show, 12);
        assert!(!config.color);
        assert_eq!(config.max_source_mb, 300);
    }

    #[test]
    fn test_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_source_mb = 1024\ntop_n = 3\n").unwrap();

        let config = OomConfig::load_from_path(&path).unwrap();
        assert_eq!(config.max_source_mb, 1024);
        assert_eq!(config.top_n, 3);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "show = \"lots\"\n").unwrap();

        let err = OomConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, OomError::Config { .. }));
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        assert!(OomConfig::from_toml("page_size_kb = 0").is_err());
    }

    #[test]
    fn test_search_paths_end_with_system_config() {
        let paths = search_paths();
        assert_eq!(paths.last(), Some(&PathBuf::from(SYSTEM_CONFIG_PATH)));
    }
}
