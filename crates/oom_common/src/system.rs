//! Host facts for the report header and default log discovery.

use crate::error::{OomError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::debug;

const OS_RELEASE_PATHS: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];
const SYSLOG_CONFS: &[&str] = &["/etc/rsyslog.conf", "/etc/syslog.conf"];
const FALLBACK_LOGS: &[&str] = &["/var/log/messages", "/var/log/syslog"];

/// Distro ids normalised to the names admins use
const DISTRO_ID_MAP: &[(&str, &str)] = &[
    ("ol", "oracle"),
    ("rhel", "redhat"),
    ("centos", "centos"),
    ("almalinux", "almalinux"),
    ("rocky", "rocky"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

/// Facts about the machine running the scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemInfo {
    pub hostname: Option<String>,
    pub distro: Option<String>,
    pub version: Option<String>,
    pub kernel: Option<String>,
    pub ram_mb: Option<u64>,
}

impl SystemInfo {
    pub fn detect() -> Self {
        let release = read_os_release().unwrap_or_default();
        Self {
            hostname: System::host_name(),
            distro: release.id,
            version: release.version_id,
            kernel: System::kernel_version(),
            ram_mb: host_ram_mb(),
        }
    }

    /// "redhat 8.9" style label
    pub fn distro_label(&self) -> Option<String> {
        match (&self.distro, &self.version) {
            (Some(d), Some(v)) => Some(format!("{} {}", d, v)),
            (Some(d), None) => Some(d.clone()),
            _ => None,
        }
    }
}

pub fn map_distro_id(id: &str) -> String {
    DISTRO_ID_MAP
        .iter()
        .find(|(raw, _)| *raw == id)
        .map(|(_, mapped)| mapped.to_string())
        .unwrap_or_else(|| id.to_string())
}

pub fn parse_os_release(content: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "ID" => release.id = Some(map_distro_id(&value)),
            "VERSION_ID" => release.version_id = Some(value),
            "PRETTY_NAME" => release.pretty_name = Some(value),
            _ => {}
        }
    }
    release
}

fn read_os_release() -> Option<OsRelease> {
    OS_RELEASE_PATHS
        .iter()
        .find_map(|path| fs::read_to_string(path).ok())
        .map(|content| parse_os_release(&content))
}

/// Total physical memory of this host in MB
pub fn host_ram_mb() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        None
    } else {
        Some(total / 1024 / 1024)
    }
}

/// Destination of the `*.info` selector in a syslog config
pub fn parse_syslog_conf(content: &str) -> Option<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find(|line| line.contains("*.info"))
        .and_then(|line| line.split_whitespace().last())
        // rsyslog's "-" prefix only disables sync
        .map(|target| PathBuf::from(target.trim_start_matches('-')))
        .filter(|path| path.is_absolute())
}

/// The system log this host writes kernel messages to
pub fn default_log_file() -> Result<PathBuf> {
    find_default_log(SYSLOG_CONFS, FALLBACK_LOGS)
}

fn find_default_log(confs: &[&str], fallbacks: &[&str]) -> Result<PathBuf> {
    for conf in confs {
        let Ok(content) = fs::read_to_string(conf) else {
            continue;
        };
        if let Some(path) = parse_syslog_conf(&content).filter(|p| p.is_file()) {
            debug!(conf, log = %path.display(), "log file from syslog config");
            return Ok(path);
        }
    }

    fallbacks
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
        .ok_or(OomError::NoDefaultLog)
}
