//! Incident records produced by the parser.

use crate::timestamp::LogTime;
use serde::{Deserialize, Serialize};

/// One row of the kernel's process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// PID from the leading bracket, when it parsed
    pub pid: Option<u32>,
    /// Process name (last token of the row)
    pub name: String,
    /// RSS as printed by the kernel, in pages
    pub rss_pages: u64,
    /// RSS in MB (pages * page size / 1024, truncated per row)
    pub rss_mb: u64,
}

/// Where an incident's RAM figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamSource {
    /// "<N> pages RAM" line in the Mem-Info preamble
    PagesRam,
    /// "memory: usage <U>kB, limit <L>kB" cgroup line
    CgroupLimit,
    /// Manually supplied or read from the scanning host
    Fallback,
}

/// One OOM-killer incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// 1-based position within the scanned source
    pub incident_number: usize,
    /// Timestamp of the process-table header line
    pub start_time: Option<LogTime>,
    /// Process-table rows, duplicates preserved
    pub processes: Vec<ProcessEntry>,
    /// Processes the kernel reported killing
    pub killed: Vec<String>,
    /// Sum of `rss_mb` over `processes`
    pub total_mb: u64,
    /// RAM figure associated with this incident
    pub system_ram_mb: Option<u64>,
    pub ram_source: Option<RamSource>,
}

impl IncidentRecord {
    pub fn new(incident_number: usize, start_time: Option<LogTime>) -> Self {
        Self {
            incident_number,
            start_time,
            processes: Vec::new(),
            killed: Vec::new(),
            total_mb: 0,
            system_ram_mb: None,
            ram_source: None,
        }
    }

    /// Append a table row, keeping `total_mb` in step
    pub fn push_process(&mut self, entry: ProcessEntry) {
        self.total_mb = self.total_mb.saturating_add(entry.rss_mb);
        self.processes.push(entry);
    }

    /// Attach a RAM figure unless one is already present
    pub fn attribute_ram(&mut self, ram_mb: u64, source: RamSource) {
        if self.system_ram_mb.is_none() {
            self.system_ram_mb = Some(ram_mb);
            self.ram_source = Some(source);
        }
    }
}
