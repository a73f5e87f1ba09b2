//! OOM Common - kernel OOM-killer log analysis
//!
//! Parses syslog, dmesg and journalctl output for OOM-killer incidents and
//! builds the statistics `oomctl` reports on.

pub mod config;
pub mod error;
pub mod incident;
pub mod parser;
pub mod quick;
pub mod render;
pub mod report;
pub mod scan;
pub mod source;
pub mod system;
pub mod timestamp;

pub use config::OomConfig;
pub use error::{OomError, Result};
pub use incident::{IncidentRecord, ProcessEntry, RamSource};
pub use parser::{parse_lines, IncidentParser, Incidents, LogWindow, ParseStats, ParserConfig};
pub use quick::{discover_rotated, quick_scan, QuickScanEntry};
pub use report::{AggregateReport, DisplayWindow, ShowCount};
pub use scan::{scan, ScanOptions, ScanResult};
pub use source::LogSource;
pub use timestamp::LogTime;
