//! Command-line surface for oomctl.

use clap::{ArgAction, ArgGroup, Parser};
use oom_common::report::{DisplayWindow, ShowCount};
use oom_common::LogSource;
use std::path::PathBuf;

// Version is embedded at build time
pub const VERSION: &str = env!("OOMCTL_VERSION");

#[derive(Parser, Debug)]
#[command(name = "oomctl")]
#[command(about = "Out Of Memory Analyzer - find OOM-killer incidents in kernel logs", long_about = None)]
#[command(version = VERSION)]
#[command(group(ArgGroup::new("source").args(["file", "journalctl", "dmesg"])))]
pub struct Cli {
    /// Log file to scan (default: the system log)
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Scan the kernel journal of the current boot
    #[arg(short = 'j', long)]
    pub journalctl: bool,

    /// Scan the kernel ring buffer
    #[arg(short = 'd', long)]
    pub dmesg: bool,

    /// Number of incidents to show in detail
    #[arg(short = 's', long, value_name = "N")]
    pub show: Option<usize>,

    /// Show every incident in detail
    #[arg(short = 'a', long, conflicts_with = "show")]
    pub all: bool,

    /// Most recent incidents first
    #[arg(short = 'r', long)]
    pub reverse: bool,

    /// Only count incidents in the log and its rotated siblings
    #[arg(short = 'q', long)]
    pub quick: bool,

    /// Scan files larger than the size limit
    #[arg(short = 'o', long = "override")]
    pub override_size: bool,

    /// System RAM in MB for incidents whose log carries none
    #[arg(long, value_name = "MB")]
    pub ram: Option<u64>,

    /// Print JSON instead of the text report
    #[arg(long)]
    pub json: bool,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The explicitly requested source, if any
    pub fn requested_source(&self) -> Option<LogSource> {
        if self.journalctl {
            Some(LogSource::Journal)
        } else if self.dmesg {
            Some(LogSource::RingBuffer)
        } else {
            self.file.clone().map(LogSource::File)
        }
    }

    pub fn display_window(&self, default_show: usize) -> DisplayWindow {
        DisplayWindow {
            show: if self.all {
                ShowCount::All
            } else {
                ShowCount::Count(self.show.unwrap_or(default_show))
            },
            reverse: self.reverse,
        }
    }

    /// tracing filter used when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
