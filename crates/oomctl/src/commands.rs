//! Command execution for oomctl.
//!
//! Each mode returns the text to print so the binary only handles I/O and
//! exit codes.

use crate::cli::Cli;
use anyhow::{Context, Result};
use oom_common::quick::count_incident_starts;
use oom_common::render::Renderer;
use oom_common::source::command_available;
use oom_common::system::{self, SystemInfo};
use oom_common::{
    discover_rotated, quick_scan, scan, AggregateReport, LogSource, OomConfig, OomError,
    ParserConfig, QuickScanEntry, ScanOptions, ScanResult,
};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Serialize)]
struct JsonReport<'a> {
    system: &'a SystemInfo,
    scan: &'a ScanResult,
    report: &'a AggregateReport,
}

/// Run the requested mode and return its output
pub fn run(cli: &Cli) -> Result<String> {
    let config = OomConfig::load()?;
    let renderer = Renderer::new(use_color(cli, &config), config.top_n);

    let (source, discovered) = match cli.requested_source() {
        Some(source) => (source, false),
        None => {
            let path = system::default_log_file()?;
            info!(path = %path.display(), "using system log");
            (LogSource::File(path), true)
        }
    };

    if cli.quick {
        return run_quick(cli, &renderer, &source);
    }

    let host = SystemInfo::detect();
    let options = ScanOptions {
        max_source_mb: if cli.override_size {
            None
        } else {
            Some(config.max_source_mb)
        },
        parser: ParserConfig {
            page_size_kb: config.page_size_kb,
            fallback_ram_mb: cli.ram.or(host.ram_mb),
            ..Default::default()
        },
    };

    let result = scan(&source, &options)
        .with_context(|| format!("failed to scan {}", source.display_name()))?;
    let report = AggregateReport::build(&result, &cli.display_window(config.show));

    if cli.json {
        let json = serde_json::to_string_pretty(&JsonReport {
            system: &host,
            scan: &result,
            report: &report,
        })?;
        return Ok(format!("{}\n", json));
    }

    let mut output = renderer.full_report(&result, &report, &host);
    if discovered {
        if let Some(ring_count) = ring_buffer_excess(result.incidents.len()) {
            output.push_str(&renderer.rotation_note(result.incidents.len(), ring_count));
        }
    }
    Ok(output)
}

fn run_quick(cli: &Cli, renderer: &Renderer, source: &LogSource) -> Result<String> {
    let entries = match source {
        LogSource::File(path) => {
            if !path.is_file() {
                return Err(OomError::SourceNotFound { path: path.clone() }.into());
            }
            let files = discover_rotated(path)
                .with_context(|| format!("failed to list rotated logs for {}", path.display()))?;
            quick_scan(&files)
        }
        other => vec![QuickScanEntry {
            source: other.display_name(),
            count: count_incident_starts(other)?,
        }],
    };

    if cli.json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(&entries)?));
    }

    let mut output = renderer.banner();
    output.push_str(&renderer.quick_scan(&entries));
    Ok(output)
}

/// Incident count in dmesg when it exceeds what the log file holds
fn ring_buffer_excess(file_count: usize) -> Option<usize> {
    if !command_available("dmesg") {
        return None;
    }
    match count_incident_starts(&LogSource::RingBuffer) {
        Ok(ring_count) if ring_count > file_count => Some(ring_count),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "ring buffer cross-check unavailable");
            None
        }
    }
}

fn use_color(cli: &Cli, config: &OomConfig) -> bool {
    if cli.no_color || cli.json || !config.color {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        return false;
    }
    console::colors_enabled()
}

/// Process exit status for an error returned by [`run`]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<OomError>())
        .map(OomError::exit_code)
        .unwrap_or(1)
}
