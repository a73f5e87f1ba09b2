//! Text rendering for scan results.
//!
//! Every view is returned as a `String`; the caller decides where it goes.
//! Colour is a per-renderer switch so the same code serves terminals, pipes
//! and tests.

use crate::incident::{IncidentRecord, RamSource};
use crate::quick::QuickScanEntry;
use crate::report::{top_consumers, AggregateReport, ShowCount};
use crate::scan::ScanResult;
use crate::system::SystemInfo;
use crate::timestamp::display_or_unresolved;
use owo_colors::{OwoColorize, Style};

pub const ANALYZER_NAME: &str = "Out Of Memory Analyzer";
pub const DISCLAIMER: &str = "If the system OOMs too viciously, there may be nothing logged!";
pub const WARNING_TEXT: &str = "Do NOT take this output as FACT, ALWAYS investigate further.";
pub const SHOW_HINT: &str = "(To increase the number of OOM incidents displayed, use the -s flag)";

const SPACER_WIDTH: usize = 40;

const LOGO: &str = r"      _____ _____ _____
     |     |     |     |
     |  |  |  |  | | | |
     |_____|_____|_|_|_|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Header,
    Notice,
    Warning,
    Critical,
    Ok,
    Dim,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Tone::Header => Style::new().bold(),
            Tone::Notice => Style::new().cyan(),
            Tone::Warning => Style::new().yellow(),
            Tone::Critical => Style::new().red().bold(),
            Tone::Ok => Style::new().green(),
            Tone::Dim => Style::new().dimmed(),
        }
    }
}

/// Report renderer
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    top_n: usize,
}

impl Renderer {
    pub fn new(color: bool, top_n: usize) -> Self {
        Self { color, top_n }
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if self.color {
            text.style(tone.style()).to_string()
        } else {
            text.to_string()
        }
    }

    fn spacer(&self) -> String {
        self.paint(&"-".repeat(SPACER_WIDTH), Tone::Dim)
    }

    fn label(&self, key: &str, value: &str, tone: Tone) -> String {
        format!("{}{}\n", self.paint(key, Tone::Header), self.paint(value, tone))
    }

    fn section(&self, output: &mut String, title: &str, tone: Tone) {
        output.push_str(&self.spacer());
        output.push_str("\n\n");
        output.push_str(&self.paint(&format!("      {}", title), tone));
        output.push('\n');
        output.push_str(&self.spacer());
        output.push_str("\n\n");
    }

    /// Logo and disclaimer
    pub fn banner(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.spacer());
        output.push('\n');
        output.push_str(LOGO);
        output.push('\n');
        output.push_str(&format!("     {}\n\n", ANALYZER_NAME));
        output.push_str(&self.paint("Disclaimer:", Tone::Critical));
        output.push('\n');
        output.push_str(&self.paint(DISCLAIMER, Tone::Critical));
        output.push('\n');
        output.push_str(&self.paint(WARNING_TEXT, Tone::Critical));
        output.push('\n');
        output.push_str(&self.spacer());
        output.push('\n');
        output
    }

    /// Host facts plus the log being scanned
    pub fn system_header(&self, host: &SystemInfo, source: &str) -> String {
        let mut output = String::from("\n");
        if let Some(hostname) = &host.hostname {
            output.push_str(&self.label("Host: ", hostname, Tone::Notice));
        }
        if let Some(distro) = host.distro_label() {
            output.push_str(&self.label("OS: ", &distro, Tone::Notice));
        }
        if let Some(kernel) = &host.kernel {
            output.push_str(&self.label("Kernel: ", kernel, Tone::Notice));
        }
        if let Some(ram_mb) = host.ram_mb {
            let gib = format!("{:.2} GiB", ram_mb as f64 / 1024.0);
            output.push_str(&self.label("RAM: ", &gib, Tone::Notice));
        }
        output.push('\n');
        output.push_str(&self.label("Using Log: ", source, Tone::Ok));
        output
    }

    fn log_window(&self, scan: &ScanResult) -> String {
        let mut output = String::new();
        output.push_str(&self.label(
            "Log Start Time: ",
            &display_or_unresolved(scan.window.start_time.as_ref()),
            Tone::Notice,
        ));
        output.push_str(&self.label(
            "Log End Time: ",
            &display_or_unresolved(scan.window.end_time.as_ref()),
            Tone::Notice,
        ));
        output.push('\n');
        output
    }

    /// Banner, host header and whichever body fits the scan
    pub fn full_report(
        &self,
        scan: &ScanResult,
        report: &AggregateReport,
        host: &SystemInfo,
    ) -> String {
        let mut output = self.banner();
        output.push_str(&self.system_header(host, &scan.source));

        if scan.is_empty_source() {
            output.push('\n');
            output.push_str(&self.empty_source(&scan.source));
            return output;
        }

        output.push_str(&self.log_window(scan));

        if scan.incidents.is_empty() {
            output.push_str(&self.no_incidents(&scan.source));
            return output;
        }

        output.push_str(&self.overview(report));

        if report.largest_outside_window {
            if let Some(largest) = report.largest_record(scan) {
                self.section(&mut output, "Largest Incident", Tone::Critical);
                output.push_str(&self.paint(
                    "The largest OOM incident in this log file was:",
                    Tone::Header,
                ));
                output.push_str("\n\n");
                output.push_str(&self.incident_detail(largest));
            }
        }

        self.section(&mut output, "   OOM Incidents", Tone::Header);
        let shown = report.displayed.len();
        output.push_str(&format!(
            "Displaying {} of {} OOM incidents{}:\n\n",
            shown,
            report.incident_count,
            if report.display.reverse { " (most recent first)" } else { "" }
        ));
        for record in report.displayed_records(scan) {
            output.push_str(&self.incident_detail(record));
        }
        output.push_str(&self.spacer());
        output.push('\n');

        if report.is_truncated() && report.display.show != ShowCount::All {
            output.push('\n');
            output.push_str(&self.paint(SHOW_HINT, Tone::Warning));
            output.push('\n');
        }

        if scan.truncated {
            output.push('\n');
            output.push_str(&self.paint(
                "Reading stopped early after a read error; results may be incomplete.",
                Tone::Warning,
            ));
            output.push('\n');
        }

        output
    }

    fn overview(&self, report: &AggregateReport) -> String {
        let mut output = String::new();
        output.push_str(&self.spacer());
        output.push_str("\n\n");
        output.push_str(&self.paint(
            "WARNING: This device has run out of memory at least once in this log file.",
            Tone::Critical,
        ));
        output.push_str("\n\n");
        self.section(&mut output, "Incident Overview", Tone::Header);

        output.push_str(&self.label(
            "OOM Incidents: ",
            &report.incident_count.to_string(),
            Tone::Critical,
        ));
        if let Some(largest) = report.largest_incident {
            output.push_str(&self.label(
                "Highest OOM Incident: ",
                &format!("Incident Number {}", largest),
                Tone::Warning,
            ));
            output.push_str(&self.label(
                "Memory Used In Incident: ",
                &format!("{} MB", report.largest_total_mb),
                Tone::Warning,
            ));
        }

        if !report.kill_tally.is_empty() {
            output.push('\n');
            output.push_str(&self.paint("Most frequently killed:", Tone::Header));
            output.push('\n');
            let width = report
                .kill_tally
                .iter()
                .map(|k| k.name.len())
                .max()
                .unwrap_or(0)
                + 2;
            for kill in &report.kill_tally {
                let row = format!("{:<width$}{}", kill.name, kill.count, width = width);
                output.push_str(&format!("  {}\n", self.paint(&row, Tone::Critical)));
            }
        }

        if !report.histogram.is_empty() {
            output.push('\n');
            output.push_str(&self.paint("Occurrences by hour:", Tone::Header));
            output.push('\n');
            output.push_str(&format!(
                "  {}\n",
                self.paint(&format!("{:<12}{:<7}{}", "DATE", "HOUR", "OCCURRENCES"), Tone::Header)
            ));
            for bucket in &report.histogram {
                let row = format!(
                    "{:<12}{:<7}{}",
                    bucket.hour.format("%a %b %d").to_string(),
                    bucket.hour.format("%H:00").to_string(),
                    bucket.count
                );
                output.push_str(&format!("  {}\n", self.paint(&row, Tone::Notice)));
            }
            if report.unplaced > 0 {
                output.push_str(&format!(
                    "  {}\n",
                    self.paint(
                        &format!("{} without a wall-clock time", report.unplaced),
                        Tone::Dim
                    )
                ));
            }
        }

        output.push('\n');
        output
    }

    /// One incident: time, victims and its top consumers
    pub fn incident_detail(&self, record: &IncidentRecord) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{}{}\n",
            self.paint("OOM Incident: ", Tone::Warning),
            self.paint(&record.incident_number.to_string(), Tone::Notice)
        ));
        output.push_str(&self.label(
            "Start Time: ",
            &display_or_unresolved(record.start_time.as_ref()),
            Tone::Notice,
        ));
        if let Some(ram_mb) = record.system_ram_mb {
            let origin = match record.ram_source {
                Some(RamSource::PagesRam) => " (from log)",
                Some(RamSource::CgroupLimit) => " (cgroup limit)",
                Some(RamSource::Fallback) | None => "",
            };
            output.push_str(&self.label(
                "System RAM: ",
                &format!("{} MB{}", ram_mb, origin),
                Tone::Notice,
            ));
        }
        output.push_str(&self.label(
            "Memory Used: ",
            &format!("{} MB", record.total_mb),
            Tone::Notice,
        ));

        output.push_str(&self.paint("The following processes were killed:", Tone::Header));
        output.push('\n');
        if record.killed.is_empty() {
            output.push_str(&format!("  {}\n", self.paint("(none logged)", Tone::Dim)));
        }
        for killed in &record.killed {
            output.push_str(&format!("  {}\n", self.paint(killed, Tone::Critical)));
        }

        let top = top_consumers(record, self.top_n);
        if !top.is_empty() {
            let name_width = top.iter().map(|c| c.name.len()).max().unwrap_or(0).max(7) + 2;
            let count_width = top
                .iter()
                .map(|c| c.count.to_string().len())
                .max()
                .unwrap_or(0)
                .max(5)
                + 2;

            output.push_str(&self.paint(
                &format!("Processes (showing top {} processes):", self.top_n),
                Tone::Header,
            ));
            output.push('\n');
            let header = format!(
                "{:<nw$}{:<cw$}{}",
                "PROCESS",
                "COUNT",
                "RSS (MB)",
                nw = name_width,
                cw = count_width
            );
            output.push_str(&format!("  {}\n", self.paint(&header, Tone::Header)));
            for consumer in &top {
                let row = format!(
                    "{:<nw$}{:<cw$}{} MB",
                    consumer.name,
                    consumer.count,
                    consumer.total_mb,
                    nw = name_width,
                    cw = count_width
                );
                output.push_str(&format!("  {}\n", self.paint(&row, Tone::Notice)));
            }
        }

        output.push('\n');
        output
    }

    pub fn quick_scan(&self, entries: &[QuickScanEntry]) -> String {
        let mut output = String::new();
        output.push_str(&self.spacer());
        output.push_str("\n\n");
        output.push_str(&self.paint("Performing a quick check...", Tone::Warning));
        output.push('\n');
        if entries.is_empty() {
            output.push_str("No readable log files found.\n");
        }
        for entry in entries {
            let tone = if entry.count > 0 { Tone::Critical } else { Tone::Ok };
            output.push_str(&format!(
                "{} {}\n",
                self.paint(&format!("File {}:", entry.source), Tone::Header),
                self.paint(&format!("{} OOM incidents", entry.count), tone)
            ));
        }
        output.push('\n');
        output.push_str(&self.spacer());
        output.push('\n');
        output
    }

    pub fn no_incidents(&self, source: &str) -> String {
        format!(
            "{}\n",
            self.paint(
                &format!("No OOM incidents found! The source {} has no OOM incidents.", source),
                Tone::Ok
            )
        )
    }

    pub fn empty_source(&self, source: &str) -> String {
        format!(
            "{}\n",
            self.paint(&format!("The source {} is empty, nothing to analyze.", source), Tone::Warning)
        )
    }

    /// Shown when the ring buffer holds more incidents than the file
    pub fn rotation_note(&self, file_count: usize, ring_count: usize) -> String {
        format!(
            "\n{}\n{}\n",
            self.paint(
                &format!(
                    "Note: dmesg reports {} OOM incidents but the log file only has {}.",
                    ring_count, file_count
                ),
                Tone::Warning
            ),
            self.paint(
                "The logs may have been rotated; run with --quick to check rotated files.",
                Tone::Warning
            )
        )
    }
}
