//! Incident parser - single forward pass over kernel log lines.
//!
//! Each incident moves through three states:
//!
//! - `Idle`: nothing open, only a process-table header matters
//! - `Collecting`: rows accumulate until an end-of-table marker or kill line
//! - `Collected`: only "Killed process" lines are examined
//!
//! A new header always closes whatever record is open. The open record is
//! held as "current" until superseded or the stream ends.
//!
//! RAM figures found in the Mem-Info preamble ("N pages RAM") or in a cgroup
//! usage line are parked and handed to the next record whose table closes.

use crate::incident::{IncidentRecord, ProcessEntry, RamSource};
use crate::timestamp::{current_year, detect_format, extract_timestamp, LogTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Kernel RSS unit in these log formats
pub const DEFAULT_PAGE_SIZE_KB: u64 = 4;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex must compile"))
        }
    };
}

static_regex!(header_re, r"\[\s*pid\s*\]\s+uid\s+tgid\s+total_vm\s+rss\b");
static_regex!(
    syslog_prefix_re,
    r"^[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\S+\s+([^\s:\[]+)(?:\[\d+\])?:(?:\s+|$)"
);
static_regex!(
    journal_prefix_re,
    r"^\d{4}-\d{2}-\d{2}T\S+\s+\S+\s+([^\s:\[]+)(?:\[\d+\])?:(?:\s+|$)"
);
static_regex!(row_re, r"^\[?\s*\d+\s*\]?(?:\s+-?\d+){3,}\s+\S");
static_regex!(
    killed_re,
    r"(?i)killed process \d+(?:, uid \d+)?, \(([^)]+)\)|killed process \d+ \(([^)]+)\)"
);
static_regex!(pages_ram_re, r"(\d+) pages RAM");
static_regex!(cgroup_limit_re, r"memory: usage \d+kB, limit (\d+)kB");

/// Parser state for the open incident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    Collecting,
    Collected,
}

/// Tunables for one parse
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Size of one RSS unit in kB
    pub page_size_kb: u64,
    /// Year assumed for year-less syslog stamps
    pub reference_year: i32,
    /// RAM used when the log itself carries none
    pub fallback_ram_mb: Option<u64>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            page_size_kb: DEFAULT_PAGE_SIZE_KB,
            reference_year: current_year(),
            fallback_ram_mb: None,
        }
    }
}

/// Span of time covered by the scanned lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogWindow {
    pub start_time: Option<LogTime>,
    pub end_time: Option<LogTime>,
}

/// Counters for what the parser saw and skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub lines_read: usize,
    pub headers: usize,
    /// Headers carried by a non-kernel syslog tag
    pub headers_rejected: usize,
    pub rows_accepted: usize,
    pub rows_skipped: usize,
    pub kill_lines: usize,
}

/// Everything a full parse produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedLog {
    pub incidents: Vec<IncidentRecord>,
    pub window: LogWindow,
    pub stats: ParseStats,
}

/// Column layout learned from the most recent header
#[derive(Debug, Clone, Copy)]
struct TableLayout {
    /// Offset of `rss` from `pid` in a bracket-stripped row
    rss_offset: usize,
    /// Number of header columns, the minimum width of a valid row
    width: usize,
}

/// Line split into origin tag and message body
struct LineParts<'a> {
    tag: Option<&'a str>,
    body: &'a str,
}

impl LineParts<'_> {
    fn is_kernel_origin(&self) -> bool {
        match self.tag {
            Some(tag) => tag.eq_ignore_ascii_case("kernel"),
            None => true,
        }
    }
}

/// Streaming OOM incident parser. One instance per scan.
#[derive(Debug)]
pub struct IncidentParser {
    config: ParserConfig,
    state: ParseState,
    current: Option<IncidentRecord>,
    layout: Option<TableLayout>,
    counter: usize,
    pending_ram: Option<(u64, RamSource)>,
    window_start: Option<LogTime>,
    seen_first_line: bool,
    last_line: String,
    stats: ParseStats,
}

impl IncidentParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            state: ParseState::Idle,
            current: None,
            layout: None,
            counter: 0,
            pending_ram: None,
            window_start: None,
            seen_first_line: false,
            last_line: String::new(),
            stats: ParseStats::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Feed one line. Returns the previous record when this line's header closed it.
    pub fn feed(&mut self, line: &str) -> Option<IncidentRecord> {
        self.stats.lines_read += 1;
        self.track_window(line);

        let closed = self.advance(line);

        // After the state step, so a preamble never lands on the incident before it
        self.capture_ram(line);

        closed
    }

    /// Close the parse, returning the trailing open record if any
    pub fn finish(&mut self) -> Option<IncidentRecord> {
        let record = self.current.take()?;
        let was_collecting = self.state == ParseState::Collecting;
        self.state = ParseState::Idle;
        Some(self.finalize(record, was_collecting))
    }

    /// First and last line timestamps seen so far
    pub fn window(&self) -> LogWindow {
        LogWindow {
            start_time: self.window_start,
            end_time: if self.last_line.is_empty() {
                None
            } else {
                extract_timestamp(&self.last_line, self.config.reference_year)
            },
        }
    }

    fn track_window(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if !self.seen_first_line {
            self.seen_first_line = true;
            self.window_start = extract_timestamp(line, self.config.reference_year);
            debug!(
                format = detect_format(line, self.config.reference_year).unwrap_or("unknown"),
                "log dialect of first line"
            );
        }
        self.last_line.clear();
        self.last_line.push_str(line);
    }

    fn advance(&mut self, line: &str) -> Option<IncidentRecord> {
        if let Some(layout) = self.match_header(line) {
            return self.open_incident(line, layout);
        }

        match self.state {
            ParseState::Idle => None,
            ParseState::Collecting => {
                self.collect(line);
                None
            }
            ParseState::Collected => {
                if let Some(name) = parse_killed_process(line) {
                    self.record_kill(name);
                }
                None
            }
        }
    }

    fn match_header(&mut self, line: &str) -> Option<TableLayout> {
        let found = header_re().find(line)?;
        if !split_line(line).is_kernel_origin() {
            self.stats.headers_rejected += 1;
            trace!(line, "ignoring process-table header from non-kernel source");
            return None;
        }

        let columns = strip_brackets(&line[found.start()..]);
        let columns: Vec<&str> = columns.split_whitespace().collect();
        let pid_idx = columns.iter().position(|c| *c == "pid")?;
        let rss_idx = columns.iter().position(|c| *c == "rss")?;

        Some(TableLayout {
            rss_offset: rss_idx.checked_sub(pid_idx)?,
            width: columns.len() - pid_idx,
        })
    }

    fn open_incident(&mut self, line: &str, layout: TableLayout) -> Option<IncidentRecord> {
        let closed = self
            .current
            .take()
            .map(|record| self.finalize(record, false));

        self.counter += 1;
        self.stats.headers += 1;
        let start_time = extract_timestamp(line, self.config.reference_year);
        debug!(
            incident = self.counter,
            rss_offset = layout.rss_offset,
            width = layout.width,
            "process table header"
        );

        self.current = Some(IncidentRecord::new(self.counter, start_time));
        self.layout = Some(layout);
        self.state = ParseState::Collecting;

        closed
    }

    fn collect(&mut self, line: &str) {
        if let Some(name) = parse_killed_process(line) {
            self.close_table();
            self.record_kill(name);
            return;
        }

        let parts = split_line(line);
        let width = self.layout.map(|l| l.width).unwrap_or(0);
        if row_re().is_match(parts.body) {
            if strip_brackets(parts.body).split_whitespace().count() < width {
                self.stats.rows_skipped += 1;
                if parts.is_kernel_origin() {
                    trace!(line, "truncated process row ends the process table");
                    self.close_table();
                }
                return;
            }
            self.collect_row(line, parts.body);
            return;
        }

        if is_end_of_table(line) {
            self.close_table();
            return;
        }

        if parts.is_kernel_origin() && parts.body.split_whitespace().count() < width {
            trace!(line, "short kernel line ends the process table");
            self.close_table();
        }
    }

    fn collect_row(&mut self, line: &str, body: &str) {
        let Some(layout) = self.layout else {
            return;
        };

        match parse_process_row(body, layout, self.config.page_size_kb) {
            Some(entry) => {
                self.stats.rows_accepted += 1;
                if let Some(record) = self.current.as_mut() {
                    record.push_process(entry);
                }
            }
            None => {
                self.stats.rows_skipped += 1;
                trace!(line, "skipping malformed process row");
            }
        }
    }

    fn close_table(&mut self) {
        self.state = ParseState::Collected;
        if let (Some(record), Some((ram_mb, source))) = (self.current.as_mut(), self.pending_ram) {
            record.attribute_ram(ram_mb, source);
            self.pending_ram = None;
        }
        if let Some(record) = &self.current {
            debug!(
                incident = record.incident_number,
                rows = record.processes.len(),
                total_mb = record.total_mb,
                "process table closed"
            );
        }
    }

    fn record_kill(&mut self, name: String) {
        self.stats.kill_lines += 1;
        if let Some(record) = self.current.as_mut() {
            debug!(incident = record.incident_number, killed = %name, "killed process");
            record.killed.push(name);
        }
    }

    fn capture_ram(&mut self, line: &str) {
        if !line.contains("pages RAM") && !line.contains("memory: usage") {
            return;
        }
        if let Some(caps) = pages_ram_re().captures(line) {
            if let Ok(pages) = caps[1].parse::<u64>() {
                let ram_mb = pages.saturating_mul(self.config.page_size_kb) / 1024;
                self.pending_ram = Some((ram_mb, RamSource::PagesRam));
            }
        } else if let Some(caps) = cgroup_limit_re().captures(line) {
            if let Ok(limit_kb) = caps[1].parse::<u64>() {
                self.pending_ram = Some((limit_kb / 1024, RamSource::CgroupLimit));
            }
        }
    }

    fn finalize(&mut self, mut record: IncidentRecord, claim_pending: bool) -> IncidentRecord {
        if claim_pending {
            if let Some((ram_mb, source)) = self.pending_ram.take() {
                record.attribute_ram(ram_mb, source);
            }
        }
        if let Some(ram_mb) = self.config.fallback_ram_mb {
            record.attribute_ram(ram_mb, RamSource::Fallback);
        }
        record
    }
}

/// Iterator adapter yielding each incident as soon as it is closed
pub struct Incidents<I> {
    lines: I,
    parser: IncidentParser,
    done: bool,
}

impl<I, S> Incidents<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    pub fn new(lines: I, config: ParserConfig) -> Self {
        Self {
            lines,
            parser: IncidentParser::new(config),
            done: false,
        }
    }

    /// The underlying parser, for window and stats once iteration is over
    pub fn parser(&self) -> &IncidentParser {
        &self.parser
    }
}

impl<I, S> Iterator for Incidents<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = IncidentRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for line in self.lines.by_ref() {
            if let Some(record) = self.parser.feed(line.as_ref()) {
                return Some(record);
            }
        }
        self.done = true;
        self.parser.finish()
    }
}

/// Parse a whole line sequence
pub fn parse_lines<I, S>(lines: I, config: ParserConfig) -> ParsedLog
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut incidents = Incidents::new(lines.into_iter(), config);
    let records: Vec<IncidentRecord> = incidents.by_ref().collect();
    let parser = incidents.parser();

    ParsedLog {
        incidents: records,
        window: parser.window(),
        stats: parser.stats().clone(),
    }
}

/// True when the line carries a kernel process-table header
pub fn is_incident_start(line: &str) -> bool {
    header_re().is_match(line) && split_line(line).is_kernel_origin()
}

/// Process name from a "Killed process" line, in either kernel wording
pub fn parse_killed_process(line: &str) -> Option<String> {
    let caps = killed_re().captures(line)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
}

fn is_end_of_table(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("out of memory") || lower.contains("kill process") || lower.contains("oom-kill:")
}

fn parse_process_row(body: &str, layout: TableLayout, page_size_kb: u64) -> Option<ProcessEntry> {
    let stripped = strip_brackets(body);
    let fields: Vec<&str> = stripped.split_whitespace().collect();
    if fields.len() < layout.width || fields.len() <= layout.rss_offset + 1 {
        return None;
    }

    let rss_pages: u64 = fields[layout.rss_offset].parse().ok()?;
    let name = fields.last()?.to_string();
    Some(ProcessEntry {
        pid: fields[0].parse().ok(),
        name,
        rss_pages,
        rss_mb: rss_pages.saturating_mul(page_size_kb) / 1024,
    })
}

fn strip_brackets(s: &str) -> String {
    s.replace(['[', ']'], " ")
}

/// Split off the syslog/journal prefix and any printk clock bracket
fn split_line(line: &str) -> LineParts<'_> {
    let prefixed = syslog_prefix_re()
        .captures(line)
        .or_else(|| journal_prefix_re().captures(line));

    let (tag, rest) = match prefixed {
        Some(caps) => {
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (caps.get(1).map(|m| m.as_str()), &line[end..])
        }
        None => (None, line),
    };

    LineParts {
        tag,
        body: strip_clock(rest),
    }
}

/// Drop a leading "[668192.306121]" or "[Mon Feb  1 09:08:13 2021]" but keep "[ 1060]"
fn strip_clock(s: &str) -> &str {
    let trimmed = s.trim_start();
    if let Some(inner) = trimmed.strip_prefix('[') {
        if let Some(end) = inner.find(']') {
            let content = inner[..end].trim();
            let is_pid = !content.is_empty() && content.chars().all(|c| c.is_ascii_digit());
            if !is_pid && content != "pid" {
                return inner[end + 1..].trim_start();
            }
        }
    }
    trimmed
}
