//! Cross-incident statistics.
//!
//! Aggregates always span every incident of a scan. The display window only
//! decides which incidents the renderer prints in detail.

use crate::incident::IncidentRecord;
use crate::parser::LogWindow;
use crate::scan::ScanResult;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Rows kept in a per-incident consumer table
pub const DEFAULT_TOP_N: usize = 10;

/// Incidents shown in detail unless told otherwise
pub const DEFAULT_SHOW: usize = 5;

/// One process name's share of an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerSummary {
    pub name: String,
    /// Number of table rows carrying this name
    pub count: usize,
    pub total_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillCount {
    pub name: String,
    pub count: usize,
}

/// Incidents sharing one calendar hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourBucket {
    pub hour: NaiveDateTime,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowCount {
    Count(usize),
    All,
}

/// Which incidents get detailed rendering, and in what order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayWindow {
    pub show: ShowCount,
    /// Most recent first
    pub reverse: bool,
}

impl Default for DisplayWindow {
    fn default() -> Self {
        Self {
            show: ShowCount::Count(DEFAULT_SHOW),
            reverse: false,
        }
    }
}

impl DisplayWindow {
    pub fn select<'a>(&self, records: &'a [IncidentRecord]) -> Vec<&'a IncidentRecord> {
        let limit = match self.show {
            ShowCount::Count(n) => n,
            ShowCount::All => records.len(),
        };
        if self.reverse {
            records.iter().rev().take(limit).collect()
        } else {
            records.iter().take(limit).collect()
        }
    }
}

/// Summary of a whole scan
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub source: String,
    pub lines_read: usize,
    pub window: LogWindow,
    pub incident_count: usize,
    pub kill_tally: Vec<KillCount>,
    /// `incident_number` of the largest incident
    pub largest_incident: Option<usize>,
    pub largest_total_mb: u64,
    pub display: DisplayWindow,
    /// `incident_number`s selected for detail, in display order
    pub displayed: Vec<usize>,
    pub largest_outside_window: bool,
    pub histogram: Vec<HourBucket>,
    /// Incidents whose time could not be placed on the histogram
    pub unplaced: usize,
}

impl AggregateReport {
    pub fn build(scan: &ScanResult, display: &DisplayWindow) -> Self {
        let records = &scan.incidents;
        let largest = largest_incident(records);
        let displayed: Vec<usize> = display
            .select(records)
            .iter()
            .map(|r| r.incident_number)
            .collect();
        let largest_outside_window = largest
            .map(|l| !displayed.contains(&l.incident_number))
            .unwrap_or(false);
        let histogram = occurrence_histogram(records);
        let placed: usize = histogram.iter().map(|b| b.count).sum();

        Self {
            source: scan.source.clone(),
            lines_read: scan.lines_read,
            window: scan.window.clone(),
            incident_count: records.len(),
            kill_tally: kill_tally(records),
            largest_incident: largest.map(|r| r.incident_number),
            largest_total_mb: largest.map(|r| r.total_mb).unwrap_or(0),
            display: *display,
            displayed,
            largest_outside_window,
            histogram,
            unplaced: records.len() - placed,
        }
    }

    /// Records selected for detail, resolved against the scan they came from
    pub fn displayed_records<'a>(&self, scan: &'a ScanResult) -> Vec<&'a IncidentRecord> {
        self.displayed
            .iter()
            .filter_map(|n| find_incident(&scan.incidents, *n))
            .collect()
    }

    pub fn largest_record<'a>(&self, scan: &'a ScanResult) -> Option<&'a IncidentRecord> {
        self.largest_incident
            .and_then(|n| find_incident(&scan.incidents, n))
    }

    /// True when more incidents exist than were shown
    pub fn is_truncated(&self) -> bool {
        self.displayed.len() < self.incident_count
    }
}

/// Group rows by name, largest summed RSS first. Ties keep first-seen order.
pub fn top_consumers(record: &IncidentRecord, n: usize) -> Vec<ConsumerSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut grouped: Vec<ConsumerSummary> = Vec::new();

    for process in &record.processes {
        match index.get(process.name.as_str()) {
            Some(&i) => {
                grouped[i].count += 1;
                grouped[i].total_mb += process.rss_mb;
            }
            None => {
                index.insert(process.name.as_str(), grouped.len());
                grouped.push(ConsumerSummary {
                    name: process.name.clone(),
                    count: 1,
                    total_mb: process.rss_mb,
                });
            }
        }
    }

    grouped.sort_by(|a, b| b.total_mb.cmp(&a.total_mb));
    grouped.truncate(n);
    grouped
}

/// Max `total_mb`; the earliest incident wins a tie
pub fn largest_incident(records: &[IncidentRecord]) -> Option<&IncidentRecord> {
    records.iter().fold(None, |best: Option<&IncidentRecord>, r| match best {
        Some(b) if b.total_mb >= r.total_mb => Some(b),
        _ => Some(r),
    })
}

/// Kill count per process name across all incidents, most killed first
pub fn kill_tally(records: &[IncidentRecord]) -> Vec<KillCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut tally: Vec<KillCount> = Vec::new();

    for name in records.iter().flat_map(|r| r.killed.iter()) {
        match index.get(name.as_str()) {
            Some(&i) => tally[i].count += 1,
            None => {
                index.insert(name.as_str(), tally.len());
                tally.push(KillCount {
                    name: name.clone(),
                    count: 1,
                });
            }
        }
    }

    tally.sort_by(|a, b| b.count.cmp(&a.count));
    tally
}

/// Incidents per calendar hour, oldest first. Uptime and unresolved stamps are left out.
pub fn occurrence_histogram(records: &[IncidentRecord]) -> Vec<HourBucket> {
    let mut buckets: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
    for hour in records
        .iter()
        .filter_map(|r| r.start_time.as_ref().and_then(|t| t.date_hour()))
    {
        *buckets.entry(hour).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(hour, count)| HourBucket { hour, count })
        .collect()
}

fn find_incident(records: &[IncidentRecord], number: usize) -> Option<&IncidentRecord> {
    records
        .get(number.wrapping_sub(1))
        .filter(|r| r.incident_number == number)
        .or_else(|| records.iter().find(|r| r.incident_number == number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::ProcessEntry;
    use crate::parser::ParseStats;
    use crate::timestamp::LogTime;
    use chrono::NaiveDate;

    fn entry(name: &str, rss_mb: u64) -> ProcessEntry {
        ProcessEntry {
            pid: None,
            name: name.to_string(),
            rss_pages: rss_mb * 256,
            rss_mb,
        }
    }

    fn record(n: usize, rows: &[(&str, u64)], killed: &[&str]) -> IncidentRecord {
        let mut r = IncidentRecord::new(n, None);
        for (name, mb) in rows {
            r.push_process(entry(name, *mb));
        }
        r.killed = killed.iter().map(|k| k.to_string()).collect();
        r
    }

    fn scan_of(incidents: Vec<IncidentRecord>) -> ScanResult {
        ScanResult {
            source: "/var/log/messages".to_string(),
            incidents,
            window: LogWindow::default(),
            lines_read: 100,
            stats: ParseStats::default(),
            truncated: false,
        }
    }

    #[test]
    fn test_top_consumers_grouping() {
        let r = record(1, &[("A", 100), ("A", 50), ("B", 30)], &[]);
        let top = top_consumers(&r, DEFAULT_TOP_N);
        assert_eq!(
            top,
            vec![
                ConsumerSummary {
                    name: "A".to_string(),
                    count: 2,
                    total_mb: 150
                },
                ConsumerSummary {
                    name: "B".to_string(),
                    count: 1,
                    total_mb: 30
                },
            ]
        );
    }

    #[test]
    fn test_top_consumers_tie_keeps_first_seen() {
        let r = record(1, &[("late", 10), ("early", 10), ("big", 99)], &[]);
        let names: Vec<String> = top_consumers(&r, 2).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["big", "late"]);
    }

    #[test]
    fn test_kill_tally_counts_every_kill() {
        let records = vec![
            record(1, &[], &["mysqld"]),
            record(2, &[], &["httpd", "httpd"]),
            record(3, &[], &["httpd"]),
        ];
        let tally = kill_tally(&records);
        assert_eq!(tally[0].name, "httpd");
        assert_eq!(tally[0].count, 3);
        assert_eq!(tally[1].name, "mysqld");
        assert_eq!(tally[1].count, 1);
    }

    #[test]
    fn test_largest_regardless_of_window() {
        let records = vec![
            record(1, &[("a", 10)], &["a"]),
            record(2, &[("b", 500)], &["b"]),
            record(3, &[("c", 20)], &["c"]),
        ];
        assert_eq!(largest_incident(&records).unwrap().incident_number, 2);

        let scan = scan_of(records);
        let display = DisplayWindow {
            show: ShowCount::Count(1),
            reverse: false,
        };
        let report = AggregateReport::build(&scan, &display);
        assert_eq!(report.largest_incident, Some(2));
        assert_eq!(report.largest_total_mb, 500);
        assert_eq!(report.displayed, vec![1]);
        assert!(report.largest_outside_window);
        assert_eq!(report.largest_record(&scan).unwrap().total_mb, 500);
    }

    #[test]
    fn test_largest_tie_first_wins() {
        let records = vec![record(1, &[("a", 50)], &[]), record(2, &[("b", 50)], &[])];
        assert_eq!(largest_incident(&records).unwrap().incident_number, 1);
        assert!(largest_incident(&[]).is_none());
    }

    #[test]
    fn test_display_window() {
        let records: Vec<IncidentRecord> = (1..=7).map(|n| record(n, &[], &[])).collect();
        let numbers = |w: DisplayWindow| -> Vec<usize> {
            w.select(&records).iter().map(|r| r.incident_number).collect()
        };

        assert_eq!(numbers(DisplayWindow::default()), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            numbers(DisplayWindow {
                show: ShowCount::Count(3),
                reverse: true
            }),
            vec![7, 6, 5]
        );
        assert_eq!(
            numbers(DisplayWindow {
                show: ShowCount::All,
                reverse: false
            })
            .len(),
            7
        );
    }

    #[test]
    fn test_window_does_not_change_aggregates() {
        let records = vec![
            record(1, &[("a", 10)], &["a"]),
            record(2, &[("b", 20)], &["b"]),
        ];
        let scan = scan_of(records);
        let narrow = AggregateReport::build(
            &scan,
            &DisplayWindow {
                show: ShowCount::Count(0),
                reverse: false,
            },
        );
        let wide = AggregateReport::build(
            &scan,
            &DisplayWindow {
                show: ShowCount::All,
                reverse: false,
            },
        );
        assert_eq!(narrow.kill_tally, wide.kill_tally);
        assert_eq!(narrow.incident_count, wide.incident_count);
        assert!(narrow.is_truncated());
        assert!(!wide.is_truncated());
        assert!(!wide.largest_outside_window);
    }

    #[test]
    fn test_histogram_groups_by_hour() {
        let at = |h: u32, m: u32| {
            Some(LogTime::Local(
                NaiveDate::from_ymd_opt(2023, 4, 12)
                    .unwrap()
                    .and_hms_opt(h, m, 0)
                    .unwrap(),
            ))
        };
        let mut records = vec![
            IncidentRecord::new(1, at(10, 5)),
            IncidentRecord::new(2, at(10, 55)),
            IncidentRecord::new(3, at(11, 0)),
            IncidentRecord::new(4, Some(LogTime::Uptime(12.0))),
        ];
        records.push(IncidentRecord::new(5, None));

        let histogram = occurrence_histogram(&records);
        assert_eq!(histogram.len(), 2);
        assert_eq!(histogram[0].count, 2);
        assert_eq!(histogram[1].count, 1);

        let report = AggregateReport::build(&scan_of(records), &DisplayWindow::default());
        assert_eq!(report.unplaced, 2);
    }

    #[test]
    fn test_empty_report() {
        let report = AggregateReport::build(&scan_of(Vec::new()), &DisplayWindow::default());
        assert_eq!(report.incident_count, 0);
        assert!(report.kill_tally.is_empty());
        assert_eq!(report.largest_incident, None);
        assert!(!report.largest_outside_window);
    }
}
