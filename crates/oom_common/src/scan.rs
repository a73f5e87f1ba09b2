//! One-shot scan of a log source.

use crate::error::Result;
use crate::incident::IncidentRecord;
use crate::parser::{Incidents, LogWindow, ParseStats, ParserConfig};
use crate::source::LogSource;
use serde::Serialize;
use tracing::info;

/// Default size guard for file sources (300 MiB)
pub const DEFAULT_MAX_SOURCE_MB: u64 = 300;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Size guard in MB, `None` when overridden
    pub max_source_mb: Option<u64>,
    pub parser: ParserConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_source_mb: Some(DEFAULT_MAX_SOURCE_MB),
            parser: ParserConfig::default(),
        }
    }
}

/// Result of scanning one source
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub source: String,
    pub incidents: Vec<IncidentRecord>,
    pub window: LogWindow,
    pub lines_read: usize,
    pub stats: ParseStats,
    /// Set when a read error ended the stream early
    pub truncated: bool,
}

impl ScanResult {
    pub fn is_empty_source(&self) -> bool {
        self.lines_read == 0
    }
}

/// Open `source`, parse it, and collect every incident
pub fn scan(source: &LogSource, options: &ScanOptions) -> Result<ScanResult> {
    if let Some(limit) = options.max_source_mb {
        source.check_size(limit)?;
    }

    let mut stream = source.open()?;
    let mut incidents = Incidents::new(stream.by_ref(), options.parser.clone());
    let records: Vec<IncidentRecord> = incidents.by_ref().collect();
    let window = incidents.parser().window();
    let stats = incidents.parser().stats().clone();
    drop(incidents);

    let result = ScanResult {
        source: source.display_name(),
        lines_read: stats.lines_read,
        incidents: records,
        window,
        stats,
        truncated: stream.read_errors() > 0,
    };

    info!(
        source = %result.source,
        lines = result.lines_read,
        incidents = result.incidents.len(),
        "scan complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OomError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const LOG: &str = "\
Apr 12 10:23:50 web1 kernel: [668192.300000] httpd invoked oom-killer: gfp_mask=0x201da, order=0, oom_adj=0, oom_score_adj=0
Apr 12 10:23:56 web1 kernel: [668192.306121] [ pid ]   uid  tgid total_vm      rss cpu oom_adj oom_score_adj name
Apr 12 10:23:56 web1 kernel: [668192.306910] [ 1060]     0  1060     2767       22   0     -17         -1000 udevd
Apr 12 10:23:56 web1 kernel: [668192.307000] [62185]    48 62185   183182    49729   9       0             0 httpd
Apr 12 10:23:59 web1 kernel: [668192.383737] Out of memory: Kill process 62185 (httpd) score 5 or sacrifice child
Apr 12 10:23:59 web1 kernel: [668192.383946] Killed process 62185, UID 48, (httpd) total-vm:732728kB, anon-rss:198916kB, file-rss:2288kB
";

    fn options() -> ScanOptions {
        ScanOptions {
            parser: ParserConfig {
                reference_year: 2023,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, LOG).unwrap();

        let result = scan(&LogSource::File(path.clone()), &options()).unwrap();
        assert_eq!(result.source, path.display().to_string());
        assert_eq!(result.lines_read, 6);
        assert_eq!(result.incidents.len(), 1);
        assert_eq!(result.incidents[0].killed, vec!["httpd".to_string()]);
        assert_eq!(result.incidents[0].total_mb, 194);
        assert!(!result.truncated);
    }

    #[test]
    fn test_empty_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, "").unwrap();

        let result = scan(&LogSource::File(path), &options()).unwrap();
        assert!(result.is_empty_source());
        assert!(result.incidents.is_empty());
        assert_eq!(result.window, LogWindow::default());
    }

    #[test]
    fn test_size_guard_and_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, LOG).unwrap();
        let source = LogSource::File(path);

        let guarded = ScanOptions {
            max_source_mb: Some(0),
            ..options()
        };
        assert!(matches!(
            scan(&source, &guarded),
            Err(OomError::SourceTooLarge { .. })
        ));

        let overridden = ScanOptions {
            max_source_mb: None,
            ..options()
        };
        assert_eq!(scan(&source, &overridden).unwrap().incidents.len(), 1);
    }

    #[test]
    fn test_missing_source() {
        let source = LogSource::File(PathBuf::from("/nonexistent/messages"));
        assert!(matches!(
            scan(&source, &options()),
            Err(OomError::SourceNotFound { .. })
        ));
    }
}
