//! Quick scan: header counts across a log and its rotated siblings.

use crate::error::{OomError, Result};
use crate::parser::is_incident_start;
use crate::source::LogSource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickScanEntry {
    pub source: String,
    pub count: usize,
}

/// Every file next to `path` whose name starts with its base name, sorted
pub fn discover_rotated(path: &Path) -> Result<Vec<PathBuf>> {
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| OomError::SourceNotFound {
            path: path.to_path_buf(),
        })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OomError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => OomError::Io(e),
    })?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(base))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    found.sort();

    debug!(base, files = found.len(), "rotated logs discovered");
    Ok(found)
}

/// Number of process-table headers in a source, without building records
pub fn count_incident_starts(source: &LogSource) -> Result<usize> {
    let stream = source.open()?;
    Ok(stream.filter(|line| is_incident_start(line)).count())
}

/// Header counts for each file. Unreadable files are logged and left out.
pub fn quick_scan(paths: &[PathBuf]) -> Vec<QuickScanEntry> {
    paths
        .iter()
        .filter_map(|path| {
            let source = LogSource::File(path.clone());
            match count_incident_starts(&source) {
                Ok(count) => Some(QuickScanEntry {
                    source: source.display_name(),
                    count,
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping log in quick scan");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const HEADER: &str = "Apr 12 10:23:56 web1 kernel: [ pid ]   uid  tgid total_vm      rss cpu oom_adj oom_score_adj name";
    const ROW: &str = "Apr 12 10:23:56 web1 kernel: [ 1060]     0  1060     2767       22   0     -17         -1000 udevd";
    const KILL: &str = "Apr 12 10:23:59 web1 kernel: Killed process 1060, UID 0, (udevd) total-vm:11068kB";

    #[test]
    fn test_discover_rotated_siblings() {
        let dir = TempDir::new().unwrap();
        for name in ["messages", "messages.1", "messages-20230401.gz", "secure", "cron.1"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("messages.d")).unwrap();

        let found = discover_rotated(&dir.path().join("messages")).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["messages", "messages-20230401.gz", "messages.1"]);
    }

    #[test]
    fn test_counts_headers_even_when_truncated() {
        let dir = TempDir::new().unwrap();
        let current = dir.path().join("messages");
        let rotated = dir.path().join("messages.1.gz");

        // Second incident is cut off after its header
        let current_log = [HEADER, ROW, KILL, HEADER].join("\n");
        std::fs::write(&current, current_log).unwrap();

        let mut encoder = GzEncoder::new(
            std::fs::File::create(&rotated).unwrap(),
            Compression::default(),
        );
        encoder
            .write_all([HEADER, ROW, KILL, HEADER, ROW, HEADER].join("\n").as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let entries = quick_scan(&discover_rotated(&current).unwrap());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, current.display().to_string());
        assert_eq!(entries[0].count, 2);
        assert_eq!(entries[1].count, 3);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("messages");
        std::fs::write(&present, HEADER).unwrap();

        let entries = quick_scan(&[dir.path().join("gone"), present]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].count, 1);
    }

    #[test]
    fn test_missing_directory() {
        assert!(discover_rotated(Path::new("/nonexistent/oomctl/messages")).is_err());
    }
}
