//! Log sources - where kernel lines come from.
//!
//! A source is opened into a [`LineStream`], a plain iterator of lines with
//! trailing newlines removed. Gzip files are decompressed on the fly and
//! subprocess output is read as it is produced.

use crate::error::{OomError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

/// `journalctl` arguments for kernel messages of the current boot
pub const JOURNAL_ARGS: &[&str] = &["-k", "-b", "--no-pager", "-o", "short-iso-precise", "-q"];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Where to read kernel messages from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// A log file, gzip-compressed when it ends in `.gz`
    File(PathBuf),
    /// The kernel ring buffer via `dmesg`
    RingBuffer,
    /// The systemd journal via `journalctl -k -b`
    Journal,
}

impl LogSource {
    /// Identifier shown in reports
    pub fn display_name(&self) -> String {
        match self {
            LogSource::File(path) => path.display().to_string(),
            LogSource::RingBuffer => "dmesg".to_string(),
            LogSource::Journal => "journalctl -k -b".to_string(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, LogSource::File(_))
    }

    /// Refuse files above `limit_mb`. Subprocess sources always pass.
    pub fn check_size(&self, limit_mb: u64) -> Result<()> {
        let LogSource::File(path) = self else {
            return Ok(());
        };
        let len = file_metadata(path)?.len();
        if len > limit_mb.saturating_mul(BYTES_PER_MB) {
            return Err(OomError::SourceTooLarge {
                path: path.clone(),
                size_mb: len / BYTES_PER_MB,
                limit_mb,
            });
        }
        Ok(())
    }

    /// Open the source for reading
    pub fn open(&self) -> Result<LineStream> {
        match self {
            LogSource::File(path) => open_file(path),
            LogSource::RingBuffer => spawn_command("dmesg", &[]),
            LogSource::Journal => spawn_command("journalctl", JOURNAL_ARGS),
        }
    }
}

/// Lines of one opened source
pub struct LineStream {
    reader: Box<dyn BufRead + Send>,
    child: Option<Child>,
    label: String,
    buf: Vec<u8>,
    read_errors: usize,
    done: bool,
}

impl LineStream {
    fn new(reader: Box<dyn BufRead + Send>, child: Option<Child>, label: String) -> Self {
        Self {
            reader,
            child,
            label,
            buf: Vec::new(),
            read_errors: 0,
            done: false,
        }
    }

    /// Read errors that cut the stream short (0 or 1)
    pub fn read_errors(&self) -> usize {
        self.read_errors
    }

    fn reap(&mut self, terminate: bool) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if terminate {
            // Ignored: the child may already have exited
            let _ = child.kill();
        }
        match child.wait() {
            Ok(status) if !status.success() && !terminate => {
                debug!(source = %self.label, %status, "log command exited unsuccessfully");
            }
            Ok(_) => {}
            Err(e) => warn!(source = %self.label, error = %e, "failed to wait for log command"),
        }
    }
}

impl Iterator for LineStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                self.reap(false);
                None
            }
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(String::from_utf8_lossy(&self.buf).into_owned())
            }
            Err(e) => {
                warn!(source = %self.label, error = %e, "read error, stopping early");
                self.read_errors += 1;
                self.done = true;
                self.reap(true);
                None
            }
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        self.reap(true);
    }
}

/// True when `program` resolves to a file somewhere on `PATH`
pub fn command_available(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

fn file_metadata(path: &Path) -> Result<std::fs::Metadata> {
    std::fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => OomError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => OomError::Io(e),
    })
}

fn open_file(path: &Path) -> Result<LineStream> {
    if !file_metadata(path)?.is_file() {
        return Err(OomError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path)?;
    let label = path.display().to_string();
    let reader: Box<dyn BufRead + Send> = if is_gzip(path) {
        debug!(path = %label, "reading gzip-compressed log");
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(LineStream::new(reader, None, label))
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn spawn_command(program: &str, args: &[&str]) -> Result<LineStream> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                OomError::UnsupportedSource(format!("{} is not installed", program))
            }
            _ => OomError::Io(e),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| OomError::UnsupportedSource(format!("{} produced no output pipe", program)))?;

    debug!(program, ?args, "streaming log command output");
    let label = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(LineStream::new(
        Box::new(BufReader::new(stdout)),
        Some(child),
        label,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_plain_file_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, "one\r\ntwo\n\nthree").unwrap();

        let lines: Vec<String> = LogSource::File(path).open().unwrap().collect();
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }

    #[test]
    fn test_gzip_file_matches_plain() {
        let dir = TempDir::new().unwrap();
        let content = "alpha\nbeta\n";
        let plain = dir.path().join("messages");
        let gz = dir.path().join("messages.1.gz");
        std::fs::write(&plain, content).unwrap();

        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let a: Vec<String> = LogSource::File(plain).open().unwrap().collect();
        let b: Vec<String> = LogSource::File(gz).open().unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, b"ok \xff\xfe line\n").unwrap();

        let lines: Vec<String> = LogSource::File(path).open().unwrap().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].ends_with(" line"));
    }

    #[test]
    fn test_missing_file() {
        let err = LogSource::File(PathBuf::from("/nonexistent/oomctl/messages"))
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, OomError::SourceNotFound { .. }));
    }

    #[test]
    fn test_directory_is_not_a_log() {
        let dir = TempDir::new().unwrap();
        let err = LogSource::File(dir.path().to_path_buf())
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, OomError::SourceNotFound { .. }));
    }

    #[test]
    fn test_size_guard() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages");
        std::fs::write(&path, "x\n").unwrap();

        let source = LogSource::File(path);
        assert!(source.check_size(300).is_ok());
        assert!(matches!(
            source.check_size(0),
            Err(OomError::SourceTooLarge { limit_mb: 0, .. })
        ));
        assert!(LogSource::RingBuffer.check_size(0).is_ok());
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let err = spawn_command("oomctl-no-such-binary", &[]).err().unwrap();
        assert!(matches!(err, OomError::UnsupportedSource(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_streams() {
        let lines: Vec<String> = spawn_command("printf", &["a\\nb\\n"]).unwrap().collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(LogSource::RingBuffer.display_name(), "dmesg");
        assert_eq!(LogSource::Journal.display_name(), "journalctl -k -b");
        assert_eq!(
            LogSource::File(PathBuf::from("/var/log/messages")).display_name(),
            "/var/log/messages"
        );
    }
}
