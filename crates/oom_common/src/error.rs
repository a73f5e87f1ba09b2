//! Error types for OOM Atlas.
//!
//! Only source acquisition fails hard. Anything that goes wrong while reading
//! individual lines is absorbed by the parser and never shows up here.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OomError {
    #[error("File {} does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    #[error(
        "File {} is larger than {limit_mb}MB ({size_mb}MB), use --override to scan it anyway",
        path.display()
    )]
    SourceTooLarge {
        path: PathBuf,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("Unsupported log source: {0}")]
    UnsupportedSource(String),

    #[error("Unable to find a log file for this operating system, please specify one with --file")]
    NoDefaultLog,

    #[error("Config error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OomError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            OomError::SourceNotFound { .. } => 66,
            OomError::SourceTooLarge { .. } => 65,
            OomError::UnsupportedSource(_) => 69,
            OomError::NoDefaultLog => 66,
            OomError::Config { .. } => 78,
            OomError::Io(_) => 74,
        }
    }
}

pub type Result<T> = std::result::Result<T, OomError>;
