//! oomctl - Out Of Memory Analyzer
//!
//! Scans kernel logs for OOM-killer incidents and reports on them.

use clap::Parser;
use oomctl::cli::Cli;
use oomctl::{commands, logging};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    match commands::run(&cli) {
        Ok(output) => {
            // Ignored: the reader may have closed the pipe early
            let _ = std::io::stdout().lock().write_all(output.as_bytes());
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(commands::exit_code(&err));
        }
    }
}
