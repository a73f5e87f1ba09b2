//! oomctl - Out Of Memory Analyzer CLI
//!
//! Library half of the binary so the integration tests can reach the
//! argument parser and command logic.

pub mod cli;
pub mod commands;
pub mod logging;
