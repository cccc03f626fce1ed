//! Command-line interface for reviewflow.
//!
//! Provides the worker loop, event submission, and the status probe.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
