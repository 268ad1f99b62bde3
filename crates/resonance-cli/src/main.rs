//! # resonance CLI
//!
//! Command-line interface for the Resonance audio similarity engine.
//!
//! This binary provides human-friendly access to `resonance-core` functionality.
//! Run `resonance --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
