//! DICOM transfer syntax conversion CLI.
//!
//! Exits with status 1 when any conversion fails.

use clap::Parser;
use medimg_transcode::cli::{run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        // already logged by `run`
        Err(_) => ExitCode::FAILURE,
    }
}
