//! CLI entry point for `initfs_info`

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use initfs::info;

/// Lists the directory tree of an initfs image
#[derive(Parser, Debug)]
#[command(name = "initfs_info", version)]
struct Cli {
    /// Image file to inspect
    image: PathBuf,

    /// Trace every flash read
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match info::run_info(&args.image, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // listing lines already printed stay on stdout, the tag follows them
            let _ = writeln!(out, "{}", e);
            ExitCode::FAILURE
        }
    }
}
