//! CLI entry point for `mkfs_initfs`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use initfs::config::{self, ImageConfig};
use initfs::mkfs;

/// Builds a fresh initfs image populated from the layout's source files
#[derive(Parser, Debug)]
#[command(name = "mkfs_initfs", version)]
struct Cli {
    /// Image file to create; must not exist
    output: PathBuf,

    /// Layout overrides (`config.ini`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trace every flash read, program and erase
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None)
        .format_target(false)
        .init();
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
    init_logging(args.verbose);

    let cfg = match &args.config {
        Some(path) => match config::load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ImageConfig::default(),
    };

    if let Err(e) = mkfs::check_output(&args.output) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    // steps are reported even when the image cannot be written
    let (session, report) = mkfs::build(&cfg);
    for step in &report.steps {
        println!("{}", step);
    }

    match mkfs::write_image(&session, &args.output) {
        Ok(()) => {
            println!("file written to {}", args.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
