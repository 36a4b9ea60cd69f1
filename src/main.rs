use std::io;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hidled::cli::{self, Cli, ExitStatus};
use hidled::DefaultPlatform;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
                _ => ExitStatus::CommandLine,
            };
            if e.print().is_err() {
                // Nowhere left to report to.
                process::exit(ExitStatus::CommandLine.code());
            }
            process::exit(status.code());
        }
    };
    init_logging(cli.verbose);

    if cfg!(not(target_os = "macos")) {
        warn!("no native HID backend on this platform, using the simulated one");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = cli::run::<DefaultPlatform>(&cli, &mut out);
    let status = cli::finish(result, &mut out);
    process::exit(status.code());
}
