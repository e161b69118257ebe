mod cli;
mod config;
mod logging;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use crawl_logging::crawl_error;

use crate::cli::Cli;

/// Exit status when the crawl was interrupted before the frontier drained.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    match runner::run(&cli).await {
        Ok(report) => {
            runner::print_summary(&report);
            if report.cancelled {
                ExitCode::from(EXIT_CANCELLED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            crawl_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
