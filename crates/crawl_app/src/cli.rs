use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogDestination;

pub const REMOTE_DEBUGGING_ENV: &str = "CHROMIUM_REMOTE_DEBUGGING_URL";

/// Render and store every in-scope page reachable from a set of starter URLs.
#[derive(Debug, Parser)]
#[command(name = "site_crawler", version, about)]
pub struct Cli {
    /// RON job file describing starters, hop limit, domains and storage root.
    pub job: PathBuf,

    /// Override the job file's concurrency.
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Override the job file's hop limit.
    #[arg(long)]
    pub max_hops: Option<u32>,

    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    #[arg(short, long)]
    pub verbose: bool,

    /// Skip writing manifest.json next to the stored pages.
    #[arg(long)]
    pub no_manifest: bool,

    /// Attach to a running browser instead of launching one.
    #[arg(long, env = REMOTE_DEBUGGING_ENV)]
    pub remote_debugging_url: Option<String>,
}
