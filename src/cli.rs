//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Find and fetch the media on a web page.
///
/// Media Scout scans a page for images, video, audio and streaming
/// manifests, grades their quality and optionally downloads all of them.
#[derive(Parser, Debug)]
#[command(name = "media-scout")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read defaults from this config file instead of the standard location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a page and list the detected media
    Scan(ScanArgs),
    /// Scan a page and download every detected resource
    Download(DownloadArgs),
}

/// Options shared by every command that scans a page.
#[derive(clap::Args, Debug, Clone)]
pub struct ScanOptions {
    /// Page to scan
    pub url: String,

    /// Maximum concurrent background tasks (1-64)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub max_workers: Option<u8>,

    /// Skip probing resources for size and type
    #[arg(long)]
    pub no_analyze: bool,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub options: ScanOptions,

    /// Print resources as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub options: ScanOptions,

    /// Directory to save files into (default: config `output_dir`, then `.`)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}
