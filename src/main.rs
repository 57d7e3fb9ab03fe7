//! CLI entry point for media-scout.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use clap::Parser;
use media_scout_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use media_scout_core::quality::format_size;
use media_scout_core::scheduler::DEFAULT_MAX_WORKERS;
use media_scout_core::{
    HttpClient, Resource, ScanSession, Scheduler, SchedulerConfig, SessionConfig, load_page,
};
use tracing::{debug, info};

mod app_config;
mod cli;
mod progress;

use app_config::FileConfig;
use cli::{Args, Command, ScanOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => app_config::load_file_config(path),
        None => app_config::load_default_file_config(),
    };

    init_tracing(&args, file_config.as_ref().ok());
    let file_config = file_config?;
    debug!(?args, ?file_config, "CLI arguments parsed");

    match &args.command {
        Command::Scan(scan) => {
            let session = scan_page(&scan.options, &file_config, args.quiet).await?;
            let resources = session.resources();
            let mut stdout = io::stdout().lock();
            if scan.json {
                serde_json::to_writer_pretty(&mut stdout, &resources)
                    .context("Failed to serialize resources")?;
                writeln!(stdout)?;
            } else {
                print_table(&mut stdout, &resources)?;
            }
        }
        Command::Download(download) => {
            let session = scan_page(&download.options, &file_config, args.quiet).await?;
            let output_dir = download
                .output_dir
                .clone()
                .or_else(|| file_config.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));

            let (spinner, stop) = progress::spawn_progress_ui(
                show_spinner(args.quiet),
                session.scheduler().clone(),
                "downloading",
            );
            let summary = session.download_all(&output_dir).await;
            stop.store(true, Ordering::SeqCst);
            if let Some(handle) = spinner {
                let _ = handle.await;
            }

            let mut stdout = io::stdout().lock();
            for report in &summary.succeeded {
                writeln!(
                    stdout,
                    "saved  {}  ({})",
                    report.path.display(),
                    format_size(report.bytes)
                )?;
            }
            for failure in &summary.failed {
                eprintln!("failed {}: {}", failure.url, failure.error);
            }
            info!(
                saved = summary.succeeded.len(),
                failed = summary.failed.len(),
                dir = %output_dir.display(),
                "Download complete"
            );
            if !summary.failed.is_empty() {
                bail!(
                    "{} of {} downloads failed",
                    summary.failed.len(),
                    summary.failed.len() + summary.succeeded.len()
                );
            }
        }
    }

    Ok(())
}

/// Log level priority: `RUST_LOG` > `--quiet` > `-v` count > config
/// `verbosity` > info.
fn init_tracing(args: &Args, file_config: Option<&FileConfig>) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .and_then(|cfg| cfg.verbosity)
                .map_or("info", app_config::VerbositySetting::filter),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn show_spinner(quiet: bool) -> bool {
    !quiet && io::stderr().is_terminal()
}

/// Fetches and scans a page, then waits for follow-up analysis to finish.
async fn scan_page(options: &ScanOptions, config: &FileConfig, quiet: bool) -> Result<ScanSession> {
    let client = HttpClient::new_with_timeouts(
        config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    )?;

    let max_workers = options
        .max_workers
        .map(usize::from)
        .or(config.max_workers)
        .unwrap_or(DEFAULT_MAX_WORKERS);
    let scheduler = Scheduler::new(SchedulerConfig {
        max_workers,
        parallelism_hint: None,
    })?;

    let session_config = SessionConfig {
        analyze: !options.no_analyze && config.analyze.unwrap_or(true),
        validate_streams: true,
    };
    let session = ScanSession::http(scheduler, &client, session_config);

    let document = load_page(&client, &options.url)
        .await
        .with_context(|| format!("Failed to load page '{}'", options.url))?;
    let report = session.rescan(&document);
    info!(
        url = %options.url,
        found = report.added.len(),
        scheduled = report.scheduled.len(),
        "Page scanned"
    );

    let (spinner, stop) =
        progress::spawn_progress_ui(show_spinner(quiet), session.scheduler().clone(), "analyzing");
    session.scheduler().wait_idle().await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    Ok(session)
}

fn print_table(out: &mut impl Write, resources: &[Resource]) -> Result<()> {
    if resources.is_empty() {
        writeln!(out, "No media found")?;
        return Ok(());
    }
    for resource in resources {
        writeln!(
            out,
            "{:<7}  {:<17}  {:>10}  {:<10}  {}",
            resource.quality.as_str(),
            resource.resource_type.as_str(),
            resource.size_formatted,
            resource.source.as_str(),
            resource.url
        )?;
    }
    writeln!(out, "{} resources", resources.len())?;
    Ok(())
}
