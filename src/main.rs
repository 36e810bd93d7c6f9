//! Asset Relinker - command-line host for the relink engine.
//!
//! # Overview
//!
//! The binary owns everything the engine leaves to its host:
//! - Logging infrastructure (file rotation + console output)
//! - The tokio runtime the file index is built on
//! - The asset graph, loaded from a YAML manifest
//! - The tick cadence, driven by a `tokio::time::interval`
//!
//! # Execution Flow
//!
//! 1. Parse arguments, load `Relink Settings.yaml` and `RELINK_*` overrides
//! 2. Initialize logging → logs/relink.<date>
//! 3. Create a multi-threaded tokio runtime sized from the settings
//! 4. Run the subcommand; `relink` ticks the coordinator until the run ends
//!    and Ctrl-C requests cancellation
//! 5. Log metrics and shut the runtime down
//!
//! A non-zero exit status means the run could not start or its index build failed.

use anyhow::{Context, Result, bail};
use asset_relinker::cli::{Cli, Command, ReportArgs};
use asset_relinker::logging::{LoggingOptions, init_logging};
use asset_relinker::services::{
    IndexOptions, MissingScan, export_report, remove_missing_images, render_outcome, scan_missing,
};
use asset_relinker::{
    APP_NAME, AssetFilters, AssetKind, ConfigManager, ManifestGraph, Metrics, MissingReference, RelinkCoordinator, RelinkPhase,
    RelinkSettings, StateChange, StateManager, VERSION,
};
use camino::Utf8Path;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_settings()?;
    settings.debug_mode |= cli.debug;

    let _log_guard = init_logging(&LoggingOptions {
        console_output: true,
        json: cli.log_json,
        ..LoggingOptions::from_settings(&settings, "relink")
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let options = IndexOptions::from_settings(&settings);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(options.workers)
        .thread_name("relink-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", options.workers);

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(run_command(cli.command, settings, options, Arc::clone(&metrics)));

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

async fn run_command(command: Command, settings: RelinkSettings, options: IndexOptions, metrics: Arc<Metrics>) -> Result<()> {
    match command {
        Command::Scan { manifest, report } => {
            let graph = ManifestGraph::load(&manifest)?;
            let missing = scan_missing(&graph, &settings.filters);

            print_missing(&missing);
            write_report(&report, &missing, &graph)?;
            Ok(())
        }
        Command::Relink {
            manifest,
            search_dir,
            save,
            report,
        } => relink(&manifest, search_dir, save, &report, settings, options, metrics).await,
        Command::RemoveMissing { manifest, dry_run } => {
            let mut graph = ManifestGraph::load(&manifest)?;

            if dry_run {
                let doomed = scan_missing(&graph, &AssetFilters::default())
                    .into_iter()
                    .filter(|reference| reference.kind == AssetKind::Image)
                    .count();
                println!("Would remove {} missing images", doomed);
                return Ok(());
            }

            let removed = remove_missing_images(&mut graph);
            graph.save(&manifest)?;
            println!("Removed {} missing images", removed);
            Ok(())
        }
    }
}

async fn relink(
    manifest: &Utf8Path,
    search_dir: Option<String>,
    save: bool,
    report: &ReportArgs,
    settings: RelinkSettings,
    options: IndexOptions,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let mut graph = ManifestGraph::load(manifest)?;
    let worklist = scan_missing(&graph, &settings.filters);
    if worklist.is_empty() {
        println!("No missing assets found");
        return Ok(());
    }

    let root = search_dir
        .or_else(|| settings.search_directory().map(str::to_string))
        .unwrap_or_default();

    let state = StateManager::new();
    let printer = tokio::spawn(print_progress(state.clone(), state.subscribe()));

    let mut coordinator = RelinkCoordinator::new(
        tokio::runtime::Handle::current(),
        state,
        metrics,
        options,
        Box::new(MissingScan::new(settings.filters)),
    );
    coordinator.start(worklist, &root)?;

    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current item");
            cancel.cancel();
        }
    });

    let interval = Duration::from_millis(settings.tick_interval_ms.max(1));
    let outcome = coordinator
        .run_to_completion(&mut graph, interval)
        .await
        .context("Relink run ended without an outcome")?;
    let _ = printer.await;

    print!("{}", render_outcome(&outcome));

    if save && outcome.relinked > 0 {
        graph.save(manifest)?;
        println!("Saved {}", manifest);
    }
    write_report(report, &outcome.remaining, &graph)?;

    if outcome.phase == RelinkPhase::Failed {
        bail!(outcome.summary());
    }
    Ok(())
}

/// Echo item events until the run finishes.
async fn print_progress(state: StateManager, mut rx: broadcast::Receiver<StateChange>) {
    loop {
        match rx.recv().await {
            Ok(StateChange::PhaseChanged { to, .. }) => println!("== {}", to),
            Ok(StateChange::ItemProcessed { identity, kind, message, .. }) => {
                println!("{:>3}% [{}] {}: {}", state.read(|s| s.percent()), kind, identity, message);
            }
            Ok(StateChange::RunFinished { .. }) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress printer skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_missing(missing: &[MissingReference]) {
    if missing.is_empty() {
        println!("No missing assets found");
        return;
    }

    println!("Found {} missing assets:", missing.len());
    for reference in missing {
        println!("  [{}] {}: {}", reference.kind, reference.identity, reference.original_path);
    }
}

fn write_report(report: &ReportArgs, references: &[MissingReference], graph: &ManifestGraph) -> Result<()> {
    if let Some(path) = &report.path {
        let written = export_report(path, references, report.format, graph.manifest().source.as_deref())?;
        println!("Report saved to {}", written);
    }
    Ok(())
}
