mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Instrument, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use listing_sieve::config::OutputConfig;
use listing_sieve::session::{JsonFileStore, NoopGate, StdinGate, VerificationGate};
use listing_sieve::surface::{ChromeSurface, RenderSurface, StaticSurface};
use listing_sieve::{AppConfig, InterruptFlag, RunCoordinator, RunPlan};

use cli::Cli;

fn init_tracing(output: &OutputConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("listing_sieve=info".parse()?);

    let (file_layer, guard) = match &output.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "listing-sieve.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);
    let _log_guard = init_tracing(&config.output)?;

    println!("=== Listing Sieve: product links + seller and review filters ===");
    let listing_url = cli.listing_url(&config.site)?;
    let selection = cli.page_selection()?;
    let target = cli.target_period(chrono::Local::now().date_naive())?;
    let plan = RunPlan {
        listing_url,
        selection,
        target,
        reports: cli.report_paths(&config.output),
    };

    let run_id = Uuid::new_v4();
    let span = info_span!("run", run_id = %run_id);
    async {
        info!(
            "Starting run over {} of {}, target month {}",
            plan.selection, plan.listing_url, plan.target
        );

        let replay = cli.replay_manifest();
        let surface: Box<dyn RenderSurface> = match &replay {
            Some(manifest) => Box::new(StaticSurface::from_manifest(manifest)?),
            None => {
                info!("Opening browser...");
                Box::new(ChromeSurface::launch(&config.browser)?)
            }
        };
        let gate: Box<dyn VerificationGate> = if cli.skip_verification || replay.is_some() {
            Box::new(NoopGate)
        } else {
            Box::new(StdinGate)
        };
        let store = JsonFileStore::new(&config.session.cookie_path);

        let interrupt = InterruptFlag::new();
        let watcher = interrupt.watch_ctrl_c();

        let coordinator =
            RunCoordinator::new(surface.as_ref(), &config, &store, gate.as_ref(), interrupt);
        let outcome = coordinator.run(&plan).await;
        watcher.abort();

        let outcome = outcome?;
        info!(
            "Done: {} of {} products processed, {} passed ({})",
            outcome.summary.processed,
            outcome.summary.total,
            outcome.summary.passed,
            outcome.crawl.stop
        );
        anyhow::Ok(())
    }
    .instrument(span)
    .await?;

    info!("Shutting down...");
    Ok(())
}
