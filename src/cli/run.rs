use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use console::style;
use tracing::warn;

use altscribe::config::{read_instructions, ProcessingConfig, Settings};
use altscribe::export::{filenames_path_for, write_filename_table, SimplifiedCsvWriter};
use altscribe::pipeline::CostGuard;
use altscribe::services::{
    api_key_from_env, options_for, restart_store, run_interruptible, Collaborators, RunEnd,
};
use altscribe::RowStore;

use super::progress::{print_interrupt_summary, print_plan, print_summary, ProgressObserver};
use super::prompt::{confirm, confirm_phrase};

#[derive(Args)]
pub struct RunArgs {
    /// Crawler export to process (updated in place)
    pub csv: PathBuf,

    /// File with extra instructions for the vision model
    #[arg(short, long)]
    pub instructions: Option<PathBuf>,

    /// Abort if the estimated cost exceeds this amount (USD)
    #[arg(short = 'c', long)]
    pub max_cost: Option<f64>,

    /// Seconds to wait between page fetches
    #[arg(short, long)]
    pub delay: Option<f64>,

    /// Clear all existing alt text first
    #[arg(short, long)]
    pub restart: bool,

    /// Also write a simplified Image URL / ALT Text table here, updated as results arrive
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the confirmation before processing
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn execute(args: RunArgs, settings: Settings) -> anyhow::Result<()> {
    let api_key = api_key_from_env()?;
    if !args.csv.exists() {
        bail!("CSV file not found: {}", args.csv.display());
    }

    let mut sidecar = ProcessingConfig::for_input(&args.csv)?;
    if let Some(path) = &args.instructions {
        sidecar.instructions = Some(read_instructions(path)?);
    }
    if args.max_cost.is_some() {
        sidecar.max_cost = args.max_cost;
    }
    if args.delay.is_some() {
        sidecar.scrape_delay = args.delay;
    }
    let restart = args.restart || sidecar.restart;

    let mut store = RowStore::load(&args.csv)
        .with_context(|| format!("Failed to load {}", args.csv.display()))?;

    if restart {
        let csv = args.csv.display();
        let cleared = restart_store(&mut store, |existing| {
            confirm_phrase(
                &format!(
                    "Restart will delete the existing alt text of {} row(s) in {}.",
                    existing, csv
                ),
                "DELETE ALL",
            )
        })?;
        match cleared {
            Some(0) => {}
            Some(cleared) => println!("Cleared alt text on {} row(s).", cleared),
            None => {
                println!("Restart cancelled.");
                return Ok(());
            }
        }
    }

    let options = options_for(&settings, &sidecar);
    let collaborators = Collaborators::from_settings(&settings, &api_key, sidecar.instructions())?;
    let mut pipeline = collaborators.pipeline(options);

    let plan = pipeline.plan(&store);
    if plan.to_process == 0 {
        println!("All {} row(s) already have alt text.", plan.total_rows);
        return Ok(());
    }
    print_plan(&plan);

    CostGuard::new(pipeline.options().pricing.clone(), pipeline.options().max_cost)
        .check(plan.to_process)?;

    if let Some(delay) = sidecar.scrape_delay().filter(|d| *d > Duration::ZERO) {
        println!("  Delay between pages: {:.1}s", delay.as_secs_f64());
    }

    if !args.yes && !confirm("Proceed?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let observer = Arc::new(ProgressObserver::new());
    pipeline = pipeline.with_observer(observer.clone());

    if let Some(path) = &args.output {
        let writer = SimplifiedCsvWriter::create(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        pipeline = pipeline.with_sink(Box::new(writer));
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let outcome = run_interruptible(&mut pipeline, &mut store, interrupt).await;
    observer.finish();

    if let Some(path) = &args.output {
        let filenames = filenames_path_for(path);
        let written = write_filename_table(&store, &filenames)?;
        println!("Wrote {} filename row(s) to {}", written, filenames.display());
    }

    match outcome {
        Ok(RunEnd::Finished(summary)) => {
            print_summary(&summary);
            println!("Updated {}", style(args.csv.display()).bold());
            Ok(())
        }
        Ok(RunEnd::Interrupted(summary)) => {
            println!("\n{}", style("Interrupted").yellow());
            print_interrupt_summary(&summary);
            Ok(())
        }
        Err(e) => {
            print_interrupt_summary(&pipeline.ledger().summary());
            Err(e.into())
        }
    }
}
