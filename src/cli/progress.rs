//! Terminal progress and summaries.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use altscribe::models::Disposition;
use altscribe::pipeline::{
    format_duration, PageSource, PipelineEvent, PipelineObserver, RunPlan, RunSummary,
};

/// Drives a progress bar from pipeline events.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} images ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for ProgressObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Started { to_process, .. } => {
                self.bar.set_length(*to_process as u64);
                self.bar.set_message("scraping pages");
            }
            PipelineEvent::PageResolved {
                index,
                total,
                page_url,
                source,
                context,
                ..
            } => {
                if let Some(error) = &context.error {
                    self.bar.println(format!(
                        "{} {}: {}",
                        style("page error").yellow(),
                        page_url,
                        error
                    ));
                }
                let verb = match source {
                    PageSource::Scraped => "scraped",
                    PageSource::Reused => "cached",
                };
                self.bar.set_message(format!("{} page {}/{}", verb, index, total));
            }
            PipelineEvent::RowResolved {
                image_url,
                disposition,
                text,
                ..
            } => {
                if *disposition == Disposition::Failed {
                    self.bar
                        .println(format!("{} {}: {}", style("failed").red(), image_url, text));
                }
                self.bar.inc(1);
            }
            PipelineEvent::RowDeferred { .. } => {
                self.bar.set_message("waiting on variant");
            }
            PipelineEvent::BatchFlushed { size, cost, error } => match error {
                Some(error) => self.bar.println(format!(
                    "{} batch of {}: {}",
                    style("failed").red(),
                    size,
                    error
                )),
                None => self
                    .bar
                    .set_message(format!("batch of {} (${:.4})", size, cost)),
            },
            PipelineEvent::Complete { .. } => self.bar.finish_and_clear(),
        }
    }
}

pub fn print_plan(plan: &RunPlan) {
    println!("{}", style("Run plan").bold());
    println!("  Rows:               {}", plan.total_rows);
    println!("  Already processed:  {}", plan.already_done);
    println!("  To process:         {}", plan.to_process);
    println!("  Unique images:      {}", plan.unique_images);
    println!("  Duplicate rows:     {}", plan.duplicates());
    println!("  Pages:              {}", plan.pages);
    println!("  Estimated cost:     ${:.4}", plan.estimated_cost);
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("Processing complete").green().bold());
    print_counts(summary);
}

/// Counters and resume point after a stop.
pub fn print_interrupt_summary(summary: &RunSummary) {
    println!();
    println!("{}", style("Processing stopped").yellow().bold());
    print_counts(summary);
    match summary.last_row {
        Some(row) => println!("  Last saved row:     {}", row + 1),
        None => println!("  Last saved row:     none"),
    }
    println!("Run the same command again to resume.");
}

fn print_counts(summary: &RunSummary) {
    println!("  Processed:          {}", summary.processed);
    println!("  Skipped:            {}", summary.skipped);
    println!("  Failed:             {}", summary.failed);
    println!("  Vision calls:       {}", summary.vision_calls);
    println!("  Estimated cost:     ${:.4}", summary.estimated_cost);
    println!("  Actual cost:        ${:.4}", summary.actual_cost);
    println!("  Elapsed:            {}", format_duration(summary.elapsed));
}
