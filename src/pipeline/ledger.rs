//! Cost guard and progress counters.

use std::time::{Duration, Instant};

use super::PipelineError;
use crate::llm::{PricingModel, TokenUsage};
use crate::models::{Disposition, RowId};

/// Rejects a run whose estimate exceeds the configured ceiling.
#[derive(Debug, Clone, Default)]
pub struct CostGuard {
    pub pricing: PricingModel,
    pub ceiling: Option<f64>,
}

impl CostGuard {
    pub fn new(pricing: PricingModel, ceiling: Option<f64>) -> Self {
        Self { pricing, ceiling }
    }

    pub fn estimate(&self, images: usize) -> f64 {
        self.pricing.estimate(images)
    }

    /// Estimate the run and fail if it is above the ceiling.
    pub fn check(&self, images: usize) -> Result<f64, PipelineError> {
        let estimated = self.estimate(images);
        match self.ceiling {
            Some(ceiling) if ceiling > 0.0 && estimated > ceiling => {
                Err(PipelineError::CostCeilingExceeded { estimated, ceiling })
            }
            _ => Ok(estimated),
        }
    }
}

/// Running counters for one pipeline run.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Last row whose outcome was written to the store.
    pub last_row: Option<RowId>,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub usage: TokenUsage,
    pub vision_calls: usize,
    started: Instant,
}

impl ProgressLedger {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            skipped: 0,
            failed: 0,
            last_row: None,
            estimated_cost: 0.0,
            actual_cost: 0.0,
            usage: TokenUsage::default(),
            vision_calls: 0,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, row_id: RowId, disposition: Disposition) {
        match disposition {
            Disposition::Processed => self.processed += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Failed => self.failed += 1,
        }
        self.last_row = Some(row_id);
    }

    pub fn record_call(&mut self, usage: TokenUsage, cost: f64) {
        self.vision_calls += 1;
        self.usage += usage;
        self.actual_cost += cost;
    }

    pub fn completed(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total,
            processed: self.processed,
            skipped: self.skipped,
            failed: self.failed,
            last_row: self.last_row,
            estimated_cost: self.estimated_cost,
            actual_cost: self.actual_cost,
            vision_calls: self.vision_calls,
            elapsed: self.elapsed(),
        }
    }
}

/// Snapshot of a finished (or interrupted) run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub last_row: Option<RowId>,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub vision_calls: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Human-readable duration: `42s`, `3m 7s`, `2h 15m`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
