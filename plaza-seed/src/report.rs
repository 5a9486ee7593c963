use plaza_types::{LoadStrategy, SamplingPolicy};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::info;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Users,
    Follows,
    Posts,
    Likes,
    Comments,
    Replies,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Users,
        Stage::Follows,
        Stage::Posts,
        Stage::Likes,
        Stage::Comments,
        Stage::Replies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Users => "users",
            Stage::Follows => "follows",
            Stage::Posts => "posts",
            Stage::Likes => "likes",
            Stage::Comments => "comments",
            Stage::Replies => "replies",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage.
///
/// `requested` counts the stage's primary entity after clamping to the
/// available population; `produced` is what was stored. Rolled-back atomic
/// units land in `failed`. `rows` covers every table the stage writes, so
/// media and link rows count there for the posts stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub requested: usize,
    pub produced: usize,
    pub failed: usize,
    pub rows: usize,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            requested: 0,
            produced: 0,
            failed: 0,
            rows: 0,
            elapsed_ms: 0,
        }
    }

    /// Requested entities neither stored nor counted as failed
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.produced + self.failed)
    }
}

/// Per-stage reports plus run totals, printable as a table or JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub strategy: LoadStrategy,
    pub sampling: SamplingPolicy,
    /// Seed the run actually used; pass it back to reproduce the dataset
    pub seed: u64,
    pub tuned: bool,
    pub stages: Vec<StageReport>,
    pub total_rows: usize,
    pub elapsed_ms: u64,
    pub rows_per_sec: f64,
}

impl RunSummary {
    pub fn new(strategy: LoadStrategy, sampling: SamplingPolicy, seed: u64, tuned: bool) -> Self {
        Self {
            strategy,
            sampling,
            seed,
            tuned,
            stages: Vec::with_capacity(Stage::ALL.len()),
            total_rows: 0,
            elapsed_ms: 0,
            rows_per_sec: 0.0,
        }
    }

    pub fn push(&mut self, report: StageReport) {
        self.total_rows += report.rows;
        self.stages.push(report);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
        let secs = elapsed.as_secs_f64();
        self.rows_per_sec = if secs > 0.0 {
            self.total_rows as f64 / secs
        } else {
            0.0
        };
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|r| r.failed).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Generation Summary");
        let _ = writeln!(out, "==================");
        let _ = writeln!(
            out,
            "Strategy: {}  Sampling: {}  Seed: {}  Tuned: {}",
            self.strategy.as_str(),
            self.sampling.as_str(),
            self.seed,
            if self.tuned { "yes" } else { "no" }
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<10} {:>12} {:>12} {:>8} {:>12} {:>10}",
            "stage", "requested", "produced", "failed", "rows", "ms"
        );
        for r in &self.stages {
            let _ = writeln!(
                out,
                "{:<10} {:>12} {:>12} {:>8} {:>12} {:>10}",
                r.stage.as_str(),
                r.requested,
                r.produced,
                r.failed,
                r.rows,
                r.elapsed_ms
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Total rows: {}  Elapsed: {:.1}s  Rate: {:.0} rows/s",
            self.total_rows,
            self.elapsed_ms as f64 / 1000.0,
            self.rows_per_sec
        );
        out
    }
}

/// Progress logging for a stage with a known (upper-bound) total.
#[derive(Debug)]
pub struct Progress {
    stage: Stage,
    total: usize,
    done: usize,
    started: Instant,
}

impl Progress {
    pub fn new(stage: Stage, total: usize) -> Self {
        Self {
            stage,
            total,
            done: 0,
            started: Instant::now(),
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Record `n` more units and log rate and ETA
    pub fn advance(&mut self, n: usize) {
        self.done += n;
        let secs = self.started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { self.done as f64 / secs } else { 0.0 };
        let remaining = self.total.saturating_sub(self.done);
        let eta = if rate > 0.0 { remaining as f64 / rate } else { 0.0 };
        info!(
            stage = %self.stage,
            "{} / {} ({:.0}/s, ETA {:.1}s)",
            self.done,
            self.total,
            rate,
            eta
        );
    }

    /// Log whatever is left of the total as done
    pub fn complete(&mut self) {
        let remaining = self.total.saturating_sub(self.done);
        if remaining > 0 {
            self.advance(remaining);
        }
    }
}
