use std::time::Duration;

use crate::config::SolverKind;

/// What happened while binarizing one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub name: String,
    pub height: usize,
    pub width: usize,
    /// Tiles sampled together; 1 when the image was not tiled.
    pub tiles: usize,
    pub model_evaluations: usize,
    pub elapsed: Duration,
}

/// Aggregate over every image recorded in a [`RunContext`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub images: usize,
    pub tiles: usize,
    pub model_evaluations: usize,
    pub total: Duration,
}

impl RunSummary {
    pub fn mean_per_image(&self) -> Duration {
        if self.images == 0 {
            Duration::ZERO
        } else {
            self.total / self.images as u32
        }
    }
}

/// Per-run logging and metrics context.
///
/// Created and owned by the caller, passed by reference to whatever needs to
/// report. Events go out through `tracing`; records stay in memory until the
/// caller asks for the summary.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_name: String,
    solver: Option<SolverKind>,
    records: Vec<ImageRecord>,
}

impl RunContext {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self { run_name: run_name.into(), solver: None, records: Vec::new() }
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn record(&mut self, record: ImageRecord) {
        tracing::info!(
            run = %self.run_name,
            image = %record.name,
            height = record.height,
            width = record.width,
            tiles = record.tiles,
            model_evaluations = record.model_evaluations,
            elapsed_ms = record.elapsed.as_millis() as u64,
            "binarized image"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn summary(&self) -> RunSummary {
        self.records.iter().fold(
            RunSummary { images: 0, tiles: 0, model_evaluations: 0, total: Duration::ZERO },
            |acc, r| RunSummary {
                images: acc.images + 1,
                tiles: acc.tiles + r.tiles,
                model_evaluations: acc.model_evaluations + r.model_evaluations,
                total: acc.total + r.elapsed,
            },
        )
    }

    /// Emit the run summary as a single `tracing` event.
    pub fn finish(&self) -> RunSummary {
        let summary = self.summary();
        tracing::info!(
            run = %self.run_name,
            solver = ?self.solver,
            images = summary.images,
            tiles = summary.tiles,
            model_evaluations = summary.model_evaluations,
            total_ms = summary.total.as_millis() as u64,
            mean_ms = summary.mean_per_image().as_millis() as u64,
            "run finished"
        );
        summary
    }
}
