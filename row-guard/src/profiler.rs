//! Wall-clock timing of named pipeline steps.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Duration of one step, in seconds rounded to four decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub duration_sec: f64,
}

/// Timings of every recorded step plus their sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub steps: Vec<StepTiming>,
    pub total_sec: f64,
}

/// Records the time elapsed between consecutive [`StepProfiler::step`] calls.
///
/// ```rust
/// use row_guard::profiler::StepProfiler;
///
/// let mut profiler = StepProfiler::new();
/// profiler.start();
/// profiler.step("read");
/// profiler.step("validate");
/// let report = profiler.report();
/// assert_eq!(report.steps.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepProfiler {
    steps: Vec<StepTiming>,
    last: Option<Instant>,
}

fn round4(secs: f64) -> f64 {
    (secs * 10_000.0).round() / 10_000.0
}

impl StepProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the clock for the next step.
    pub fn start(&mut self) {
        self.last = Some(Instant::now());
    }

    /// Closes the current step under `name`. Without a prior
    /// [`start`](Self::start) the step is recorded as zero-length.
    pub fn step(&mut self, name: impl Into<String>) {
        let now = Instant::now();
        let elapsed = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.steps.push(StepTiming {
            step: name.into(),
            duration_sec: round4(elapsed),
        });
        self.last = Some(now);
    }

    pub fn report(&self) -> ProfileReport {
        let total: f64 = self.steps.iter().map(|s| s.duration_sec).sum();
        ProfileReport {
            steps: self.steps.clone(),
            total_sec: round4(total),
        }
    }
}
