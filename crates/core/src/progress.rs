//! Progress reporting for the long-running stages.
//!
//! Rasterization reports once per file, index builds once per document and
//! queries once around the search call. Sinks are observational only; the
//! pipeline never waits on them.

use tracing::info;

pub trait ProgressSink: Send + Sync {
    fn report(&self, current: usize, total: usize, label: &str);
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _current: usize, _total: usize, _label: &str) {}
}

/// Logs every tuple at `info` under a fixed stage name.
pub struct TracingProgress {
    stage: &'static str,
}

impl TracingProgress {
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }
}

impl ProgressSink for TracingProgress {
    fn report(&self, current: usize, total: usize, label: &str) {
        info!(stage = self.stage, current, total, label, "progress");
    }
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn report(&self, current: usize, total: usize, label: &str) {
        self(current, total, label)
    }
}
