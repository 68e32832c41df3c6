//! Progress reporting capability threaded through the pipeline.
//!
//! Every layer reports a local fraction in `[0, 1]` to a [`ProgressSink`];
//! callers that own a larger unit of work wrap their sink in a
//! [`ScaledProgress`] so the local fraction lands in their sub-range.

/// Receiver of `(fraction, message)` progress reports.
///
/// Implementations must be cheap and must not block: they are called from
/// the worker thread running a transform.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

/// A sink that discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}

/// Half-open progress sub-range `[start, end)` of a parent unit of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub end: f64,
}

impl ProgressRange {
    pub const FULL: ProgressRange = ProgressRange {
        start: 0.0,
        end: 1.0,
    };

    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Sub-range `[index / total, (index + 1) / total)` of stage `index`.
    pub fn for_stage(index: usize, total: usize) -> Self {
        let total = total.max(1) as f64;
        Self {
            start: index as f64 / total,
            end: (index as f64 + 1.0) / total,
        }
    }

    /// Map a local fraction into this range. The input is clamped to `[0, 1]`.
    pub fn map(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.start + fraction * (self.end - self.start)
    }
}

/// Sink adapter remapping local fractions into a parent sub-range.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressSink,
    range: ProgressRange,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressSink, range: ProgressRange) -> Self {
        Self { inner, range }
    }
}

impl ProgressSink for ScaledProgress<'_> {
    fn report(&self, fraction: f64, message: &str) {
        self.inner.report(self.range.map(fraction), message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
