/// Receives progress from long running reads and writes and can ask them to stop.
///
/// `progress` is called after each record with the fraction of records done,
/// in `0.0..=1.0`. `cancelled` is polled before each record; once it returns
/// `true` the operation stops with [`Error::Cancelled`](crate::Error::Cancelled).
pub trait Progress {
    fn progress(&mut self, fraction: f64);

    fn cancelled(&self) -> bool {
        false
    }
}

/// A [`Progress`] that ignores everything and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn progress(&mut self, _fraction: f64) {}
}

pub(crate) fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}
