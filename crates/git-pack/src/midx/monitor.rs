//! Progress/cancellation collaborator consumed by the MIDX writer.
//!
//! The writer never blocks on anything but the output sink; cancellation is
//! observed only at the [`DigestingSink`](crate::midx::digest_sink::DigestingSink)'s
//! periodic poll points.

use git_utils::progress::Progress;

/// Minimal progress/cancellation interface the writer consumes.
///
/// Both methods have no-op defaults so a caller that only cares about one
/// of the two can implement just that one.
pub trait Monitor {
    /// Called periodically by the writer; `true` aborts the write with
    /// [`MidxError::Cancelled`](crate::midx::error::MidxError::Cancelled).
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called with a monotonically increasing count of units processed
    /// (bytes written, for the digesting sink).
    fn update(&mut self, _units: u64) {}
}

/// A monitor that never cancels and ignores updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {}

/// Adapts a [`Progress`] display to the [`Monitor`] interface.
pub struct ProgressMonitor<'a> {
    progress: &'a mut Progress,
    cancelled: &'a dyn Fn() -> bool,
}

impl<'a> ProgressMonitor<'a> {
    /// Wrap a [`Progress`] display with a cancellation predicate (e.g. a
    /// flag set by a signal handler).
    pub fn new(progress: &'a mut Progress, cancelled: &'a dyn Fn() -> bool) -> Self {
        Self { progress, cancelled }
    }
}

impl Monitor for ProgressMonitor<'_> {
    fn is_cancelled(&self) -> bool {
        (self.cancelled)()
    }

    fn update(&mut self, units: u64) {
        self.progress.update(units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_monitor_never_cancels() {
        let m = NullMonitor;
        assert!(!m.is_cancelled());
    }

    #[test]
    fn progress_monitor_forwards_cancellation() {
        let mut progress = Progress::new("midx", None);
        let flag = true;
        let cancelled = || flag;
        let monitor = ProgressMonitor::new(&mut progress, &cancelled);
        assert!(monitor.is_cancelled());
    }

    #[test]
    fn progress_monitor_forwards_updates() {
        // Exercised purely for panic-freedom; `Progress` keeps its counters
        // private, so observing the effect directly isn't possible here.
        let mut progress = Progress::new("midx", Some(100));
        let cancelled = || false;
        let mut monitor = ProgressMonitor::new(&mut progress, &cancelled);
        monitor.update(50);
    }
}
