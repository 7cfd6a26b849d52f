//! Line-oriented status reporting for long-running merge and write phases.

/// Receives human-readable status lines ("Merging 3 sln files", project
/// names as they are written, skipped copies, …).
pub trait Progress {
    fn report(&self, message: &str);
}

/// Discards every message. The default reporter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Forwards every message to `tracing` at `INFO` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn report(&self, message: &str) {
        tracing::info!(target: "sln_merge", "{message}");
    }
}

impl<F: Fn(&str)> Progress for F {
    fn report(&self, message: &str) {
        self(message)
    }
}
