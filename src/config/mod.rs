//! Configuration for study runs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag used to stop a run between patients
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every run holding a clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Configuration for a study run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker threads
    pub threads: usize,
    /// Whether to draw progress bars
    pub show_progress: bool,
    /// Patients per batch for streamed input
    pub batch_size: usize,
    /// Optional cancellation token checked between patients
    pub cancellation: Option<CancellationToken>,
}

/// Default number of patients per streamed batch
pub const DEFAULT_BATCH_SIZE: usize = 16384;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            show_progress: false,
            batch_size: DEFAULT_BATCH_SIZE,
            cancellation: None,
        }
    }
}

impl RunConfig {
    /// Set the number of worker threads (at least one)
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Enable or disable progress bars
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Set the streamed batch size (at least one)
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether the attached token, if any, was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run Configuration:")?;
        writeln!(f, "  Threads: {}", self.threads)?;
        writeln!(f, "  Batch Size: {}", self.batch_size)?;
        writeln!(f, "  Show Progress: {}", self.show_progress)?;
        writeln!(f, "  Cancellable: {}", self.cancellation.is_some())
    }
}
