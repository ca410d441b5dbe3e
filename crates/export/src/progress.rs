//! Progress reporting for export sessions.
//!
//! Updates flow over a crossbeam channel so the caller can poll a
//! progress bar without blocking the pipeline. Reported fractions are
//! monotonically non-decreasing, including across a cancel/resume pair:
//! a resumed session counts the samples already carried over from the
//! prior output toward its total.

use crossbeam::channel::Sender;

/// Availability of durable output.
///
/// `WaitingForAvailability` until the first sample is confirmed written;
/// `Available` from then on. The state never regresses, which is what
/// makes a partially written output a valid resume candidate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProgressState {
    WaitingForAvailability,
    Available,
}

/// Progress update from the export pipeline.
#[derive(Clone, Debug)]
pub enum ExportProgress {
    /// Export has started.
    Started {
        /// Expected video samples, including any carried over by a resume.
        expected_samples: u64,
    },
    /// A video sample has been durably written.
    SampleWritten {
        written: u64,
        expected: u64,
        bytes: usize,
    },
    /// Export completed successfully.
    Completed {
        total_bytes: u64,
        duration_us: i64,
    },
    /// Export was cancelled; partial output may be resumable.
    Cancelled,
    /// Export failed.
    Failed { error: String },
}

impl ExportProgress {
    /// Progress as a fraction in `[0.0, 1.0]`.
    pub fn progress_fraction(&self) -> f64 {
        match self {
            Self::Started { .. } => 0.0,
            Self::SampleWritten {
                written, expected, ..
            } => {
                if *expected > 0 {
                    (*written as f64 / *expected as f64).min(1.0)
                } else {
                    0.0
                }
            }
            Self::Completed { .. } => 1.0,
            Self::Cancelled | Self::Failed { .. } => 0.0,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Started { .. } | Self::SampleWritten { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Cancelled | Self::Failed { .. }
        )
    }
}

/// Counts durable video samples and emits updates.
///
/// The sender is optional; headless exports skip reporting entirely.
pub struct ProgressTracker {
    tx: Option<Sender<ExportProgress>>,
    expected: u64,
    written: u64,
    state: ProgressState,
}

impl ProgressTracker {
    pub fn new(tx: Option<Sender<ExportProgress>>, expected: u64) -> Self {
        Self {
            tx,
            expected,
            written: 0,
            state: ProgressState::WaitingForAvailability,
        }
    }

    /// Start a resumed session with samples already carried over.
    pub fn resumed(tx: Option<Sender<ExportProgress>>, expected: u64, carried_over: u64) -> Self {
        let mut tracker = Self::new(tx, expected);
        tracker.written = carried_over.min(expected);
        if tracker.written > 0 {
            tracker.state = ProgressState::Available;
        }
        tracker
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn samples_written(&self) -> u64 {
        self.written
    }

    pub fn announce_start(&self) {
        self.send(ExportProgress::Started {
            expected_samples: self.expected,
        });
    }

    /// Record one durably written video sample.
    pub fn record_sample(&mut self, bytes: usize) {
        self.written += 1;
        self.state = ProgressState::Available;
        self.send(ExportProgress::SampleWritten {
            written: self.written,
            expected: self.expected,
            bytes,
        });
    }

    pub fn announce_completed(&self, total_bytes: u64, duration_us: i64) {
        self.send(ExportProgress::Completed {
            total_bytes,
            duration_us,
        });
    }

    pub fn announce_cancelled(&self) {
        self.send(ExportProgress::Cancelled);
    }

    pub fn announce_failed(&self, error: String) {
        self.send(ExportProgress::Failed { error });
    }

    fn send(&self, update: ExportProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(update);
        }
    }
}
