// 📶 Progress & Cancellation
// Coarse, fire-and-forget percentages for a host UI, plus a cooperative
// cancellation check between rows.

use crate::error::{ResolutionError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Default number of rows between progress notifications
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

// ============================================================================
// PROGRESS SINK
// ============================================================================

/// Receiver of integer percentages (0-100). Delivery is best effort.
pub trait ProgressSink {
    fn report(&self, percent: u8);
}

/// Discards every notification
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8) {}
}

impl ProgressSink for mpsc::Sender<u8> {
    fn report(&self, percent: u8) {
        // Receiver gone means nobody is watching; keep resolving
        let _ = self.send(percent);
    }
}

impl ProgressSink for mpsc::SyncSender<u8> {
    fn report(&self, percent: u8) {
        // Full queue: drop this update, a later one supersedes it
        let _ = self.try_send(percent);
    }
}

// ============================================================================
// CANCELLATION TOKEN
// ============================================================================

/// Shared flag checked before every row of every phase
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

// ============================================================================
// PROGRESS TRACKER
// ============================================================================

/// Counts row steps across all phases of one run
///
/// Only strictly increasing percentages reach the sink. Percentages stay
/// below 100 until `finish` is called.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    total_steps: usize,
    done_steps: usize,
    interval: usize,
    since_report: usize,
    last_reported: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        sink: &'a dyn ProgressSink,
        cancel: &'a CancellationToken,
        total_steps: usize,
        interval: usize,
    ) -> Self {
        ProgressTracker {
            sink,
            cancel,
            total_steps,
            done_steps: 0,
            interval: interval.max(1),
            since_report: 0,
            last_reported: None,
        }
    }

    /// Emit the initial 0%
    pub fn start(&mut self) {
        self.emit(0);
    }

    /// Account for one processed row; fails if the run was cancelled
    pub fn step(&mut self) -> Result<()> {
        self.check_cancelled()?;

        self.done_steps += 1;
        self.since_report += 1;
        if self.since_report >= self.interval {
            self.since_report = 0;
            let percent = self.percent();
            self.emit(percent);
        }

        Ok(())
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ResolutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit the terminal 100%
    pub fn finish(&mut self) {
        self.emit(100);
    }

    pub fn percent(&self) -> u8 {
        if self.total_steps == 0 {
            return 99;
        }
        let raw = self.done_steps.saturating_mul(100) / self.total_steps;
        raw.min(99) as u8
    }

    pub fn done_steps(&self) -> usize {
        self.done_steps
    }

    fn emit(&mut self, percent: u8) {
        if self.last_reported.map_or(true, |last| percent > last) {
            self.sink.report(percent);
            self.last_reported = Some(percent);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mpsc::Receiver<u8>) -> Vec<u8> {
        receiver.try_iter().collect()
    }

    #[test]
    fn test_reports_every_interval() {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(&sender, &cancel, 1000, 100);

        tracker.start();
        for _ in 0..1000 {
            tracker.step().unwrap();
        }
        tracker.finish();

        assert_eq!(
            drain(&receiver),
            vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 99, 100]
        );
    }

    #[test]
    fn test_monotonic_and_capped() {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancellationToken::new();
        // More steps than announced: percentages must not exceed 99 or repeat
        let mut tracker = ProgressTracker::new(&sender, &cancel, 10, 1);

        for _ in 0..25 {
            tracker.step().unwrap();
        }
        tracker.finish();

        let reports = drain(&receiver);
        assert!(reports.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reports.last(), Some(&100));
        assert!(reports[..reports.len() - 1].iter().all(|p| *p <= 99));
    }

    #[test]
    fn test_cancellation_stops_steps() {
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(&NoProgress, &cancel, 10, 1);

        tracker.step().unwrap();
        cancel.clone().cancel();

        assert_eq!(tracker.step(), Err(ResolutionError::Cancelled));
        assert_eq!(tracker.done_steps(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sender, receiver) = mpsc::channel::<u8>();
        drop(receiver);
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(&sender, &cancel, 2, 1);

        assert!(tracker.step().is_ok());
        tracker.finish();
    }

    #[test]
    fn test_sync_sender_coalesces() {
        let (sender, receiver) = mpsc::sync_channel(1);
        let cancel = CancellationToken::new();
        let mut tracker = ProgressTracker::new(&sender, &cancel, 4, 1);

        for _ in 0..4 {
            tracker.step().unwrap();
        }

        // Only the first update fit; the rest were dropped without blocking
        assert_eq!(drain(&receiver), vec![25]);
    }
}
