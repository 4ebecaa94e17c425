//! Gap-free playback scheduling
//!
//! Decoded chunks arrive in arbitrary sizes and at irregular times. Each one
//! is scheduled to start exactly where the previous one ends, or right away
//! if the device clock has already passed that point.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::device::AudioOutput;

/// Next start time on the output device clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `duration` seconds and return the start time of the slot.
    ///
    /// The start is never in the past and never before the end of the
    /// previously reserved slot.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = self.next_start.max(now);
        self.next_start = start + duration;
        start
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn reset(&mut self) {
        self.next_start = 0.0;
    }
}

/// Fired when the last scheduled chunk finishes.
pub type DrainedCallback = Arc<dyn Fn() + Send + Sync>;

/// Schedules chunks on an [`AudioOutput`] and tracks how many are pending.
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    cursor: Mutex<PlaybackCursor>,
    pending: Arc<AtomicUsize>,
    generation: Arc<AtomicU64>,
    on_drained: DrainedCallback,
}

impl PlaybackScheduler {
    pub fn new(output: Arc<dyn AudioOutput>, on_drained: DrainedCallback) -> Self {
        Self {
            output,
            cursor: Mutex::new(PlaybackCursor::new()),
            pending: Arc::new(AtomicUsize::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            on_drained,
        }
    }

    /// Queue one chunk behind everything already scheduled.
    ///
    /// Returns the device time the chunk starts at.
    pub fn enqueue(&self, samples: Vec<f32>, sample_rate: u32) -> f64 {
        let duration = samples.len() as f64 / f64::from(sample_rate.max(1));
        let start_at = self.cursor.lock().schedule(self.output.now(), duration);

        self.pending.fetch_add(1, Ordering::AcqRel);

        let pending = self.pending.clone();
        let generation = self.generation.clone();
        let scheduled_in = generation.load(Ordering::Acquire);
        let on_drained = self.on_drained.clone();

        self.output.schedule(
            samples,
            sample_rate,
            start_at,
            Box::new(move || {
                if generation.load(Ordering::Acquire) != scheduled_in {
                    return;
                }
                let before = pending
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .unwrap_or(0);
                if before == 1 {
                    on_drained();
                }
            }),
        );

        debug!(start_at, duration, "Scheduled playback chunk");
        start_at
    }

    /// Chunks scheduled and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stop all playback and forget the cursor.
    ///
    /// Completions of chunks scheduled before this call are ignored.
    pub fn stop_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.output.stop_all();
        self.pending.store(0, Ordering::Release);
        self.cursor.lock().reset();
    }
}
