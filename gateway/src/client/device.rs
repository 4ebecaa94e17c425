//! Audio device seams
//!
//! The session bridge never talks to hardware directly. Capture goes through
//! [`AudioInput`], playback through [`AudioOutput`]; host applications plug
//! in their platform backends, tests and headless runs use
//! [`ClockedAudioOutput`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use super::capture::SampleSink;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The user or platform refused microphone access
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

/// Microphone provider.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Open the device and start pushing mono samples into `sink`.
    async fn open(&self, sink: SampleSink) -> Result<Box<dyn InputStream>, DeviceError>;
}

/// An open capture stream.
pub trait InputStream: Send {
    /// Native sample rate of the samples pushed into the sink
    fn sample_rate(&self) -> u32;

    /// Release the device. Must drop the sink.
    fn close(&mut self);
}

/// Called once a scheduled chunk has finished playing.
pub type PlaybackDone = Box<dyn FnOnce() + Send>;

/// Speaker with its own clock.
pub trait AudioOutput: Send + Sync {
    /// Current device time in seconds.
    fn now(&self) -> f64;

    /// Play `samples` starting at device time `start_at`.
    ///
    /// `on_done` runs when playback of this chunk ends. It is dropped
    /// without running if [`stop_all`](Self::stop_all) is called first.
    fn schedule(&self, samples: Vec<f32>, sample_rate: u32, start_at: f64, on_done: PlaybackDone);

    /// Stop everything scheduled.
    fn stop_all(&self);
}

/// Chunks remembered by [`ClockedAudioOutput`]; older ones are forgotten.
pub const SCHEDULE_HISTORY: usize = 256;

/// A chunk accepted by [`ClockedAudioOutput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_at: f64,
    pub duration: f64,
    pub sample_rate: u32,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Output that plays nothing but keeps time.
///
/// Completion callbacks fire on tokio timers at the chunk's end time, so the
/// playback bookkeeping behaves as it would against a real device.
pub struct ClockedAudioOutput {
    origin: Instant,
    generation: Arc<AtomicU64>,
    scheduled: Mutex<VecDeque<ScheduledChunk>>,
}

impl ClockedAudioOutput {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            generation: Arc::new(AtomicU64::new(0)),
            scheduled: Mutex::new(VecDeque::new()),
        }
    }

    /// The most recent chunks scheduled since the last `stop_all`, oldest
    /// first, capped at [`SCHEDULE_HISTORY`].
    pub fn scheduled(&self) -> Vec<ScheduledChunk> {
        self.scheduled.lock().iter().copied().collect()
    }
}

impl Default for ClockedAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for ClockedAudioOutput {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&self, samples: Vec<f32>, sample_rate: u32, start_at: f64, on_done: PlaybackDone) {
        let duration = samples.len() as f64 / f64::from(sample_rate.max(1));
        let chunk = ScheduledChunk {
            start_at,
            duration,
            sample_rate,
        };
        {
            let mut scheduled = self.scheduled.lock();
            if scheduled.len() == SCHEDULE_HISTORY {
                scheduled.pop_front();
            }
            scheduled.push_back(chunk);
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime for playback timer; completing chunk immediately");
            on_done();
            return;
        };

        let deadline = self.origin + Duration::from_secs_f64(chunk.end().max(0.0));
        let generation = self.generation.clone();
        let scheduled_in = generation.load(Ordering::Acquire);

        handle.spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            if generation.load(Ordering::Acquire) == scheduled_in {
                on_done();
            }
        });
    }

    fn stop_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.scheduled.lock().clear();
    }
}
