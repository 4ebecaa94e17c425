//! Client side of the voice relay
//!
//! A [`ClientSession`] holds one conversation: it connects to the relay,
//! streams microphone frames out and schedules model speech for playback.
//! The microphone is read on a dedicated [`CaptureThread`]; speakers and
//! microphones are reached only through the [`device`] traits.

pub mod capture;
pub mod device;
pub mod playback;
pub mod session;
mod slot;

pub use capture::{AudioFrame, CaptureThread, FRAME_SIZE, FrameCapturer, SampleSink};
pub use device::{
    AudioInput, AudioOutput, ClockedAudioOutput, DeviceError, InputStream, PlaybackDone,
    ScheduledChunk,
};
pub use playback::{PlaybackCursor, PlaybackScheduler};
pub use session::{
    ClientCallbacks, ClientConfig, ClientError, ClientSession, ConnectionPhase, KEEP_ALIVE_TEXT,
    LOCAL_RELAY_URL, relay_url,
};
pub use slot::SessionSlot;
