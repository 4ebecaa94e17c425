//! Frame capturer
//!
//! Accumulates raw device samples into fixed-size frames on a dedicated
//! thread. The control path talks to it only through channels: commands in,
//! frames out.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Samples per frame (about 85 ms at 48 kHz).
pub const FRAME_SIZE: usize = 4096;

/// One filled frame at the device's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 1-based, increases by one per emitted frame
    pub index: u64,
    pub samples: Vec<f32>,
}

/// Accumulation state. Runs inside the capture thread but is usable on its
/// own.
#[derive(Debug)]
pub struct FrameCapturer {
    buffer: Vec<f32>,
    offset: usize,
    active: bool,
    frame_count: u64,
}

impl FrameCapturer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            buffer: vec![0.0; frame_size.max(1)],
            offset: 0,
            active: false,
            frame_count: 0,
        }
    }

    /// Resume emitting. Any partial frame from before is discarded.
    pub fn start(&mut self) {
        self.active = true;
        self.offset = 0;
    }

    /// Stop emitting. Incoming samples are ignored until the next `start`.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Append samples, returning every frame that filled up.
    ///
    /// Each returned frame is a copy; the internal buffer is reused.
    pub fn process(&mut self, input: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        if !self.active || input.is_empty() {
            return frames;
        }

        for &sample in input {
            self.buffer[self.offset] = sample;
            self.offset += 1;

            if self.offset >= self.buffer.len() {
                self.frame_count += 1;
                frames.push(AudioFrame {
                    index: self.frame_count,
                    samples: self.buffer.clone(),
                });
                self.offset = 0;
            }
        }
        frames
    }
}

enum CaptureCommand {
    Start,
    Stop,
    Samples(Vec<f32>),
    Shutdown,
}

/// Cloneable handle a device callback uses to push raw samples.
#[derive(Clone)]
pub struct SampleSink {
    tx: std_mpsc::Sender<CaptureCommand>,
}

impl SampleSink {
    /// Push one block of mono samples. Returns false once the capture thread
    /// has stopped.
    pub fn push(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }
        self.tx
            .send(CaptureCommand::Samples(samples.to_vec()))
            .is_ok()
    }
}

/// Handle to the running capture thread
pub struct CaptureThread {
    tx: Option<std_mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    /// Spawn the `frame-capturer` thread. Frames are delivered on `frames`.
    pub fn spawn(
        frame_size: usize,
        frames: mpsc::UnboundedSender<AudioFrame>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = std_mpsc::channel::<CaptureCommand>();

        let thread_handle = thread::Builder::new()
            .name("frame-capturer".to_string())
            .spawn(move || run_capture_loop(frame_size, rx, frames))?;

        debug!(frame_size, "Frame capturer thread started");

        Ok(Self {
            tx: Some(tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn sink(&self) -> Option<SampleSink> {
        self.tx.as_ref().map(|tx| SampleSink { tx: tx.clone() })
    }

    pub fn start(&self) {
        self.command(CaptureCommand::Start);
    }

    pub fn stop(&self) {
        self.command(CaptureCommand::Stop);
    }

    fn command(&self, command: CaptureCommand) {
        if let Some(tx) = &self.tx
            && tx.send(command).is_err()
        {
            warn!("Frame capturer thread is gone");
        }
    }

    /// Stop the thread and wait for it to exit. Outstanding [`SampleSink`]s
    /// start returning false.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(CaptureCommand::Shutdown);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("Frame capturer thread stopped");
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_capture_loop(
    frame_size: usize,
    rx: std_mpsc::Receiver<CaptureCommand>,
    frames: mpsc::UnboundedSender<AudioFrame>,
) {
    let mut capturer = FrameCapturer::new(frame_size);

    while let Ok(command) = rx.recv() {
        match command {
            CaptureCommand::Start => capturer.start(),
            CaptureCommand::Stop => capturer.stop(),
            CaptureCommand::Shutdown => break,
            CaptureCommand::Samples(samples) => {
                for frame in capturer.process(&samples) {
                    if frames.send(frame).is_err() {
                        // Consumer gone
                        capturer.stop();
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_full_frames_only() {
        let mut capturer = FrameCapturer::new(4);
        capturer.start();

        assert!(capturer.process(&[0.1, 0.2, 0.3]).is_empty());
        let frames = capturer.process(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(
            frames,
            vec![
                AudioFrame {
                    index: 1,
                    samples: vec![0.1, 0.2, 0.3, 0.4]
                },
                AudioFrame {
                    index: 2,
                    samples: vec![0.5, 0.6, 0.7, 0.8]
                },
            ]
        );
        assert_eq!(capturer.frame_count(), 2);
    }

    #[test]
    fn test_inactive_ignores_input() {
        let mut capturer = FrameCapturer::new(2);
        assert!(!capturer.is_active());
        assert!(capturer.process(&[1.0, 1.0, 1.0]).is_empty());

        capturer.start();
        capturer.process(&[0.5]);
        capturer.stop();
        assert!(capturer.process(&[0.5, 0.5]).is_empty());
    }

    #[test]
    fn test_start_discards_partial_frame() {
        let mut capturer = FrameCapturer::new(3);
        capturer.start();
        capturer.process(&[9.0, 9.0]);

        capturer.start();
        let frames = capturer.process(&[1.0, 2.0, 3.0]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut capturer = FrameCapturer::new(2);
        capturer.start();
        assert!(capturer.process(&[]).is_empty());
        assert_eq!(capturer.frame_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_thread_delivers_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut thread = CaptureThread::spawn(4, tx).unwrap();
        let sink = thread.sink().unwrap();

        // Not started: dropped
        assert!(sink.push(&[1.0; 4]));
        thread.start();
        assert!(sink.push(&[0.25; 6]));
        assert!(sink.push(&[0.5; 2]));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.samples, vec![0.25; 4]);
        assert_eq!(second.samples, vec![0.25, 0.25, 0.5, 0.5]);

        thread.shutdown();
        assert!(rx.recv().await.is_none());
        assert!(!sink.push(&[0.0; 4]));
    }
}
