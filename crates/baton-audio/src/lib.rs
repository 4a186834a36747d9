//! baton audio crate - sound player/recorder capability traits, the playback
//! command loop, and the recording control loop.
//!
//! The native audio devices are consumed only through the traits defined
//! here. Mock implementations simulate both devices without hardware; the
//! `playback` and `capture` features add real backends (rodio / cpal).

pub mod playback;
pub mod record;

#[cfg(feature = "capture")]
pub mod cpal_recorder;
#[cfg(feature = "playback")]
pub mod rodio_player;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use baton_core::error::{BatonError, Result};

/// Capability interface for opening playback sessions on the native player.
pub trait SoundPlayer: Send + Sync {
    /// Open `path` for playback at the given volume and start playing.
    ///
    /// The returned stream is owned by exactly one worker and never crosses
    /// threads, so it need not be `Send`.
    fn open(&self, path: &Path, volume: f32) -> Result<Box<dyn PlaybackStream>>;
}

/// One playing stream on the native device.
///
/// Seeks operate on a byte cursor; implementations clamp out-of-range
/// positions rather than failing.
pub trait PlaybackStream {
    /// True once the device reports playback complete.
    fn is_finished(&self) -> bool;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Current byte position in the stream.
    fn position_bytes(&self) -> u64;

    /// Move the byte cursor, clamping to the stream bounds.
    fn seek_to_bytes(&mut self, pos: u64);

    /// Byte rate of the stream's format.
    fn bytes_per_second(&self) -> u32;

    fn total_duration(&self) -> Duration;

    fn set_volume(&mut self, volume: f32);

    /// Stop playback and release device resources.
    fn stop(&mut self);
}

/// Capability interface for the native sound recorder.
pub trait SoundRecorder: Send + Sync {
    /// Start capturing to `path`. The capture runs until the returned stream
    /// is stopped.
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingStream>>;
}

/// One active capture session on the native device.
pub trait RecordingStream {
    /// Stop the capture and close the output file.
    fn stop(&mut self) -> Result<()>;
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Byte rate reported by the mock playback stream (44.1 kHz mono 16-bit).
pub const MOCK_BYTES_PER_SECOND: u32 = 88_200;

/// Total duration reported by the mock playback stream.
pub const MOCK_TOTAL_SECS: u64 = 60;

/// Observation and control handle shared between a [`MockSoundPlayer`] and
/// the streams it opens. Tests use it to steer the device (e.g. report
/// playback finished) and to inspect what the worker did.
#[derive(Debug, Default)]
pub struct MockPlayerHandle {
    opened: AtomicUsize,
    finished: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
    position: AtomicU64,
    volume: Mutex<f32>,
}

impl MockPlayerHandle {
    /// Make the device report playback complete.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn position_bytes(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock().expect("volume mutex poisoned")
    }
}

/// Mock sound player for testing. Simulates the native device without
/// hardware; all opened streams report against one shared handle.
#[derive(Debug, Clone, Default)]
pub struct MockSoundPlayer {
    fail_open: bool,
    handle: Arc<MockPlayerHandle>,
}

impl MockSoundPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> Arc<MockPlayerHandle> {
        Arc::clone(&self.handle)
    }
}

impl SoundPlayer for MockSoundPlayer {
    fn open(&self, path: &Path, volume: f32) -> Result<Box<dyn PlaybackStream>> {
        if self.fail_open {
            return Err(BatonError::Playback(format!(
                "failed to open output device for {}",
                path.display()
            )));
        }
        self.handle.opened.fetch_add(1, Ordering::Relaxed);
        self.handle.finished.store(false, Ordering::Relaxed);
        self.handle.paused.store(false, Ordering::Relaxed);
        self.handle.stopped.store(false, Ordering::Relaxed);
        self.handle.position.store(0, Ordering::Relaxed);
        *self.handle.volume.lock().expect("volume mutex poisoned") = volume;
        Ok(Box::new(MockPlaybackStream {
            handle: Arc::clone(&self.handle),
        }))
    }
}

struct MockPlaybackStream {
    handle: Arc<MockPlayerHandle>,
}

impl PlaybackStream for MockPlaybackStream {
    fn is_finished(&self) -> bool {
        self.handle.finished.load(Ordering::Relaxed)
    }

    fn pause(&mut self) {
        self.handle.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.handle.paused.store(false, Ordering::Relaxed);
    }

    fn position_bytes(&self) -> u64 {
        self.handle.position.load(Ordering::Relaxed)
    }

    fn seek_to_bytes(&mut self, pos: u64) {
        let max = MOCK_TOTAL_SECS * u64::from(MOCK_BYTES_PER_SECOND);
        self.handle.position.store(pos.min(max), Ordering::Relaxed);
    }

    fn bytes_per_second(&self) -> u32 {
        MOCK_BYTES_PER_SECOND
    }

    fn total_duration(&self) -> Duration {
        Duration::from_secs(MOCK_TOTAL_SECS)
    }

    fn set_volume(&mut self, volume: f32) {
        *self.handle.volume.lock().expect("volume mutex poisoned") = volume;
    }

    fn stop(&mut self) {
        self.handle.stopped.store(true, Ordering::Relaxed);
    }
}

/// Observation handle shared between a [`MockSoundRecorder`] and its streams.
#[derive(Debug, Default)]
pub struct MockRecorderHandle {
    started: AtomicUsize,
    stopped: AtomicBool,
    fail_stop: AtomicBool,
}

impl MockRecorderHandle {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Make the next `stop` call fail (treated as non-fatal by the worker).
    pub fn set_stop_fails(&self, fails: bool) {
        self.fail_stop.store(fails, Ordering::Relaxed);
    }
}

/// Mock sound recorder for testing. Creates the output file on start so the
/// controller's already-exists check behaves as with a real device.
#[derive(Debug, Clone, Default)]
pub struct MockSoundRecorder {
    fail_start: bool,
    handle: Arc<MockRecorderHandle>,
}

impl MockSoundRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose `start` always fails.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> Arc<MockRecorderHandle> {
        Arc::clone(&self.handle)
    }
}

impl SoundRecorder for MockSoundRecorder {
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingStream>> {
        if self.fail_start {
            return Err(BatonError::Recording(
                "failed to open capture device".to_string(),
            ));
        }
        std::fs::File::create(path)?;
        self.handle.started.fetch_add(1, Ordering::Relaxed);
        self.handle.stopped.store(false, Ordering::Relaxed);
        Ok(Box::new(MockRecordingStream {
            handle: Arc::clone(&self.handle),
        }))
    }
}

struct MockRecordingStream {
    handle: Arc<MockRecorderHandle>,
}

impl RecordingStream for MockRecordingStream {
    fn stop(&mut self) -> Result<()> {
        if self.handle.fail_stop.load(Ordering::Relaxed) {
            return Err(BatonError::Recording(
                "capture device refused to stop".to_string(),
            ));
        }
        self.handle.stopped.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_player_open_and_steer() {
        let player = MockSoundPlayer::new();
        let handle = player.handle();

        let mut stream = player.open(Path::new("a.wav"), 0.5).unwrap();
        assert_eq!(handle.opened(), 1);
        assert!((handle.volume() - 0.5).abs() < f32::EPSILON);
        assert!(!stream.is_finished());

        handle.finish();
        assert!(stream.is_finished());

        stream.pause();
        assert!(handle.is_paused());
        stream.resume();
        assert!(!handle.is_paused());

        stream.stop();
        assert!(handle.was_stopped());
    }

    #[test]
    fn test_mock_player_seek_clamps() {
        let player = MockSoundPlayer::new();
        let mut stream = player.open(Path::new("a.wav"), 1.0).unwrap();

        stream.seek_to_bytes(1_000);
        assert_eq!(stream.position_bytes(), 1_000);

        stream.seek_to_bytes(u64::MAX);
        assert_eq!(
            stream.position_bytes(),
            MOCK_TOTAL_SECS * u64::from(MOCK_BYTES_PER_SECOND)
        );
    }

    #[test]
    fn test_mock_player_failing_open() {
        let player = MockSoundPlayer::failing();
        assert!(player.open(Path::new("a.wav"), 1.0).is_err());
        assert_eq!(player.handle().opened(), 0);
    }

    #[test]
    fn test_mock_recorder_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let recorder = MockSoundRecorder::new();
        let mut stream = recorder.start(&path).unwrap();
        assert!(path.exists());
        assert_eq!(recorder.handle().started(), 1);

        stream.stop().unwrap();
        assert!(recorder.handle().was_stopped());
    }

    #[test]
    fn test_mock_recorder_stop_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let recorder = MockSoundRecorder::new();
        let handle = recorder.handle();
        let mut stream = recorder.start(&path).unwrap();

        handle.set_stop_fails(true);
        assert!(stream.stop().is_err());
        assert!(!handle.was_stopped());
    }

    #[test]
    fn test_mock_recorder_failing_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let recorder = MockSoundRecorder::failing();
        assert!(recorder.start(&path).is_err());
        assert!(!path.exists());
    }
}
