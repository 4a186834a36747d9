//! Real sound playback via rodio.
//!
//! Each opened stream owns its own output device handle and sink; the byte
//! rate and total duration come from the WAV header when the file is a WAV,
//! with a PCM-equivalent fallback for other formats rodio can decode.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use rodio::source::Source;
use rodio::{Decoder, OutputStream, Sink};
use tracing::warn;

use baton_core::error::{BatonError, Result};

use crate::{PlaybackStream, SoundPlayer};

/// Byte rate assumed when the source is not a WAV file (44.1 kHz mono 16-bit).
const FALLBACK_BYTES_PER_SECOND: u32 = 88_200;

/// Sound player backed by the default rodio output device.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioSoundPlayer;

impl RodioSoundPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl SoundPlayer for RodioSoundPlayer {
    fn open(&self, path: &Path, volume: f32) -> Result<Box<dyn PlaybackStream>> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| BatonError::Playback(format!("failed to open output device: {e}")))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| BatonError::Playback(format!("failed to create audio sink: {e}")))?;

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| BatonError::Playback(format!("failed to decode {}: {e}", path.display())))?;

        let (bytes_per_second, total) = wav_metadata(path).unwrap_or_else(|| {
            (
                FALLBACK_BYTES_PER_SECOND,
                source.total_duration().unwrap_or_default(),
            )
        });

        sink.set_volume(volume.clamp(0.0, 1.0));
        sink.append(source);

        Ok(Box::new(RodioPlaybackStream {
            _stream: stream,
            sink,
            bytes_per_second,
            total,
        }))
    }
}

/// Byte rate and duration from a WAV header, if `path` is a readable WAV.
fn wav_metadata(path: &Path) -> Option<(u32, Duration)> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    let bytes_per_second =
        spec.sample_rate * u32::from(spec.channels) * u32::from(spec.bits_per_sample / 8);
    if bytes_per_second == 0 {
        return None;
    }
    let secs = f64::from(reader.duration()) / f64::from(spec.sample_rate);
    Some((bytes_per_second, Duration::from_secs_f64(secs)))
}

struct RodioPlaybackStream {
    // Keeps the output device alive for the lifetime of the sink.
    _stream: OutputStream,
    sink: Sink,
    bytes_per_second: u32,
    total: Duration,
}

impl PlaybackStream for RodioPlaybackStream {
    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn position_bytes(&self) -> u64 {
        (self.sink.get_pos().as_secs_f64() * f64::from(self.bytes_per_second)) as u64
    }

    fn seek_to_bytes(&mut self, pos: u64) {
        let max = (self.total.as_secs_f64() * f64::from(self.bytes_per_second)) as u64;
        let pos = pos.min(max);
        let target = Duration::from_secs_f64(pos as f64 / f64::from(self.bytes_per_second));
        if let Err(e) = self.sink.try_seek(target) {
            warn!(error = ?e, "seek not supported by source");
        }
    }

    fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    fn total_duration(&self) -> Duration {
        self.total
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}
