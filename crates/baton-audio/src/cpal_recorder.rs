//! Real sound capture via cpal, written to a WAV file with hound.
//!
//! The capture stream delivers f32 samples on cpal's own callback thread;
//! they are converted to 16-bit PCM and appended to the writer. Dropping the
//! stream stops capture; `stop` then finalizes the WAV header.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::warn;

use baton_core::error::{BatonError, Result};

use crate::{RecordingStream, SoundRecorder};

type SharedWriter = Arc<Mutex<Option<hound::WavWriter<BufWriter<File>>>>>;

/// Sound recorder backed by the default cpal input device.
#[derive(Debug, Clone, Copy)]
pub struct CpalSoundRecorder {
    sample_rate: u32,
    channels: u16,
}

impl Default for CpalSoundRecorder {
    fn default() -> Self {
        Self::new(44_100, 1)
    }
}

impl CpalSoundRecorder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl SoundRecorder for CpalSoundRecorder {
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingStream>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| BatonError::Recording("no default input device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| BatonError::Recording(format!("failed to create {}: {e}", path.display())))?;
        let writer: SharedWriter = Arc::new(Mutex::new(Some(writer)));

        let writer_cb = Arc::clone(&writer);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if let Ok(mut guard) = writer_cb.lock() {
                        if let Some(w) = guard.as_mut() {
                            for &sample in data {
                                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                                let _ = w.write_sample(value);
                            }
                        }
                    }
                },
                |err| warn!(error = %err, "capture stream error"),
                None,
            )
            .map_err(|e| BatonError::Recording(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| BatonError::Recording(format!("failed to start capture: {e}")))?;

        Ok(Box::new(CpalRecordingStream {
            stream: Some(stream),
            writer,
        }))
    }
}

struct CpalRecordingStream {
    stream: Option<cpal::Stream>,
    writer: SharedWriter,
}

impl RecordingStream for CpalRecordingStream {
    fn stop(&mut self) -> Result<()> {
        // Dropping the stream stops the callback before the writer goes away.
        drop(self.stream.take());

        let writer = self
            .writer
            .lock()
            .map_err(|_| BatonError::Recording("wav writer lock poisoned".to_string()))?
            .take();
        if let Some(writer) = writer {
            writer
                .finalize()
                .map_err(|e| BatonError::Recording(format!("failed to finalize wav: {e}")))?;
        }
        Ok(())
    }
}
