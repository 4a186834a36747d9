//! Recording controller: the stop-on-token worker loop.
//!
//! One recording session at a time. Starting a session installs a transient
//! single-choice grammar containing only the stop token (via the grammar
//! coordinator), so speaking that token substitutes for an explicit stop. The
//! worker waits on the recording interrupt; after capture stops, whatever
//! grammar was logically active before recording is restored.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use baton_core::context::BridgeContext;
use baton_core::error::{BatonError, Result};
use baton_speech::grammar::GrammarCoordinator;

use crate::SoundRecorder;

/// Identity of one recording session, used in logs.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    pub filename: PathBuf,
    pub stop_token: String,
    pub started_at: DateTime<Utc>,
}

impl RecordingSession {
    fn new(filename: &Path, stop_token: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.to_path_buf(),
            stop_token: stop_token.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Elapsed wall-clock time since the session started, in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds() as f32 / 1000.0
    }
}

/// Owns the active recording session and its worker loop.
pub struct RecordingController {
    recorder: Arc<dyn SoundRecorder>,
    ctx: BridgeContext,
    worker: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    tick: Duration,
}

impl RecordingController {
    pub fn new(recorder: Arc<dyn SoundRecorder>, ctx: BridgeContext, tick: Duration) -> Self {
        Self {
            recorder,
            ctx,
            worker: tokio::sync::Mutex::new(None),
            tick,
        }
    }

    /// True while a recording session owns the capture device.
    pub fn is_active(&self) -> bool {
        self.ctx.recording_busy()
    }

    /// Start a recording session writing to `path`, stoppable by speaking
    /// `stop_token`.
    ///
    /// Fails when the target file already exists or a session is already
    /// active; neither failure touches grammar state. The capture device is
    /// started inside the worker; a device failure logs and aborts that one
    /// session.
    pub async fn start(
        &self,
        path: &Path,
        stop_token: &str,
        grammar: &Arc<GrammarCoordinator>,
    ) -> Result<()> {
        if path.exists() {
            return Err(BatonError::Recording(format!(
                "recording {} already exists",
                path.display()
            )));
        }
        if self.is_active() {
            return Err(BatonError::Recording(
                "a recording session is already active".to_string(),
            ));
        }

        grammar.begin_recording(stop_token).await?;

        self.ctx.clear_recording();
        self.ctx.set_recording_busy(true);

        let session = RecordingSession::new(path, stop_token);
        info!(
            session_id = %session.id,
            path = %session.filename.display(),
            stop_token = %session.stop_token,
            "starting recording"
        );

        let recorder = Arc::clone(&self.recorder);
        let worker_ctx = self.ctx.clone();
        let tick = self.tick;
        let capture = tokio::task::spawn_blocking(move || {
            record_worker(&*recorder, session, &worker_ctx, tick);
        });

        // The supervisor joins the capture worker, then restores the grammar
        // that was active before recording began (or one deferred during it).
        let supervisor_ctx = self.ctx.clone();
        let grammar = Arc::clone(grammar);
        let supervisor = tokio::spawn(async move {
            if capture.await.is_err() {
                error!("recording worker panicked; tripping global interrupt");
                supervisor_ctx.trip_global();
                supervisor_ctx.set_recording_busy(false);
            }
            if let Err(e) = grammar.end_recording().await {
                warn!(error = %e, "failed to restore grammar after recording");
            }
        });
        *self.worker.lock().await = Some(supervisor);
        Ok(())
    }

    /// Signal the active session to stop and wait for it to wind down. A
    /// no-op when nothing is recording.
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            self.ctx.trip_recording();
            if let Err(e) = handle.await {
                error!(error = %e, "recording supervisor panicked");
            }
        }
    }

    /// Wait for the current session (if any) to complete, without signalling
    /// it to stop.
    pub async fn join(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "recording supervisor panicked");
            }
        }
    }
}

/// Worker loop: wait for the recording interrupt, then stop the capture
/// device. A stop failure is logged and treated as non-fatal.
fn record_worker(
    recorder: &dyn SoundRecorder,
    session: RecordingSession,
    ctx: &BridgeContext,
    tick: Duration,
) {
    let mut stream = match recorder.start(&session.filename) {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                session_id = %session.id,
                path = %session.filename.display(),
                error = %e,
                "failed to start capture device"
            );
            ctx.set_recording_busy(false);
            return;
        }
    };

    info!(session_id = %session.id, "recording in progress");

    while !ctx.recording_tripped() {
        std::thread::sleep(tick);
    }

    if let Err(e) = stream.stop() {
        warn!(error = %e, "capture device stop failed (non-fatal)");
    }

    ctx.set_recording_busy(false);
    info!(
        session_id = %session.id,
        elapsed_secs = session.elapsed_secs(),
        "recording finished"
    );
}

// =============================================================================
// Tests
// =============================================================================
