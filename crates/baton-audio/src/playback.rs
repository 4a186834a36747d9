//! Audio playback controller: the command queue and the 500 ms worker loop.
//!
//! At most one *controlled* session owns the player at a time; it drains a
//! FIFO command queue on each tick. Fire-and-forget sessions run the same
//! loop with no queue and answer only to the global interrupt.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use baton_core::context::BridgeContext;
use baton_core::error::{BatonError, Result};

use crate::{PlaybackStream, SoundPlayer};

/// A queued runtime command for the active playback session.
///
/// Commands are parsed from wire args at dispatch time; a malformed payload
/// never reaches the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Stop,
    Pause,
    Unpause,
    /// Move the byte cursor backwards by this many seconds of audio.
    SeekBack(u32),
    /// Move the byte cursor forwards by this many seconds of audio.
    SeekForward(u32),
    /// Move forwards by `percent` of the total duration, from the *current*
    /// position.
    SeekPercent(u32),
    SetVolume(f32),
}

impl PlayerCommand {
    /// Parse the `back` argument (seconds).
    pub fn seek_back(value: &str) -> Result<Self> {
        value
            .parse::<u32>()
            .map(PlayerCommand::SeekBack)
            .map_err(|_| BatonError::Playback(format!("could not parse back seconds '{value}'")))
    }

    /// Parse the `skip` argument (seconds).
    pub fn seek_forward(value: &str) -> Result<Self> {
        value
            .parse::<u32>()
            .map(PlayerCommand::SeekForward)
            .map_err(|_| BatonError::Playback(format!("could not parse skip seconds '{value}'")))
    }

    /// Parse the `seek` argument (percent, 0-99 inclusive).
    pub fn seek_percent(value: &str) -> Result<Self> {
        let percent = value
            .parse::<u32>()
            .map_err(|_| BatonError::Playback(format!("could not parse seek percent '{value}'")))?;
        if percent > 99 {
            return Err(BatonError::Playback(format!(
                "seek percent {percent} out of range [0,99]"
            )));
        }
        Ok(PlayerCommand::SeekPercent(percent))
    }

    /// Parse the `volume` argument.
    pub fn set_volume(value: &str) -> Result<Self> {
        value
            .parse::<f32>()
            .map(PlayerCommand::SetVolume)
            .map_err(|_| BatonError::Playback(format!("could not parse volume '{value}'")))
    }
}

/// Identity of one playback session, used in logs.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub filepath: PathBuf,
    pub volume: f32,
    pub started_at: DateTime<Utc>,
}

impl PlaybackSession {
    fn new(filepath: &Path, volume: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            filepath: filepath.to_path_buf(),
            volume,
            started_at: Utc::now(),
        }
    }

    /// Elapsed wall-clock time since the session started, in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_milliseconds() as f32 / 1000.0
    }
}

type CommandQueue = Arc<Mutex<VecDeque<PlayerCommand>>>;

/// Owns the controlled playback session, its command queue, and its worker.
pub struct PlaybackController {
    player: Arc<dyn SoundPlayer>,
    ctx: BridgeContext,
    queue: CommandQueue,
    worker: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    tick: Duration,
}

impl PlaybackController {
    pub fn new(player: Arc<dyn SoundPlayer>, ctx: BridgeContext, tick: Duration) -> Self {
        Self {
            player,
            ctx,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            worker: tokio::sync::Mutex::new(None),
            tick,
        }
    }

    /// True while a controlled session owns the player.
    pub fn is_active(&self) -> bool {
        self.ctx.playback_busy()
    }

    /// Queue a runtime command for the controlled session. Returns false when
    /// no session is active (the command is dropped).
    pub fn enqueue(&self, command: PlayerCommand) -> bool {
        if !self.is_active() {
            return false;
        }
        self.lock_queue().push_back(command);
        true
    }

    /// Start a controlled playback session.
    ///
    /// Fails when the file does not exist. Any prior controlled session is
    /// fully stopped (drain + join) first, so two controlled sessions never
    /// overlap. The device itself is opened inside the worker; an open
    /// failure logs and aborts that one session without retry.
    pub async fn start(&self, path: &Path, volume: f32) -> Result<()> {
        if !path.exists() {
            return Err(BatonError::Playback(format!(
                "file {} does not exist",
                path.display()
            )));
        }

        self.stop().await;

        self.lock_queue().clear();
        self.ctx.clear_playback();
        self.ctx.set_playback_busy(true);

        let session = PlaybackSession::new(path, volume);
        info!(
            session_id = %session.id,
            path = %session.filepath.display(),
            volume = session.volume,
            "starting controlled playback"
        );

        let player = Arc::clone(&self.player);
        let queue = Arc::clone(&self.queue);
        let ctx = self.ctx.clone();
        let tick = self.tick;
        let handle = tokio::task::spawn_blocking(move || {
            controlled_worker(&*player, session, &queue, &ctx, tick);
        });
        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    /// Start a fire-and-forget playback session. It accepts no commands and
    /// stops only on device completion or the global interrupt.
    pub fn start_detached(&self, path: &Path, volume: f32) -> Result<()> {
        if !path.exists() {
            return Err(BatonError::Playback(format!(
                "file {} does not exist",
                path.display()
            )));
        }

        let session = PlaybackSession::new(path, volume);
        info!(
            session_id = %session.id,
            path = %session.filepath.display(),
            "starting fire-and-forget playback"
        );

        let player = Arc::clone(&self.player);
        let ctx = self.ctx.clone();
        let tick = self.tick;
        tokio::task::spawn_blocking(move || {
            detached_worker(&*player, session, &ctx, tick);
        });
        Ok(())
    }

    /// Fully stop the controlled session: signal the interrupt, queue a stop
    /// for the worker, and join it. A no-op when nothing is playing.
    pub async fn stop(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            self.ctx.trip_playback();
            self.lock_queue().push_back(PlayerCommand::Stop);
            if let Err(e) = handle.await {
                error!(error = %e, "playback worker panicked; tripping global interrupt");
                self.ctx.trip_global();
                self.ctx.set_playback_busy(false);
            }
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<PlayerCommand>> {
        self.queue.lock().expect("player command queue poisoned")
    }
}

/// Worker loop for a controlled session: poll the device, then apply at most
/// one queued command per tick.
fn controlled_worker(
    player: &dyn SoundPlayer,
    session: PlaybackSession,
    queue: &CommandQueue,
    ctx: &BridgeContext,
    tick: Duration,
) {
    let mut stream = match player.open(&session.filepath, session.volume) {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                session_id = %session.id,
                path = %session.filepath.display(),
                error = %e,
                "failed to open playback device"
            );
            ctx.set_playback_busy(false);
            return;
        }
    };

    while !stream.is_finished() && !ctx.playback_tripped() {
        let command = queue
            .lock()
            .expect("player command queue poisoned")
            .pop_front();
        if let Some(command) = command {
            apply_command(stream.as_mut(), &command, ctx);
        }

        if !ctx.playback_tripped() {
            std::thread::sleep(tick);
        }
    }

    stream.stop();
    ctx.set_playback_busy(false);
    info!(
        session_id = %session.id,
        elapsed_secs = session.elapsed_secs(),
        "controlled playback finished"
    );
}

/// Worker loop for a fire-and-forget session: no queue, global interrupt only.
fn detached_worker(
    player: &dyn SoundPlayer,
    session: PlaybackSession,
    ctx: &BridgeContext,
    tick: Duration,
) {
    let mut stream = match player.open(&session.filepath, session.volume) {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                session_id = %session.id,
                path = %session.filepath.display(),
                error = %e,
                "failed to open playback device"
            );
            return;
        }
    };

    while !stream.is_finished() && !ctx.global_tripped() {
        std::thread::sleep(tick);
    }

    stream.stop();
    info!(session_id = %session.id, "fire-and-forget playback finished");
}

fn apply_command(stream: &mut dyn PlaybackStream, command: &PlayerCommand, ctx: &BridgeContext) {
    debug!(command = ?command, "player applying command");
    match command {
        PlayerCommand::Stop => ctx.trip_playback(),
        PlayerCommand::Pause => stream.pause(),
        PlayerCommand::Unpause => stream.resume(),
        PlayerCommand::SeekBack(seconds) => {
            let delta = u64::from(*seconds) * u64::from(stream.bytes_per_second());
            let target = stream.position_bytes().saturating_sub(delta);
            stream.seek_to_bytes(target);
        }
        PlayerCommand::SeekForward(seconds) => {
            let delta = u64::from(*seconds) * u64::from(stream.bytes_per_second());
            let target = stream.position_bytes().saturating_add(delta);
            stream.seek_to_bytes(target);
        }
        PlayerCommand::SeekPercent(percent) => {
            // Forward offset from the current position, not an absolute seek.
            let seconds = u64::from(*percent) * stream.total_duration().as_secs() / 100;
            let delta = seconds * u64::from(stream.bytes_per_second());
            let target = stream.position_bytes().saturating_add(delta);
            stream.seek_to_bytes(target);
        }
        PlayerCommand::SetVolume(volume) => stream.set_volume(*volume),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockSoundPlayer, MOCK_BYTES_PER_SECOND, MOCK_TOTAL_SECS};

    const TICK: Duration = Duration::from_millis(10);

    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for: {what}");
    }

    fn existing_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        path
    }

    fn controller(player: &MockSoundPlayer) -> (PlaybackController, BridgeContext) {
        let ctx = BridgeContext::new();
        let controller =
            PlaybackController::new(Arc::new(player.clone()), ctx.clone(), TICK);
        (controller, ctx)
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            PlayerCommand::seek_back("5").unwrap(),
            PlayerCommand::SeekBack(5)
        );
        assert_eq!(
            PlayerCommand::seek_forward("12").unwrap(),
            PlayerCommand::SeekForward(12)
        );
        assert_eq!(
            PlayerCommand::seek_percent("99").unwrap(),
            PlayerCommand::SeekPercent(99)
        );
        assert_eq!(
            PlayerCommand::set_volume("0.75").unwrap(),
            PlayerCommand::SetVolume(0.75)
        );
    }

    #[test]
    fn test_malformed_commands_rejected() {
        assert!(PlayerCommand::seek_back("five").is_err());
        assert!(PlayerCommand::seek_back("-3").is_err());
        assert!(PlayerCommand::seek_forward("").is_err());
        assert!(PlayerCommand::seek_percent("100").is_err());
        assert!(PlayerCommand::seek_percent("150").is_err());
        assert!(PlayerCommand::seek_percent("-1").is_err());
        assert!(PlayerCommand::set_volume("loud").is_err());
    }

    #[tokio::test]
    async fn test_start_missing_file_fails() {
        let player = MockSoundPlayer::new();
        let (controller, _ctx) = controller(&player);

        let result = controller.start(Path::new("/no/such/file.wav"), 1.0).await;
        assert!(result.is_err());
        assert!(!controller.is_active());
        assert_eq!(player.handle().opened(), 0);
    }

    #[tokio::test]
    async fn test_session_runs_until_device_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 0.8).await.unwrap();
        assert!(controller.is_active());
        assert!((handle.volume() - 0.8).abs() < f32::EPSILON);

        handle.finish();
        wait_until("session to finish", || !controller.is_active()).await;
        assert!(handle.was_stopped());
    }

    #[tokio::test]
    async fn test_stop_joins_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();
        controller.stop().await;

        assert!(!controller.is_active());
        assert!(handle.was_stopped());
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let player = MockSoundPlayer::new();
        let (controller, ctx) = controller(&player);

        controller.stop().await;
        assert!(!controller.is_active());
        assert!(!ctx.global_tripped());
    }

    #[tokio::test]
    async fn test_second_start_stops_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();
        controller.start(&path, 0.5).await.unwrap();

        // The first worker was joined before the second opened the device.
        assert_eq!(handle.opened(), 2);
        assert!(controller.is_active());

        controller.stop().await;
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_open_failure_aborts_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::failing();
        let ctx = BridgeContext::new();
        let controller = PlaybackController::new(Arc::new(player), ctx.clone(), TICK);

        controller.start(&path, 1.0).await.unwrap();
        wait_until("busy flag to clear", || !controller.is_active()).await;
        assert!(!ctx.global_tripped());
    }

    #[tokio::test]
    async fn test_pause_and_volume_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();

        assert!(controller.enqueue(PlayerCommand::Pause));
        wait_until("pause to apply", || handle.is_paused()).await;

        assert!(controller.enqueue(PlayerCommand::Unpause));
        wait_until("unpause to apply", || !handle.is_paused()).await;

        assert!(controller.enqueue(PlayerCommand::SetVolume(0.25)));
        wait_until("volume to apply", || {
            (handle.volume() - 0.25).abs() < f32::EPSILON
        })
        .await;

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_seek_commands_move_byte_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();
        let bps = u64::from(MOCK_BYTES_PER_SECOND);

        controller.enqueue(PlayerCommand::SeekForward(3));
        wait_until("skip to apply", || handle.position_bytes() == 3 * bps).await;

        controller.enqueue(PlayerCommand::SeekBack(1));
        wait_until("back to apply", || handle.position_bytes() == 2 * bps).await;

        // 10% of a 60 s stream is 6 s, applied forward from the current spot.
        controller.enqueue(PlayerCommand::SeekPercent(10));
        let expected = (2 + MOCK_TOTAL_SECS * 10 / 100) * bps;
        wait_until("seek to apply", || handle.position_bytes() == expected).await;

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_seek_back_saturates_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();
        controller.enqueue(PlayerCommand::SeekForward(1));
        let bps = u64::from(MOCK_BYTES_PER_SECOND);
        wait_until("skip to apply", || handle.position_bytes() == bps).await;

        controller.enqueue(PlayerCommand::SeekBack(30));
        wait_until("back to clamp", || handle.position_bytes() == 0).await;

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_enqueue_without_session_drops() {
        let player = MockSoundPlayer::new();
        let (controller, _ctx) = controller(&player);
        assert!(!controller.enqueue(PlayerCommand::Pause));
    }

    #[tokio::test]
    async fn test_stop_command_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, _ctx) = controller(&player);

        controller.start(&path, 1.0).await.unwrap();
        controller.enqueue(PlayerCommand::Stop);

        wait_until("stop command to end session", || !controller.is_active()).await;
        assert!(handle.was_stopped());
    }

    #[tokio::test]
    async fn test_detached_session_stops_on_global_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, ctx) = controller(&player);

        controller.start_detached(&path, 1.0).unwrap();
        wait_until("device to open", || handle.opened() == 1).await;
        assert!(!controller.is_active());

        ctx.trip_global();
        wait_until("detached worker to stop", || handle.was_stopped()).await;
    }

    #[tokio::test]
    async fn test_detached_ignores_playback_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_file(&dir);
        let player = MockSoundPlayer::new();
        let handle = player.handle();
        let (controller, ctx) = controller(&player);

        controller.start_detached(&path, 1.0).unwrap();
        wait_until("device to open", || handle.opened() == 1).await;

        // Session-scoped playback interrupt must not touch it.
        ctx.trip_playback();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.was_stopped());

        handle.finish();
        wait_until("detached worker to stop", || handle.was_stopped()).await;
    }
}
