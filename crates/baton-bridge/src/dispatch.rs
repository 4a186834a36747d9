//! Command dispatch: maps a parsed message's type to a subsystem handler.
//!
//! Routing is a closed enumeration of command kinds; unknown types are logged
//! and ignored. Dispatch runs inline on the read-loop task, so incoming
//! messages are handled strictly in arrival order; handlers hand long-running
//! work to a controller's worker or a completion waiter.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use baton_audio::playback::{PlaybackController, PlayerCommand};
use baton_audio::record::RecordingController;
use baton_core::context::BridgeContext;
use baton_core::error::Result;
use baton_protocol::{Message, MessageSink};
use baton_speech::grammar::GrammarCoordinator;
use baton_speech::SpeechSynthesizer;

use crate::waiters;

/// Every message type the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Break,
    SynthesisPause,
    SynthesisResume,
    Play,
    PlayAsync,
    PlayerDone,
    SynthesisDone,
    RecordDone,
    Pause,
    Unpause,
    Stop,
    Back,
    Skip,
    Seek,
    Volume,
    Create,
    Delete,
    Record,
    StartDictation,
    SpeechSynth,
    GrammarSet,
}

impl CommandKind {
    /// Look up a wire message type. Returns `None` for unknown types, which
    /// the dispatcher logs and ignores.
    pub fn from_type(message_type: &str) -> Option<Self> {
        match message_type {
            "break" => Some(CommandKind::Break),
            "synthesisPause" => Some(CommandKind::SynthesisPause),
            "synthesisResume" => Some(CommandKind::SynthesisResume),
            "play" => Some(CommandKind::Play),
            "playAsync" => Some(CommandKind::PlayAsync),
            "playerDone" => Some(CommandKind::PlayerDone),
            "synthesisDone" => Some(CommandKind::SynthesisDone),
            "recordDone" => Some(CommandKind::RecordDone),
            "pause" => Some(CommandKind::Pause),
            "unpause" => Some(CommandKind::Unpause),
            "stop" => Some(CommandKind::Stop),
            "back" => Some(CommandKind::Back),
            "skip" => Some(CommandKind::Skip),
            "seek" => Some(CommandKind::Seek),
            "volume" => Some(CommandKind::Volume),
            "create" => Some(CommandKind::Create),
            "delete" => Some(CommandKind::Delete),
            "record" => Some(CommandKind::Record),
            "startDictation" => Some(CommandKind::StartDictation),
            "speechSynth" => Some(CommandKind::SpeechSynth),
            "grammarSet" => Some(CommandKind::GrammarSet),
            _ => None,
        }
    }

    /// The wire spelling of this command.
    pub fn as_type(&self) -> &'static str {
        match self {
            CommandKind::Break => "break",
            CommandKind::SynthesisPause => "synthesisPause",
            CommandKind::SynthesisResume => "synthesisResume",
            CommandKind::Play => "play",
            CommandKind::PlayAsync => "playAsync",
            CommandKind::PlayerDone => "playerDone",
            CommandKind::SynthesisDone => "synthesisDone",
            CommandKind::RecordDone => "recordDone",
            CommandKind::Pause => "pause",
            CommandKind::Unpause => "unpause",
            CommandKind::Stop => "stop",
            CommandKind::Back => "back",
            CommandKind::Skip => "skip",
            CommandKind::Seek => "seek",
            CommandKind::Volume => "volume",
            CommandKind::Create => "create",
            CommandKind::Delete => "delete",
            CommandKind::Record => "record",
            CommandKind::StartDictation => "startDictation",
            CommandKind::SpeechSynth => "speechSynth",
            CommandKind::GrammarSet => "grammarSet",
        }
    }
}

/// Routes messages to the subsystem controllers.
pub struct Dispatcher {
    playback: Arc<PlaybackController>,
    recording: Arc<RecordingController>,
    grammar: Arc<GrammarCoordinator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: MessageSink,
    ctx: BridgeContext,
    completion_poll: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        playback: Arc<PlaybackController>,
        recording: Arc<RecordingController>,
        grammar: Arc<GrammarCoordinator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: MessageSink,
        ctx: BridgeContext,
        completion_poll: Duration,
    ) -> Self {
        Self {
            playback,
            recording,
            grammar,
            synthesizer,
            sink,
            ctx,
            completion_poll,
        }
    }

    /// Handle one incoming message.
    pub async fn dispatch(&self, message: Message) {
        let Some(kind) = CommandKind::from_type(&message.message_type) else {
            warn!(
                message_type = %message.message_type,
                message_id = %message.message_id,
                "unknown message type ignored"
            );
            return;
        };

        debug!(
            command = kind.as_type(),
            instance_id = %message.instance_id,
            message_id = %message.message_id,
            args = %message.args,
            "dispatching"
        );

        match kind {
            CommandKind::Break => self.synthesizer.stop(),
            CommandKind::SynthesisPause => self.synthesizer.pause(),
            CommandKind::SynthesisResume => self.synthesizer.resume(),

            CommandKind::Play => self.handle_play(&message).await,
            CommandKind::PlayAsync => self.handle_play_async(&message),

            CommandKind::PlayerDone => {
                waiters::reply_when_player_done(
                    &self.ctx,
                    &self.sink,
                    &message,
                    self.completion_poll,
                );
            }
            CommandKind::SynthesisDone => {
                waiters::reply_when_synthesis_done(
                    &self.synthesizer,
                    &self.sink,
                    &message,
                    self.completion_poll,
                );
            }
            CommandKind::RecordDone => {
                waiters::reply_when_record_done(
                    &self.ctx,
                    &self.sink,
                    &message,
                    self.completion_poll,
                );
            }

            CommandKind::Pause => self.enqueue_player(Ok(PlayerCommand::Pause)),
            CommandKind::Unpause => self.enqueue_player(Ok(PlayerCommand::Unpause)),
            CommandKind::Stop => {
                if self.playback.is_active() {
                    self.playback.stop().await;
                } else {
                    debug!("stop with no active playback session ignored");
                }
            }
            CommandKind::Back => {
                self.enqueue_player(PlayerCommand::seek_back(self.first_field(&message)));
            }
            CommandKind::Skip => {
                self.enqueue_player(PlayerCommand::seek_forward(self.first_field(&message)));
            }
            CommandKind::Seek => {
                self.enqueue_player(PlayerCommand::seek_percent(self.first_field(&message)));
            }
            CommandKind::Volume => {
                self.enqueue_player(PlayerCommand::set_volume(self.first_field(&message)));
            }

            CommandKind::Create => self.create_node(self.first_field(&message)),
            CommandKind::Delete => self.delete_node(self.first_field(&message)),

            CommandKind::Record => self.handle_record(&message).await,
            CommandKind::StartDictation => {
                let end_token = message.arg_fields()[0].to_string();
                if let Err(e) = self.grammar.start_dictation(&end_token).await {
                    warn!(error = %e, "failed to start dictation");
                }
            }
            CommandKind::SpeechSynth => {
                if self.synthesizer.in_progress() {
                    warn!("cannot synthesize: synthesis already in progress");
                } else if let Err(e) = self.synthesizer.synthesize(&message.args) {
                    warn!(error = %e, "synthesis failed");
                }
            }
            CommandKind::GrammarSet => {
                if let Err(e) = self.grammar.set_grammar(&message.args).await {
                    warn!(error = %e, "failed to set grammar");
                }
            }
        }
    }

    fn first_field<'m>(&self, message: &'m Message) -> &'m str {
        message.args.split(',').next().unwrap_or("")
    }

    async fn handle_play(&self, message: &Message) {
        let Some((path, volume)) = self.parse_play_args(message) else {
            return;
        };
        if let Err(e) = self.playback.start(Path::new(path), volume).await {
            warn!(error = %e, "play rejected");
        }
    }

    fn handle_play_async(&self, message: &Message) {
        let Some((path, volume)) = self.parse_play_args(message) else {
            return;
        };
        if let Err(e) = self.playback.start_detached(Path::new(path), volume) {
            warn!(error = %e, "playAsync rejected");
        }
    }

    /// Parse `filepath,volume` args shared by `play` and `playAsync`.
    fn parse_play_args<'m>(&self, message: &'m Message) -> Option<(&'m str, f32)> {
        let fields = message.arg_fields();
        let path = fields.first().copied().unwrap_or("");
        let Some(volume_field) = fields.get(1) else {
            warn!(args = %message.args, "play args missing volume field");
            return None;
        };
        match volume_field.parse::<f32>() {
            Ok(volume) => Some((path, volume)),
            Err(_) => {
                warn!(volume = %volume_field, "could not parse volume field");
                None
            }
        }
    }

    async fn handle_record(&self, message: &Message) {
        let fields = message.arg_fields();
        if fields.len() < 2 {
            warn!(args = %message.args, "record args require filename,stopToken");
            return;
        }
        if let Err(e) = self
            .recording
            .start(Path::new(fields[0]), fields[1], &self.grammar)
            .await
        {
            warn!(error = %e, "record rejected");
        }
    }

    /// Queue a parsed player command; malformed payloads are dropped here and
    /// never reach the worker.
    fn enqueue_player(&self, parsed: Result<PlayerCommand>) {
        match parsed {
            Ok(command) => {
                if !self.playback.enqueue(command) {
                    debug!("no active playback session; command dropped");
                }
            }
            Err(e) => warn!(error = %e, "malformed player command dropped"),
        }
    }

    fn create_node(&self, path: &str) {
        if let Err(e) = std::fs::create_dir_all(path) {
            warn!(path = %path, error = %e, "create failed");
        }
    }

    /// Delete a directory (non-recursively), or a file only when it is a
    /// `.wav`.
    fn delete_node(&self, path: &str) {
        let node = Path::new(path);
        if node.is_dir() {
            if let Err(e) = std::fs::remove_dir(node) {
                warn!(path = %path, error = %e, "delete directory failed");
            }
        } else if node.is_file() && path.ends_with(".wav") {
            if let Err(e) = std::fs::remove_file(node) {
                warn!(path = %path, error = %e, "delete file failed");
            }
        } else {
            debug!(path = %path, "delete target not found or not deletable");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use baton_audio::{MockSoundPlayer, MockSoundRecorder};
    use baton_speech::grammar::Grammar;
    use baton_speech::{MockSpeechRecognizer, MockSpeechSynthesizer};

    const POLL: Duration = Duration::from_millis(10);
    const TICK: Duration = Duration::from_millis(10);

    struct Fixture {
        dispatcher: Dispatcher,
        sink: MessageSink,
        ctx: BridgeContext,
        playback: Arc<PlaybackController>,
        recognizer: Arc<MockSpeechRecognizer>,
        synthesizer: Arc<MockSpeechSynthesizer>,
        player: MockSoundPlayer,
        recorder: MockSoundRecorder,
    }

    fn fixture() -> Fixture {
        let ctx = BridgeContext::new();
        let sink = MessageSink::new();
        let recognizer = Arc::new(MockSpeechRecognizer::new());
        let synthesizer = Arc::new(MockSpeechSynthesizer::new());
        let player = MockSoundPlayer::new();
        let recorder = MockSoundRecorder::new();

        let grammar = Arc::new(GrammarCoordinator::new(
            recognizer.clone(),
            sink.clone(),
            ctx.clone(),
            POLL,
            "end dictation",
        ));
        let playback = Arc::new(PlaybackController::new(
            Arc::new(player.clone()),
            ctx.clone(),
            TICK,
        ));
        let recording = Arc::new(RecordingController::new(
            Arc::new(recorder.clone()),
            ctx.clone(),
            TICK,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&playback),
            recording,
            grammar,
            synthesizer.clone(),
            sink.clone(),
            ctx.clone(),
            POLL,
        );

        Fixture {
            dispatcher,
            sink,
            ctx,
            playback,
            recognizer,
            synthesizer,
            player,
            recorder,
        }
    }

    fn msg(message_type: &str, args: &str) -> Message {
        Message::new("1", message_type, "9", args)
    }

    #[test]
    fn test_command_kind_table_covers_wire_types() {
        let wire_types = [
            "break",
            "synthesisPause",
            "synthesisResume",
            "play",
            "playAsync",
            "playerDone",
            "synthesisDone",
            "recordDone",
            "pause",
            "unpause",
            "stop",
            "back",
            "skip",
            "seek",
            "volume",
            "create",
            "delete",
            "record",
            "startDictation",
            "speechSynth",
            "grammarSet",
        ];
        for wire_type in wire_types {
            let kind = CommandKind::from_type(wire_type)
                .unwrap_or_else(|| panic!("missing mapping for {wire_type}"));
            assert_eq!(kind.as_type(), wire_type);
        }
        assert_eq!(CommandKind::from_type("launchMissiles"), None);
        assert_eq!(CommandKind::from_type(""), None);
        // Routing is case-sensitive, as on the wire.
        assert_eq!(CommandKind::from_type("Play"), None);
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let f = fixture();
        let mut rx = f.sink.bind();
        f.dispatcher.dispatch(msg("teleport", "now")).await;
        assert!(rx.try_recv().is_err());
        assert!(!f.ctx.global_tripped());
    }

    #[tokio::test]
    async fn test_grammar_set_routes_to_coordinator() {
        let f = fixture();
        f.dispatcher.dispatch(msg("grammarSet", "Yes,No,yes")).await;
        assert_eq!(
            f.recognizer.loaded_grammar(),
            Some(Grammar::from_choice_list("yes,no"))
        );
    }

    #[tokio::test]
    async fn test_speech_synth_rejected_while_in_progress() {
        let f = fixture();
        f.dispatcher.dispatch(msg("speechSynth", "first sentence")).await;
        f.dispatcher.dispatch(msg("speechSynth", "second sentence")).await;
        assert_eq!(f.synthesizer.spoken(), vec!["first sentence"]);
    }

    #[tokio::test]
    async fn test_break_stops_synthesis() {
        let f = fixture();
        f.dispatcher.dispatch(msg("speechSynth", "talking")).await;
        assert!(f.synthesizer.in_progress());
        f.dispatcher.dispatch(msg("break", "")).await;
        assert!(!f.synthesizer.in_progress());
    }

    #[tokio::test]
    async fn test_player_done_replies_immediately_when_idle() {
        let f = fixture();
        let mut rx = f.sink.bind();
        f.dispatcher.dispatch(msg("playerDone", "")).await;
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.args, "player done");
        assert_eq!(reply.message_id, "9");
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let f = fixture();
        let mut rx = f.sink.bind();
        f.dispatcher.dispatch(msg("stop", "")).await;
        assert!(rx.try_recv().is_err());
        assert!(!f.ctx.global_tripped());
    }

    #[tokio::test]
    async fn test_play_with_unparseable_volume_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let f = fixture();
        f.dispatcher
            .dispatch(msg("play", &format!("{},loud", path.display())))
            .await;
        assert!(!f.playback.is_active());
        assert_eq!(f.player.handle().opened(), 0);
    }

    #[tokio::test]
    async fn test_play_then_stop_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let f = fixture();
        f.dispatcher
            .dispatch(msg("play", &format!("{},0.5", path.display())))
            .await;
        assert!(f.playback.is_active());

        f.dispatcher.dispatch(msg("stop", "")).await;
        assert!(!f.playback.is_active());
        assert!(f.player.handle().was_stopped());
    }

    #[tokio::test]
    async fn test_malformed_seek_never_reaches_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let f = fixture();
        f.dispatcher
            .dispatch(msg("play", &format!("{},1.0", path.display())))
            .await;

        // Out-of-range percent and junk seconds are dropped at dispatch.
        f.dispatcher.dispatch(msg("seek", "150")).await;
        f.dispatcher.dispatch(msg("back", "soon")).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(f.player.handle().position_bytes(), 0);

        f.dispatcher.dispatch(msg("stop", "")).await;
    }

    #[tokio::test]
    async fn test_record_with_missing_stop_token_is_dropped() {
        let f = fixture();
        f.dispatcher.dispatch(msg("record", "only-a-filename.wav")).await;
        assert!(!f.ctx.recording_busy());
        assert_eq!(f.recorder.handle().started(), 0);
    }

    #[tokio::test]
    async fn test_record_existing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let f = fixture();
        f.dispatcher
            .dispatch(msg("record", &format!("{},halt", path.display())))
            .await;
        assert!(!f.ctx.recording_busy());
        assert_eq!(f.recognizer.loaded_grammar(), None);
    }

    #[tokio::test]
    async fn test_start_dictation_enters_dictation_mode() {
        let f = fixture();
        f.dispatcher.dispatch(msg("startDictation", "end note")).await;
        assert_eq!(f.recognizer.loaded_grammar(), Some(Grammar::Dictation));
    }

    #[tokio::test]
    async fn test_create_and_delete_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("node");

        let f = fixture();
        f.dispatcher
            .dispatch(msg("create", &target.display().to_string()))
            .await;
        assert!(target.is_dir());

        f.dispatcher
            .dispatch(msg("delete", &target.display().to_string()))
            .await;
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_delete_only_removes_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        let txt = dir.path().join("notes.txt");
        std::fs::write(&wav, b"RIFF").unwrap();
        std::fs::write(&txt, b"hello").unwrap();

        let f = fixture();
        f.dispatcher
            .dispatch(msg("delete", &wav.display().to_string()))
            .await;
        f.dispatcher
            .dispatch(msg("delete", &txt.display().to_string()))
            .await;

        assert!(!wav.exists());
        assert!(txt.exists());
    }
}
