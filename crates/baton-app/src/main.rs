//! baton binary - composition root.
//!
//! Wires the subsystem controllers together and runs the connection session:
//! 1. Parse CLI args and load configuration from TOML
//! 2. Build the capability implementations (mocks unless a real-backend
//!    feature is enabled)
//! 3. Build the grammar coordinator, playback and recording controllers,
//!    dispatcher, and connection session
//! 4. Listen for the controller until interrupted

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use baton_audio::playback::PlaybackController;
use baton_audio::record::RecordingController;
use baton_audio::{SoundPlayer, SoundRecorder};
use baton_bridge::{ConnectionSession, Dispatcher};
use baton_core::{BatonConfig, BridgeContext};
use baton_protocol::MessageSink;
use baton_speech::grammar::GrammarCoordinator;
use baton_speech::{MockSpeechRecognizer, MockSpeechSynthesizer, SpeechSynthesizer};

fn sound_player() -> Arc<dyn SoundPlayer> {
    #[cfg(feature = "playback")]
    {
        Arc::new(baton_audio::rodio_player::RodioSoundPlayer::new())
    }
    #[cfg(not(feature = "playback"))]
    {
        Arc::new(baton_audio::MockSoundPlayer::new())
    }
}

fn sound_recorder(config: &BatonConfig) -> Arc<dyn SoundRecorder> {
    #[cfg(feature = "capture")]
    {
        Arc::new(baton_audio::cpal_recorder::CpalSoundRecorder::new(
            config.recording.sample_rate,
            config.recording.channels,
        ))
    }
    #[cfg(not(feature = "capture"))]
    {
        let _ = config;
        Arc::new(baton_audio::MockSoundRecorder::new())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = BatonConfig::load_or_default(&config_file);

    // Tracing (RUST_LOG wins over the resolved level).
    let log_level = args.resolve_log_level(&config);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!("Starting baton v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %config_file.display(), "Configuration loaded");

    let bind_addr = args.resolve_bind(&config);
    let ctx = BridgeContext::new();
    let sink = MessageSink::new();

    // Capability implementations. Recognition and synthesis have no portable
    // backend, so those stay mocked; audio gains real devices via features.
    let recognizer = Arc::new(MockSpeechRecognizer::new());
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(MockSpeechSynthesizer::new());
    let player = sound_player();
    let recorder = sound_recorder(&config);

    let grammar = Arc::new(GrammarCoordinator::new(
        recognizer,
        sink.clone(),
        ctx.clone(),
        Duration::from_millis(config.grammar.confirm_poll_ms),
        &config.grammar.end_token,
    ));
    let playback = Arc::new(PlaybackController::new(
        player,
        ctx.clone(),
        Duration::from_millis(config.playback.tick_ms),
    ));
    let recording = Arc::new(RecordingController::new(
        recorder,
        ctx.clone(),
        Duration::from_millis(config.recording.tick_ms),
    ));

    let completion_poll = Duration::from_millis(config.completion.poll_ms);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&playback),
        Arc::clone(&recording),
        Arc::clone(&grammar),
        Arc::clone(&synthesizer),
        sink.clone(),
        ctx.clone(),
        completion_poll,
    ));

    let session = Arc::new(ConnectionSession::new(
        bind_addr,
        dispatcher,
        playback,
        grammar,
        synthesizer,
        sink,
        ctx,
        completion_poll,
    ));

    let run = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    session.request_stop().await;
    recording.stop().await;
    run.await??;

    Ok(())
}
