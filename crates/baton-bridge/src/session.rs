//! Connection session: owns the control-channel lifecycle.
//!
//! `Listening -> Connected -> Reading -> Disconnected -> Listening` in a
//! loop, with a terminal `Stopped` reachable only through an explicit global
//! stop. Frame-local decode errors are skipped; a transport failure tears the
//! connection down, force-stops playback, waits out any in-flight synthesis,
//! resets grammar state, and re-enters `Listening`.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use baton_audio::playback::PlaybackController;
use baton_core::context::BridgeContext;
use baton_core::error::{BatonError, Result};
use baton_protocol::{read_frame, write_loop, MessageSink};
use baton_speech::grammar::GrammarCoordinator;
use baton_speech::SpeechSynthesizer;

use crate::dispatch::Dispatcher;
use crate::waiters::wait_synthesis_idle;

/// Lifecycle state of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Connected,
    Reading,
    Disconnected,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Reading => write!(f, "Reading"),
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Owns the duplex channel lifecycle: accept, read loop, teardown, re-listen.
pub struct ConnectionSession {
    bind_addr: String,
    dispatcher: Arc<Dispatcher>,
    playback: Arc<PlaybackController>,
    grammar: Arc<GrammarCoordinator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: MessageSink,
    ctx: BridgeContext,
    completion_poll: Duration,
    state: Mutex<SessionState>,
}

impl ConnectionSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bind_addr: String,
        dispatcher: Arc<Dispatcher>,
        playback: Arc<PlaybackController>,
        grammar: Arc<GrammarCoordinator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: MessageSink,
        ctx: BridgeContext,
        completion_poll: Duration,
    ) -> Self {
        Self {
            bind_addr,
            dispatcher,
            playback,
            grammar,
            synthesizer,
            sink,
            ctx,
            completion_poll,
            state: Mutex::new(SessionState::Listening),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state mutex poisoned")
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().expect("session state mutex poisoned");
        if *state != next {
            debug!(from = %state, to = %next, "session state transition");
            *state = next;
        }
    }

    /// Bind the listener and run the accept/read loop until globally stopped.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            BatonError::Channel(format!("failed to bind {}: {e}", self.bind_addr))
        })?;
        info!(addr = %self.bind_addr, "listening for controller");
        self.run_with_listener(listener).await
    }

    /// Run the accept/read loop on an already-bound listener.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        while !self.ctx.global_tripped() {
            self.set_state(SessionState::Listening);
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed; retrying");
                    tokio::time::sleep(self.completion_poll).await;
                    continue;
                }
            };

            // The accept may have been unblocked by the shutdown self-connect.
            if self.ctx.global_tripped() {
                break;
            }

            info!(peer = %peer, "controller connected");
            self.set_state(SessionState::Connected);
            self.serve_connection(stream).await;
            self.teardown().await;

            if !self.ctx.global_tripped() {
                info!("re-entering listen state");
            }
        }

        // Global stop: join the playback worker and settle synthesis before
        // reporting Stopped.
        self.playback.stop().await;
        wait_synthesis_idle(&self.synthesizer, self.completion_poll).await;
        self.grammar.reset();
        self.set_state(SessionState::Stopped);
        info!("session stopped");
        Ok(())
    }

    /// Serve one connected controller until EOF, transport failure, or global
    /// stop.
    pub async fn serve_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let rx = self.sink.bind();
        let writer_task = tokio::spawn(write_loop(writer, rx));

        // Give the recognizer a vocabulary before the first grammarSet.
        if let Err(e) = self.grammar.install_baseline().await {
            warn!(error = %e, "failed to install baseline grammar");
        }

        self.set_state(SessionState::Reading);
        loop {
            tokio::select! {
                frame = read_frame(&mut reader) => match frame {
                    Ok(Some(message)) => self.dispatcher.dispatch(message).await,
                    Ok(None) => {
                        info!("controller closed the channel");
                        break;
                    }
                    Err(e) if e.is_frame_local() => {
                        warn!(error = %e, "bad frame skipped");
                    }
                    Err(e) => {
                        warn!(error = %e, "channel read failed");
                        break;
                    }
                },
                _ = poll_global_interrupt(&self.ctx, self.completion_poll) => {
                    info!("global stop observed; closing channel");
                    break;
                }
            }
        }

        self.sink.unbind();
        writer_task.abort();
        self.set_state(SessionState::Disconnected);
    }

    /// Post-disconnect cleanup: force-stop playback, wait for synthesis to
    /// finish, and reset all grammar/dictation state.
    async fn teardown(&self) {
        self.playback.stop().await;
        wait_synthesis_idle(&self.synthesizer, self.completion_poll).await;
        self.grammar.reset();
        info!("session teardown complete");
    }

    /// Request a global stop: trip the interrupt and unblock a pending accept
    /// with a short self-connect (the accept call itself blocks).
    pub async fn request_stop(&self) {
        info!("global stop requested");
        self.ctx.trip_global();
        if let Ok(stream) = TcpStream::connect(&self.bind_addr).await {
            drop(stream);
        }
    }
}

async fn poll_global_interrupt(ctx: &BridgeContext, poll: Duration) {
    while !ctx.global_tripped() {
        tokio::time::sleep(poll).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
