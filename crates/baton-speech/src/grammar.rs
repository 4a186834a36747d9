//! Grammar coordination: the swap protocol, dictation accumulation, and
//! routing of recognition callbacks.
//!
//! All grammar mutation goes through [`GrammarCoordinator::swap`] - never by
//! direct assignment - because the recognizer delivers result callbacks on its
//! own thread, concurrently with the dispatcher. Swaps are serialized by an
//! async lock held across the load-confirmation wait; the grammar state itself
//! sits behind a short-scope mutex that the callback can take synchronously.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use baton_core::context::BridgeContext;
use baton_core::error::Result;
use baton_protocol::{Message, MessageSink};

use crate::{LoadGate, SpeechRecognizer};

/// Fixed auxiliary vocabulary loaded alongside every real grammar.
///
/// Background noise tends to produce spurious matches; giving the recognizer
/// these extra choices absorbs most of them. Matches against this list are
/// dropped before they reach the controller.
pub const DECOY_WORDS: [&str; 26] = [
    "apple",
    "bear",
    "cat",
    "dog",
    "elephant",
    "funny",
    "garden",
    "handy",
    "island",
    "jam",
    "kelp",
    "lemon",
    "melon",
    "note",
    "original",
    "pear",
    "queen",
    "raisin",
    "salad",
    "telephone",
    "umbrella",
    "victory",
    "weather",
    "xylophone",
    "yellow",
    "zebra",
];

/// True when `text` (already lower-cased and trimmed) is a decoy word.
pub fn is_decoy(text: &str) -> bool {
    DECOY_WORDS.contains(&text)
}

/// A recognition vocabulary: either a finite choice set or open dictation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grammar {
    /// Finite choice set, lower-cased and de-duplicated.
    Choices(BTreeSet<String>),
    /// Open-vocabulary dictation.
    Dictation,
}

impl Grammar {
    /// Build a choice grammar from a comma-separated list. Entries are
    /// lower-cased and de-duplicated.
    pub fn from_choice_list(list: &str) -> Self {
        let choices = list.split(',').map(|c| c.to_lowercase()).collect();
        Grammar::Choices(choices)
    }

    /// Build a single-choice grammar (used for the recording stop token).
    pub fn single(token: &str) -> Self {
        let mut choices = BTreeSet::new();
        choices.insert(token.to_lowercase());
        Grammar::Choices(choices)
    }

    /// The decoy-only baseline installed when a controller connects, before
    /// any `grammarSet` arrives.
    pub fn decoy_baseline() -> Self {
        Grammar::Choices(DECOY_WORDS.iter().map(|w| w.to_string()).collect())
    }

    pub fn is_dictation(&self) -> bool {
        matches!(self, Grammar::Dictation)
    }
}

#[derive(Debug, Default)]
struct GrammarState {
    /// The logically active grammar, updated only after a confirmed swap.
    active: Option<Grammar>,
    /// Grammar that was active when recording began, restored afterwards.
    saved: Option<Grammar>,
    /// Grammar received while recording was active; wins over `saved`.
    pending: Option<Grammar>,
    dictation_mode: bool,
    dictation_buffer: String,
    end_token: String,
}

/// Owns recognition-grammar and dictation state.
///
/// Implements the cancel -> unload -> load -> confirm swap protocol and
/// receives the recognizer's result callbacks via [`on_recognition`].
///
/// [`on_recognition`]: GrammarCoordinator::on_recognition
pub struct GrammarCoordinator {
    recognizer: std::sync::Arc<dyn SpeechRecognizer>,
    sink: MessageSink,
    ctx: BridgeContext,
    state: Mutex<GrammarState>,
    /// Serializes swaps, including across the confirmation wait.
    swap_lock: tokio::sync::Mutex<()>,
    confirm_poll: Duration,
    default_end_token: String,
}

impl GrammarCoordinator {
    pub fn new(
        recognizer: std::sync::Arc<dyn SpeechRecognizer>,
        sink: MessageSink,
        ctx: BridgeContext,
        confirm_poll: Duration,
        default_end_token: &str,
    ) -> Self {
        let state = GrammarState {
            end_token: default_end_token.to_string(),
            ..GrammarState::default()
        };
        Self {
            recognizer,
            sink,
            ctx,
            state: Mutex::new(state),
            swap_lock: tokio::sync::Mutex::new(()),
            confirm_poll,
            default_end_token: default_end_token.to_string(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GrammarState> {
        self.state.lock().expect("grammar state mutex poisoned")
    }

    /// Replace the active grammar via the swap protocol.
    ///
    /// Ordering matters: cancelling in-flight recognition before the unload
    /// avoids the recognizer processing input against a grammar that is
    /// mid-replacement. The unload may fail when nothing was loaded; that is
    /// logged and the swap proceeds to the load step.
    pub async fn swap(&self, grammar: Grammar) -> Result<()> {
        let _serialized = self.swap_lock.lock().await;

        self.recognizer.cancel();
        if let Err(e) = self.recognizer.unload() {
            warn!(error = %e, "grammar unload failed (nothing loaded?)");
        }

        let gate = LoadGate::new();
        self.recognizer.request_load(&grammar, gate.clone())?;

        // The load completes on the recognizer's own callback thread; poll
        // the gate until it signals completion.
        while !gate.is_confirmed() {
            tokio::time::sleep(self.confirm_poll).await;
        }

        debug!(dictation = grammar.is_dictation(), "grammar swap confirmed");
        self.lock_state().active = Some(grammar);
        Ok(())
    }

    /// Handle a `grammarSet` message. Empty args selects the open dictation
    /// vocabulary; otherwise the args are a comma-separated choice list.
    ///
    /// While a recording session is active the new grammar is remembered but
    /// the swap is deferred until the recording ends - the transient
    /// stop-token grammar takes precedence.
    pub async fn set_grammar(&self, choice_list: &str) -> Result<()> {
        let grammar = if choice_list.is_empty() {
            Grammar::Dictation
        } else {
            Grammar::from_choice_list(choice_list)
        };

        if self.ctx.recording_busy() {
            info!("recording active; grammar swap deferred until recording ends");
            self.lock_state().pending = Some(grammar);
            return Ok(());
        }

        self.swap(grammar).await
    }

    /// Enter dictation mode: swap in the open vocabulary, reset the
    /// accumulator, and record the end token.
    pub async fn start_dictation(&self, end_token: &str) -> Result<()> {
        {
            let mut state = self.lock_state();
            state.end_token = end_token.to_string();
            state.dictation_mode = true;
            state.dictation_buffer.clear();
        }
        info!(end_token = %end_token, "dictation mode starting");
        self.swap(Grammar::Dictation).await
    }

    /// Install the transient single-choice stop-token grammar for a recording
    /// session, remembering whatever was active before.
    pub async fn begin_recording(&self, stop_token: &str) -> Result<()> {
        {
            let mut state = self.lock_state();
            state.saved = state.active.clone();
        }
        self.swap(Grammar::single(stop_token)).await
    }

    /// Restore the grammar after a recording session ends: a `grammarSet`
    /// received mid-recording wins over the grammar saved at recording start.
    pub async fn end_recording(&self) -> Result<()> {
        let restore = {
            let mut state = self.lock_state();
            state.pending.take().or_else(|| state.saved.take())
        };

        match restore {
            Some(grammar) => {
                info!("restoring grammar after recording");
                self.swap(grammar).await
            }
            None => {
                // Nothing to restore; drop the stop-token grammar.
                self.recognizer.cancel();
                if let Err(e) = self.recognizer.unload() {
                    warn!(error = %e, "grammar unload failed (nothing loaded?)");
                }
                self.lock_state().active = None;
                Ok(())
            }
        }
    }

    /// Install the decoy-only baseline grammar (done once per connection).
    pub async fn install_baseline(&self) -> Result<()> {
        self.swap(Grammar::decoy_baseline()).await
    }

    /// Reset all grammar state on session teardown: cancel recognition,
    /// unload, and clear dictation mode.
    pub fn reset(&self) {
        self.recognizer.cancel();
        if let Err(e) = self.recognizer.unload() {
            warn!(error = %e, "grammar unload failed (nothing loaded?)");
        }
        let mut state = self.lock_state();
        state.active = None;
        state.saved = None;
        state.pending = None;
        state.dictation_mode = false;
        state.dictation_buffer.clear();
        state.end_token = self.default_end_token.clone();
    }

    /// Recognition-result callback, invoked per utterance on the recognizer's
    /// own thread, concurrently with the dispatcher.
    pub fn on_recognition(&self, text: &str) {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return;
        }

        if is_decoy(&text) {
            debug!(text = %text, "decoy match dropped");
            return;
        }

        // Any match while recording is the stop signal; no message is emitted.
        if self.ctx.recording_busy() {
            info!(text = %text, "stop token recognized; signalling recording");
            self.ctx.trip_recording();
            return;
        }

        let result = {
            let mut state = self.lock_state();
            if state.dictation_mode {
                state.dictation_buffer.push(' ');
                state.dictation_buffer.push_str(&text);

                let end_token = state.end_token.to_lowercase();
                if !state.dictation_buffer.contains(&end_token) {
                    return;
                }

                let result = state.dictation_buffer.trim().to_string();
                state.dictation_mode = false;
                state.dictation_buffer.clear();
                state.active = None;
                Some(result)
            } else {
                None
            }
        };

        match result {
            Some(dictation) => {
                info!(text_len = dictation.len(), "dictation complete");
                self.sink
                    .send(Message::recognition("dictationResult", &dictation));
                if let Err(e) = self.recognizer.unload() {
                    warn!(error = %e, "grammar unload failed (nothing loaded?)");
                }
            }
            None => {
                // Single-choice mode reports only the first whitespace-
                // delimited token, even for multi-word matches.
                if let Some(first) = text.split_whitespace().next() {
                    self.sink.send(Message::recognition("grammarMatch", first));
                }
            }
        }
    }

    /// The logically active grammar, if any.
    pub fn active_grammar(&self) -> Option<Grammar> {
        self.lock_state().active.clone()
    }

    /// True while dictation mode is accumulating utterances.
    pub fn dictation_mode(&self) -> bool {
        self.lock_state().dictation_mode
    }
}

// =============================================================================
// Tests
// =============================================================================
