//! baton speech crate - recognizer/synthesizer capability traits and the
//! grammar coordinator.
//!
//! The native speech services are consumed only through the traits defined
//! here; the bridge never assumes a concrete implementation. Mock
//! implementations are provided for testing and for running the bridge
//! without platform speech services.

pub mod grammar;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use baton_core::error::{BatonError, Result};

use crate::grammar::Grammar;

/// Shared confirmation flag for an asynchronous grammar load.
///
/// The coordinator creates a fresh gate per swap and polls it; the recognizer
/// implementation trips it (from its own thread) once the grammar is live and
/// continuous recognition has resumed.
#[derive(Debug, Clone, Default)]
pub struct LoadGate {
    confirmed: Arc<AtomicBool>,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the pending grammar load has completed.
    pub fn confirm(&self) {
        self.confirmed.store(true, Ordering::Relaxed);
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::Relaxed)
    }
}

/// Capability interface for the native speech recognizer.
///
/// Grammar replacement must follow the swap protocol: cancel any in-flight
/// recognition, unload, request an asynchronous load, then wait for the gate.
/// The [`grammar::GrammarCoordinator`] is the only caller.
pub trait SpeechRecognizer: Send + Sync {
    /// Cancel any in-flight recognition.
    fn cancel(&self);

    /// Unload the active grammar. Fails when nothing was loaded; callers
    /// treat that as non-fatal.
    fn unload(&self) -> Result<()>;

    /// Begin asynchronously loading `grammar`. The implementation confirms
    /// `gate` once the grammar is active and recognition has resumed.
    fn request_load(&self, grammar: &Grammar, gate: LoadGate) -> Result<()>;
}

/// Capability interface for the native speech synthesizer.
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking `text` asynchronously. Fails when synthesis is already
    /// in progress.
    fn synthesize(&self, text: &str) -> Result<()>;

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);

    fn in_progress(&self) -> bool;
}

// =============================================================================
// Mock implementations
// =============================================================================

#[derive(Debug, Default)]
struct MockRecognizerState {
    loaded: Option<Grammar>,
    cancels: usize,
    unloads: usize,
    pending_gate: Option<LoadGate>,
}

/// Mock recognizer for testing.
///
/// Records every cancel/unload/load and either confirms loads immediately
/// (the default) or holds them until [`confirm_pending_load`] is called, which
/// lets tests exercise the coordinator's confirmation polling.
///
/// [`confirm_pending_load`]: MockSpeechRecognizer::confirm_pending_load
#[derive(Debug)]
pub struct MockSpeechRecognizer {
    auto_confirm: bool,
    fail_unload: AtomicBool,
    state: Mutex<MockRecognizerState>,
}

impl Default for MockSpeechRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpeechRecognizer {
    /// Create a mock that confirms grammar loads immediately.
    pub fn new() -> Self {
        Self {
            auto_confirm: true,
            fail_unload: AtomicBool::new(false),
            state: Mutex::new(MockRecognizerState::default()),
        }
    }

    /// Create a mock whose loads stay pending until confirmed by the test.
    pub fn manual() -> Self {
        Self {
            auto_confirm: false,
            ..Self::new()
        }
    }

    /// Make subsequent `unload` calls fail (as when nothing is loaded).
    pub fn set_unload_fails(&self, fails: bool) {
        self.fail_unload.store(fails, Ordering::Relaxed);
    }

    pub fn loaded_grammar(&self) -> Option<Grammar> {
        self.state.lock().expect("state mutex poisoned").loaded.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().expect("state mutex poisoned").cancels
    }

    pub fn unload_count(&self) -> usize {
        self.state.lock().expect("state mutex poisoned").unloads
    }

    /// Complete a pending manual load. Returns false if none was pending.
    pub fn confirm_pending_load(&self) -> bool {
        let gate = self
            .state
            .lock()
            .expect("state mutex poisoned")
            .pending_gate
            .take();
        match gate {
            Some(gate) => {
                gate.confirm();
                true
            }
            None => false,
        }
    }
}

impl SpeechRecognizer for MockSpeechRecognizer {
    fn cancel(&self) {
        self.state.lock().expect("state mutex poisoned").cancels += 1;
    }

    fn unload(&self) -> Result<()> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.unloads += 1;
        if self.fail_unload.load(Ordering::Relaxed) {
            return Err(BatonError::Grammar("no grammar loaded".to_string()));
        }
        state.loaded = None;
        Ok(())
    }

    fn request_load(&self, grammar: &Grammar, gate: LoadGate) -> Result<()> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        state.loaded = Some(grammar.clone());
        if self.auto_confirm {
            gate.confirm();
        } else {
            state.pending_gate = Some(gate);
        }
        Ok(())
    }
}

/// Mock synthesizer for testing.
///
/// Tracks the busy flag and the spoken texts; tests drive completion via
/// [`finish`](MockSpeechSynthesizer::finish).
#[derive(Debug, Clone, Default)]
pub struct MockSpeechSynthesizer {
    busy: Arc<AtomicBool>,
    spoken: Arc<Mutex<Vec<String>>>,
}

impl MockSpeechSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the current utterance as finished.
    pub fn finish(&self) {
        self.busy.store(false, Ordering::Relaxed);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken mutex poisoned").clone()
    }
}

impl SpeechSynthesizer for MockSpeechSynthesizer {
    fn synthesize(&self, text: &str) -> Result<()> {
        if self.busy.load(Ordering::Relaxed) {
            return Err(BatonError::Synthesis(
                "synthesis already in progress".to_string(),
            ));
        }
        self.busy.store(true, Ordering::Relaxed);
        self.spoken
            .lock()
            .expect("spoken mutex poisoned")
            .push(text.to_string());
        tracing::info!(text_len = text.len(), "mock synthesis started");
        Ok(())
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn stop(&self) {
        self.busy.store(false, Ordering::Relaxed);
    }

    fn in_progress(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
