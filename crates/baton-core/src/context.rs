//! Shared session context: interrupt flags and subsystem busy flags.
//!
//! One `BridgeContext` is created per bridge and cloned into every controller,
//! worker loop, and completion waiter. All worker loops are cooperative: they
//! observe their flag within one poll tick, which bounds shutdown latency to
//! roughly one tick plus device teardown time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation and busy state shared across the bridge.
///
/// Cloning is cheap; all clones observe the same flags. The global interrupt
/// cascades: subsystem-scoped `*_tripped` checks report true once the global
/// flag is set, so every worker loop stops together.
#[derive(Debug, Clone, Default)]
pub struct BridgeContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    global_interrupt: AtomicBool,
    playback_interrupt: AtomicBool,
    recording_interrupt: AtomicBool,
    playback_busy: AtomicBool,
    recording_busy: AtomicBool,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global interrupt. Every worker loop observes this within one
    /// poll tick; there is no way to clear it short of restarting the bridge.
    pub fn trip_global(&self) {
        tracing::debug!("global interrupt tripped");
        self.inner.global_interrupt.store(true, Ordering::Relaxed);
    }

    pub fn global_tripped(&self) -> bool {
        self.inner.global_interrupt.load(Ordering::Relaxed)
    }

    /// Signal the active playback worker to stop.
    pub fn trip_playback(&self) {
        self.inner.playback_interrupt.store(true, Ordering::Relaxed);
    }

    /// Re-arm the playback interrupt before starting a new session.
    pub fn clear_playback(&self) {
        self.inner.playback_interrupt.store(false, Ordering::Relaxed);
    }

    /// True when the playback worker should stop (session-scoped or global).
    pub fn playback_tripped(&self) -> bool {
        self.inner.playback_interrupt.load(Ordering::Relaxed) || self.global_tripped()
    }

    /// Signal the active recording worker to stop.
    pub fn trip_recording(&self) {
        self.inner.recording_interrupt.store(true, Ordering::Relaxed);
    }

    /// Re-arm the recording interrupt before starting a new session.
    pub fn clear_recording(&self) {
        self.inner.recording_interrupt.store(false, Ordering::Relaxed);
    }

    /// True when the recording worker should stop (session-scoped or global).
    pub fn recording_tripped(&self) -> bool {
        self.inner.recording_interrupt.load(Ordering::Relaxed) || self.global_tripped()
    }

    pub fn set_playback_busy(&self, busy: bool) {
        self.inner.playback_busy.store(busy, Ordering::Relaxed);
    }

    /// True while a controlled playback session owns the player.
    pub fn playback_busy(&self) -> bool {
        self.inner.playback_busy.load(Ordering::Relaxed)
    }

    pub fn set_recording_busy(&self, busy: bool) {
        self.inner.recording_busy.store(busy, Ordering::Relaxed);
    }

    /// True while a recording session owns the capture device.
    pub fn recording_busy(&self) -> bool {
        self.inner.recording_busy.load(Ordering::Relaxed)
    }
}
