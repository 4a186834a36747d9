//! Completion waiters: deferred "notify when idle" replies.
//!
//! For the idle-query message types (`playerDone`, `synthesisDone`,
//! `recordDone`): if the subsystem is already idle the reply goes out
//! immediately on the dispatch path; otherwise a detached task polls the busy
//! state every 250 ms and replies once it clears. Concurrent waiters on the
//! same subsystem are independent - no dedup.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use baton_core::context::BridgeContext;
use baton_protocol::{Message, MessageSink};
use baton_speech::SpeechSynthesizer;

/// Reply `"player done"` once no controlled playback session is active.
pub fn reply_when_player_done(
    ctx: &BridgeContext,
    sink: &MessageSink,
    message: &Message,
    poll: Duration,
) {
    let reply = message.reply("player done");
    if !ctx.playback_busy() {
        sink.send(reply);
        return;
    }

    let ctx = ctx.clone();
    let sink = sink.clone();
    tokio::spawn(async move {
        while ctx.playback_busy() {
            tokio::time::sleep(poll).await;
        }
        debug!(message_id = %reply.message_id, "playback idle; sending deferred reply");
        sink.send(reply);
    });
}

/// Reply `"record done"` once no recording session is active.
pub fn reply_when_record_done(
    ctx: &BridgeContext,
    sink: &MessageSink,
    message: &Message,
    poll: Duration,
) {
    let reply = message.reply("record done");
    if !ctx.recording_busy() {
        sink.send(reply);
        return;
    }

    let ctx = ctx.clone();
    let sink = sink.clone();
    tokio::spawn(async move {
        while ctx.recording_busy() {
            tokio::time::sleep(poll).await;
        }
        debug!(message_id = %reply.message_id, "recording idle; sending deferred reply");
        sink.send(reply);
    });
}

/// Reply `"synthesis done"` once the synthesizer reports idle.
pub fn reply_when_synthesis_done(
    synthesizer: &Arc<dyn SpeechSynthesizer>,
    sink: &MessageSink,
    message: &Message,
    poll: Duration,
) {
    let reply = message.reply("synthesis done");
    if !synthesizer.in_progress() {
        sink.send(reply);
        return;
    }

    let synthesizer = Arc::clone(synthesizer);
    let sink = sink.clone();
    tokio::spawn(async move {
        wait_synthesis_idle(&synthesizer, poll).await;
        debug!(message_id = %reply.message_id, "synthesis idle; sending deferred reply");
        sink.send(reply);
    });
}

/// Poll until the synthesizer reports idle.
pub async fn wait_synthesis_idle(synthesizer: &Arc<dyn SpeechSynthesizer>, poll: Duration) {
    while synthesizer.in_progress() {
        tokio::time::sleep(poll).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
