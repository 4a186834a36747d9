//! Outbound frame serialization.
//!
//! Every producer (dispatcher replies, completion waiters, the recognition
//! callback) sends through a shared [`MessageSink`]. A single writer task owns
//! the write half of the channel and drains the queue, so no two frames ever
//! interleave on the wire.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::codec::write_frame;
use crate::message::Message;

/// Clonable handle for emitting messages to the connected controller.
///
/// The sink is bound to a fresh queue for each connection and unbound on
/// disconnect; messages sent while unbound are dropped with a log line, which
/// keeps late completion waiters harmless across reconnects.
#[derive(Debug, Clone, Default)]
pub struct MessageSink {
    tx: Arc<Mutex<Option<UnboundedSender<Message>>>>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fresh outbound queue and return its receiving end for the
    /// writer task.
    pub fn bind(&self) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut guard) = self.tx.lock() {
            *guard = Some(tx);
        }
        rx
    }

    /// Detach the outbound queue. Subsequent sends are dropped.
    pub fn unbind(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            *guard = None;
        }
    }

    pub fn is_bound(&self) -> bool {
        self.tx.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Queue a message for transmission. Returns false when no controller is
    /// connected (the message is dropped).
    pub fn send(&self, message: Message) -> bool {
        let guard = match self.tx.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(message).is_err() {
                    warn!("outbound queue closed; message dropped");
                    false
                } else {
                    true
                }
            }
            None => {
                debug!("no controller connected; outbound message dropped");
                false
            }
        }
    }
}

/// Drain the outbound queue onto the channel's write half.
///
/// Exits when the sink is unbound (queue closed) or a write fails; a write
/// failure is a transport error and the read side will tear down the session.
pub async fn write_loop<W>(mut writer: W, mut rx: UnboundedReceiver<Message>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &message).await {
            warn!(error = %e, "channel write failed");
            break;
        }
        debug!(
            message_type = %message.message_type,
            message_id = %message.message_id,
            "frame sent"
        );
    }
    debug!("writer task exiting");
}
