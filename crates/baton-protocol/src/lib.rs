//! baton wire protocol - message framing, parsing, and outbound serialization.
//!
//! A frame on the control channel is a little-endian `u32` length followed by
//! that many bytes of ASCII payload `">>instanceId|type|messageId|args<<"`.
//! Decode errors are frame-local: the reader logs, skips the frame, and keeps
//! reading. Transport failures escalate to session teardown.

pub mod codec;
pub mod message;
pub mod writer;

pub use codec::{decode_payload, encode, read_frame, write_frame, DecodeError, FrameError};
pub use message::Message;
pub use writer::{write_loop, MessageSink};
