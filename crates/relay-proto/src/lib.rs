//! Wire protocol for the relay trading bridge.
//!
//! Frames are a 4-byte unsigned little-endian length header followed by a
//! UTF-8 JSON body of exactly that length. The body is an [`Envelope`] with
//! a closed set of message types; the maximum body size is 64 KiB.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode, encode, write_frame, FrameCodec, LEN_HEADER_BYTES, MAX_FRAME_BYTES};
pub use error::{ConnectionError, FrameError, ProtocolError};
pub use message::{Envelope, MessageType, PROTOCOL_VERSION};
