//! # parley-protocol
//!
//! Wire entities and framing for the Parley messaging backend.
//!
//! This crate defines what travels between Parley clients and the server:
//!
//! - `Message` - A single entry of a conversation log
//! - `ClientFrame` - Frames sent by clients (liveness pings)
//! - `ServerFrame` - Frames pushed by the server (new messages, pongs)
//!
//! Browser clients speak JSON over WebSocket text frames. Native clients may
//! use the length-prefixed MessagePack encoding over binary frames instead.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientFrame};
//!
//! let frame = ClientFrame::ping("alice");
//! let text = codec::encode_text(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode_text(&text).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod message;

pub use codec::ProtocolError;
pub use frames::{ClientFrame, FrameType, ServerFrame};
pub use message::{Message, MessageId};
