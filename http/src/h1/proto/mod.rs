//! HTTP/1 wire-level building blocks: head parsing/encoding, buffers, and
//! body framing. Kept as leaf modules with no dependency on the channel
//! state machine or the dispatcher, mirroring how the teacher crate keeps
//! `h1/proto/*` free of task/connection concerns.

pub mod buf;
pub mod codec;
pub mod context;
pub mod error;

pub use codec::TransferCoding;
pub use context::{ConnectionType, Context};
pub use error::ProtoError;
