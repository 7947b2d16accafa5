//! Stream multiplexing and ACK frame codec for a QUIC endpoint.

#![forbid(unsafe_code)]

pub mod error;
pub mod protocol;
pub mod wire;

pub mod streams;

pub use error::{StreamError, WireError};
pub use protocol::{Perspective, Version};
pub use streams::{
    FlowController, NewFlowController, ReceiveStream, SendStream, Stream, StreamConstructor,
    StreamHandle, StreamLimits, StreamSender, StreamsMap,
};
pub use wire::{AckFrame, AckRange};
