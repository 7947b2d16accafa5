//! Collaborator seams: stream handles, the frame-sender capability, and the
//! per-stream flow-control capability.
//!
//! The byte pipes behind these traits (send/receive buffers,
//! retransmission) live in the connection layer; the streams map only
//! decides when a stream comes into existence and under which ID.

use std::sync::Arc;

use crate::error::StreamError;
use crate::protocol::{ByteCount, StreamId, Version};

/// Common surface of every stream handle.
pub trait StreamHandle: Send + Sync {
    fn stream_id(&self) -> StreamId;
}

/// Read half of a stream.
pub trait ReceiveStream: StreamHandle {
    /// Pull readable bytes into `buf`, returning how many were copied.
    fn read(&self, buf: &mut [u8]) -> Result<usize, StreamError>;
    /// Stop reading and discard anything still buffered.
    fn cancel_read(&self, error_code: u64);
}

/// Write half of a stream.
pub trait SendStream: StreamHandle {
    /// Queue bytes for transmission, returning how many were accepted.
    fn write(&self, buf: &[u8]) -> Result<usize, StreamError>;
    /// Close the write half; the peer sees a clean end of stream.
    fn close_write(&self) -> Result<(), StreamError>;
}

/// A bidirectional stream: both halves under one ID.
pub trait Stream: SendStream + ReceiveStream {
    /// Close both halves.
    fn close(&self) -> Result<(), StreamError>;
}

/// Capability handed to every stream handle for pushing frames back into
/// the connection's send path.
pub trait StreamSender: Send + Sync {
    /// Signal that `id` has data or control frames ready for the packer.
    fn on_has_stream_data(&self, id: StreamId);
    /// Signal that both halves of `id` are finalized and the upper layer
    /// may delete the stream.
    fn on_stream_completed(&self, id: StreamId);
}

/// Per-stream flow-control capability, one per stream ID.
pub trait FlowController: Send + Sync {
    /// Bytes the send half may still hand to the transport.
    fn send_window(&self) -> ByteCount;
    /// Bytes the receive half has advertised to the peer.
    fn receive_window(&self) -> ByteCount;
}

/// Factory producing one [`FlowController`] per stream ID.
pub type NewFlowController = dyn Fn(StreamId) -> Box<dyn FlowController> + Send + Sync;

/// Constructs the concrete stream handles the quadrants hand out.
///
/// Implemented by the layer that owns the stream byte pipes.
pub trait StreamConstructor: Send + Sync {
    fn new_stream(
        &self,
        id: StreamId,
        sender: Arc<dyn StreamSender>,
        flow_controller: Box<dyn FlowController>,
        version: Version,
    ) -> Arc<dyn Stream>;

    fn new_send_stream(
        &self,
        id: StreamId,
        sender: Arc<dyn StreamSender>,
        flow_controller: Box<dyn FlowController>,
        version: Version,
    ) -> Arc<dyn SendStream>;

    fn new_receive_stream(
        &self,
        id: StreamId,
        sender: Arc<dyn StreamSender>,
        flow_controller: Box<dyn FlowController>,
        version: Version,
    ) -> Arc<dyn ReceiveStream>;
}

/// Peer-advertised stream-count limits from the transport parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamLimits {
    pub max_bidi_streams: u64,
    pub max_uni_streams: u64,
}
