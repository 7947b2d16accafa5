use crate::protocol::StreamId;
use thiserror::Error;

/// Validation failure while reading or writing wire data.
///
/// Parse-side variants come from untrusted input and are treated as
/// connection errors by the packet handler. The two `Inconsistent*`
/// variants mean the local writer was handed a malformed frame — a caller
/// bug, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// The input ended before the frame was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// ACK frame contains invalid ACK ranges.
    #[error("ACK frame contains invalid ACK ranges")]
    InvalidAckRanges,
    /// The first ACK range of an ACK frame contains no packets.
    #[error("ACK frame has invalid first ACK range")]
    InvalidFirstAckRange,
    /// STREAM frame data extends past the maximum representable offset.
    #[error("data overflows maximum offset")]
    InvalidStreamData,
    /// STREAM frame carries no data and no FIN bit.
    #[error("empty STREAM frame without FIN bit")]
    EmptyStreamFrameNoFin,
    #[error("internal inconsistency: LargestAcked does not match ACK ranges")]
    InconsistentAckLargestAcked,
    #[error("internal inconsistency: LowestAcked does not match ACK ranges")]
    InconsistentAckLowestAcked,
}

impl From<std::io::Error> for WireError {
    // All wire reads are length-bounded in-memory reads; the only way they
    // fail is by running out of input.
    fn from(_: std::io::Error) -> Self {
        WireError::UnexpectedEof
    }
}

/// Stream-layer failure.
///
/// `Clone + PartialEq` so the error latched by `close_with_error` can be
/// handed back verbatim to every subsequent open or accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The peer referenced a locally-initiated stream that was never opened.
    #[error("peer attempted to open stream {0}")]
    InvalidStreamId(StreamId),
    /// The peer addressed the read half of a stream only it may read.
    #[error("peer attempted to open receive stream {0}")]
    InvalidReceiveStream(StreamId),
    /// The peer addressed the write half of a stream only it may write.
    #[error("peer attempted to open send stream {0}")]
    InvalidSendStream(StreamId),
    /// `delete_stream` was called for an ID not present in any quadrant.
    #[error("tried to delete unknown stream {0}")]
    UnknownStream(StreamId),
    /// The streams map was shut down with this reason.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
