//! The streams map: one demultiplexer per connection, owning the lifetime
//! of every application-visible stream.
//!
//! Streams live in four quadrants — outgoing/incoming × bidirectional/
//! unidirectional — selected by the two low bits of the stream ID and the
//! endpoint's perspective. The map performs only that dispatch; each
//! quadrant synchronizes independently.

mod handle;
mod incoming;
mod outgoing;

pub use handle::{
    FlowController, NewFlowController, ReceiveStream, SendStream, Stream, StreamConstructor,
    StreamHandle, StreamLimits, StreamSender,
};

use std::sync::Arc;

use tracing::debug;

use crate::error::StreamError;
use crate::protocol::{Perspective, StreamId, Version};
use incoming::IncomingStreamsMap;
use outgoing::OutgoingStreamsMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    OutgoingBidi,
    IncomingBidi,
    OutgoingUni,
    IncomingUni,
}

/// Demultiplexes stream IDs onto the four per-connection quadrants.
pub struct StreamsMap {
    perspective: Perspective,
    outgoing_bidi_streams: OutgoingStreamsMap<Arc<dyn Stream>>,
    incoming_bidi_streams: IncomingStreamsMap<Arc<dyn Stream>>,
    outgoing_uni_streams: OutgoingStreamsMap<Arc<dyn SendStream>>,
    incoming_uni_streams: IncomingStreamsMap<Arc<dyn ReceiveStream>>,
}

fn bidi_as_receive(stream: Arc<dyn Stream>) -> Arc<dyn ReceiveStream> {
    stream
}

fn bidi_as_send(stream: Arc<dyn Stream>) -> Arc<dyn SendStream> {
    stream
}

impl StreamsMap {
    /// Build the four quadrants with the initial IDs of `perspective`.
    ///
    /// `sender` reaches every stream handle; `new_flow_controller` is
    /// invoked once per stream ID; `constructor` builds the concrete
    /// handles.
    pub fn new(
        sender: Arc<dyn StreamSender>,
        new_flow_controller: Arc<NewFlowController>,
        constructor: Arc<dyn StreamConstructor>,
        perspective: Perspective,
        version: Version,
    ) -> Self {
        // Stream 0 is the crypto stream, handled outside the map.
        let (first_outgoing_bidi, first_incoming_bidi, first_outgoing_uni, first_incoming_uni) =
            match perspective {
                Perspective::Server => (1, 4, 3, 2),
                Perspective::Client => (4, 1, 2, 3),
            };

        let outgoing_bidi_streams = OutgoingStreamsMap::new(first_outgoing_bidi, {
            let constructor = constructor.clone();
            let sender = sender.clone();
            let new_flow_controller = new_flow_controller.clone();
            move |id| {
                constructor.new_stream(id, sender.clone(), (&*new_flow_controller)(id), version)
            }
        });
        let incoming_bidi_streams = IncomingStreamsMap::new(first_incoming_bidi, {
            let constructor = constructor.clone();
            let sender = sender.clone();
            let new_flow_controller = new_flow_controller.clone();
            move |id| {
                constructor.new_stream(id, sender.clone(), (&*new_flow_controller)(id), version)
            }
        });
        let outgoing_uni_streams = OutgoingStreamsMap::new(first_outgoing_uni, {
            let constructor = constructor.clone();
            let sender = sender.clone();
            let new_flow_controller = new_flow_controller.clone();
            move |id| {
                constructor.new_send_stream(id, sender.clone(), (&*new_flow_controller)(id), version)
            }
        });
        let incoming_uni_streams = IncomingStreamsMap::new(first_incoming_uni, {
            let constructor = constructor.clone();
            let sender = sender.clone();
            let new_flow_controller = new_flow_controller.clone();
            move |id| {
                constructor.new_receive_stream(id, sender.clone(), (&*new_flow_controller)(id), version)
            }
        });

        StreamsMap {
            perspective,
            outgoing_bidi_streams,
            incoming_bidi_streams,
            outgoing_uni_streams,
            incoming_uni_streams,
        }
    }

    fn stream_kind(&self, id: StreamId) -> StreamKind {
        match (self.perspective, id % 4) {
            (Perspective::Server, 0) => StreamKind::IncomingBidi,
            (Perspective::Server, 1) => StreamKind::OutgoingBidi,
            (Perspective::Server, 2) => StreamKind::IncomingUni,
            (Perspective::Server, _) => StreamKind::OutgoingUni,
            (Perspective::Client, 0) => StreamKind::OutgoingBidi,
            (Perspective::Client, 1) => StreamKind::IncomingBidi,
            (Perspective::Client, 2) => StreamKind::OutgoingUni,
            (Perspective::Client, _) => StreamKind::IncomingUni,
        }
    }

    /// Open the next outgoing bidirectional stream.
    pub fn open_stream(&self) -> Result<Arc<dyn Stream>, StreamError> {
        self.outgoing_bidi_streams.open_stream()
    }

    /// Like [`open_stream`](Self::open_stream); will block on the peer's
    /// stream limit once limits are enforced.
    pub fn open_stream_sync(&self) -> Result<Arc<dyn Stream>, StreamError> {
        self.open_stream()
    }

    /// Open the next outgoing unidirectional stream.
    pub fn open_uni_stream(&self) -> Result<Arc<dyn SendStream>, StreamError> {
        self.outgoing_uni_streams.open_stream()
    }

    /// Like [`open_uni_stream`](Self::open_uni_stream); will block on the
    /// peer's stream limit once limits are enforced.
    pub fn open_uni_stream_sync(&self) -> Result<Arc<dyn SendStream>, StreamError> {
        self.open_uni_stream()
    }

    /// Block until the peer opens the next bidirectional stream.
    pub fn accept_stream(&self) -> Result<Arc<dyn Stream>, StreamError> {
        self.incoming_bidi_streams.accept_stream()
    }

    /// Block until the peer opens the next unidirectional stream.
    pub fn accept_uni_stream(&self) -> Result<Arc<dyn ReceiveStream>, StreamError> {
        self.incoming_uni_streams.accept_stream()
    }

    /// Remove a fully finalized stream from its quadrant.
    pub fn delete_stream(&self, id: StreamId) -> Result<(), StreamError> {
        match self.stream_kind(id) {
            StreamKind::OutgoingBidi => self.outgoing_bidi_streams.delete_stream(id),
            StreamKind::IncomingBidi => self.incoming_bidi_streams.delete_stream(id),
            StreamKind::OutgoingUni => self.outgoing_uni_streams.delete_stream(id),
            StreamKind::IncomingUni => self.incoming_uni_streams.delete_stream(id),
        }
    }

    /// Resolve the read half for a stream ID the peer sent data on,
    /// creating incoming streams on demand.
    ///
    /// `None` means the stream existed and has already been deleted.
    pub fn get_or_open_receive_stream(
        &self,
        id: StreamId,
    ) -> Result<Option<Arc<dyn ReceiveStream>>, StreamError> {
        match self.stream_kind(id) {
            StreamKind::OutgoingBidi => Ok(self
                .outgoing_bidi_streams
                .get_stream(id)?
                .map(bidi_as_receive)),
            StreamKind::IncomingBidi => Ok(self
                .incoming_bidi_streams
                .get_or_open_stream(id)
                .map(bidi_as_receive)),
            StreamKind::IncomingUni => Ok(self.incoming_uni_streams.get_or_open_stream(id)),
            // An outgoing unidirectional stream has no read half here.
            StreamKind::OutgoingUni => Err(StreamError::InvalidReceiveStream(id)),
        }
    }

    /// Resolve the write half for a stream ID the peer referenced,
    /// creating incoming streams on demand.
    ///
    /// `None` means the stream existed and has already been deleted.
    pub fn get_or_open_send_stream(
        &self,
        id: StreamId,
    ) -> Result<Option<Arc<dyn SendStream>>, StreamError> {
        match self.stream_kind(id) {
            StreamKind::OutgoingBidi => {
                Ok(self.outgoing_bidi_streams.get_stream(id)?.map(bidi_as_send))
            }
            StreamKind::IncomingBidi => Ok(self
                .incoming_bidi_streams
                .get_or_open_stream(id)
                .map(bidi_as_send)),
            StreamKind::OutgoingUni => self.outgoing_uni_streams.get_stream(id),
            // An incoming unidirectional stream has no write half here.
            StreamKind::IncomingUni => Err(StreamError::InvalidSendStream(id)),
        }
    }

    /// Record the peer's advertised stream-count limits.
    // TODO(limits): enforce these in open_stream_sync / open_uni_stream_sync
    // instead of aliasing the non-blocking opens.
    pub fn update_limits(&self, _limits: &StreamLimits) {}

    /// Latch `err` in all four quadrants; every in-flight and future open
    /// or accept returns it.
    pub fn close_with_error(&self, err: StreamError) {
        debug!(%err, "closing streams map");
        self.outgoing_bidi_streams.close_with_error(err.clone());
        self.outgoing_uni_streams.close_with_error(err.clone());
        self.incoming_bidi_streams.close_with_error(err.clone());
        self.incoming_uni_streams.close_with_error(err);
    }
}
