//! The quadrant for streams this endpoint initiates.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StreamError;
use crate::protocol::StreamId;

struct OutgoingState<T> {
    streams: HashMap<StreamId, T>,
    next_stream: StreamId,
    close_err: Option<StreamError>,
}

/// Allocates sequential outgoing stream IDs and resolves peer references
/// to streams we initiated.
pub struct OutgoingStreamsMap<T> {
    state: RwLock<OutgoingState<T>>,
    new_stream: Box<dyn Fn(StreamId) -> T + Send + Sync>,
}

impl<T: Clone> OutgoingStreamsMap<T> {
    pub fn new(
        next_stream: StreamId,
        new_stream: impl Fn(StreamId) -> T + Send + Sync + 'static,
    ) -> Self {
        OutgoingStreamsMap {
            state: RwLock::new(OutgoingState {
                streams: HashMap::new(),
                next_stream,
                close_err: None,
            }),
            new_stream: Box::new(new_stream),
        }
    }

    /// Open the next outgoing stream.
    pub fn open_stream(&self) -> Result<T, StreamError> {
        let mut state = self.state.write().unwrap();
        if let Some(err) = &state.close_err {
            return Err(err.clone());
        }
        let id = state.next_stream;
        let stream = (self.new_stream)(id);
        state.streams.insert(id, stream.clone());
        state.next_stream += 4;
        Ok(stream)
    }

    /// Resolve a peer reference to a stream we initiated.
    ///
    /// Returns `None` for an ID we opened and have since deleted. An ID at
    /// or above the allocation cursor is one we never opened; the peer must
    /// not reference it.
    pub fn get_stream(&self, id: StreamId) -> Result<Option<T>, StreamError> {
        let state = self.state.read().unwrap();
        if id >= state.next_stream {
            return Err(StreamError::InvalidStreamId(id));
        }
        Ok(state.streams.get(&id).cloned())
    }

    pub fn delete_stream(&self, id: StreamId) -> Result<(), StreamError> {
        let mut state = self.state.write().unwrap();
        if state.streams.remove(&id).is_none() {
            return Err(StreamError::UnknownStream(id));
        }
        Ok(())
    }

    /// Latch `err`; every subsequent `open_stream` returns it.
    pub fn close_with_error(&self, err: StreamError) {
        let mut state = self.state.write().unwrap();
        state.close_err = Some(err);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
