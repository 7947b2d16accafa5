//! The quadrant for streams the peer initiates.
//!
//! The peer creates streams implicitly: referencing an ID also creates
//! every lower ID of the same kind that does not exist yet. Consumers pull
//! them out in creation order through a blocking accept.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

use tracing::trace;

use crate::error::StreamError;
use crate::protocol::StreamId;

struct IncomingState<T> {
    streams: HashMap<StreamId, T>,
    /// ID the next `accept_stream` will return.
    next_stream: StreamId,
    /// Highest ID the peer has referenced so far.
    highest_stream: StreamId,
    close_err: Option<StreamError>,
}

/// Lazily materializes peer-initiated streams and hands them out in strict
/// ID order.
pub struct IncomingStreamsMap<T> {
    state: Mutex<IncomingState<T>>,
    cond: Condvar,
    new_stream: Box<dyn Fn(StreamId) -> T + Send + Sync>,
}

impl<T: Clone> IncomingStreamsMap<T> {
    pub fn new(
        next_stream: StreamId,
        new_stream: impl Fn(StreamId) -> T + Send + Sync + 'static,
    ) -> Self {
        IncomingStreamsMap {
            state: Mutex::new(IncomingState {
                streams: HashMap::new(),
                next_stream,
                highest_stream: 0,
                close_err: None,
            }),
            cond: Condvar::new(),
            new_stream: Box::new(new_stream),
        }
    }

    /// Block until the stream with the next ID in this quadrant exists,
    /// then return it. Successive calls return IDs 4 apart, ascending.
    pub fn accept_stream(&self) -> Result<T, StreamError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(err) = &state.close_err {
                return Err(err.clone());
            }
            if let Some(stream) = state.streams.get(&state.next_stream) {
                let stream = stream.clone();
                state.next_stream += 4;
                return Ok(stream);
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Return the stream for `id`, creating it — and every missing lower ID
    /// of this quadrant — if the peer has not referenced it before.
    ///
    /// `None` means the stream existed and has already been deleted.
    pub fn get_or_open_stream(&self, id: StreamId) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        // An ID at or below the high-water mark either still exists in the
        // map or was deleted after being accepted.
        if id <= state.highest_stream {
            return state.streams.get(&id).cloned();
        }

        let start = if state.highest_stream == 0 {
            state.next_stream
        } else {
            state.highest_stream + 4
        };
        let mut new_id = start;
        while new_id <= id {
            trace!(stream_id = new_id, "creating incoming stream");
            let stream = (self.new_stream)(new_id);
            state.streams.insert(new_id, stream);
            // One waiter per created stream; accept re-checks the cursor.
            self.cond.notify_one();
            new_id += 4;
        }
        state.highest_stream = id;
        state.streams.get(&id).cloned()
    }

    pub fn delete_stream(&self, id: StreamId) -> Result<(), StreamError> {
        let mut state = self.state.lock().unwrap();
        if state.streams.remove(&id).is_none() {
            return Err(StreamError::UnknownStream(id));
        }
        Ok(())
    }

    /// Latch `err` and wake every blocked accepter.
    pub fn close_with_error(&self, err: StreamError) {
        let mut state = self.state.lock().unwrap();
        state.close_err = Some(err);
        drop(state);
        // All accepters must observe the latched error, so wake them all.
        self.cond.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn new_map(first: StreamId) -> IncomingStreamsMap<StreamId> {
        IncomingStreamsMap::new(first, |id| id)
    }

    #[test]
    fn get_or_open_creates_requested_stream() {
        let m = new_map(2);
        assert_eq!(m.get_or_open_stream(2), Some(2));
    }

    #[test]
    fn get_or_open_creates_all_intermediate_streams() {
        let m = new_map(2);
        assert_eq!(m.get_or_open_stream(10), Some(10));
        // 2 and 6 were created along the way.
        assert_eq!(m.get_or_open_stream(2), Some(2));
        assert_eq!(m.get_or_open_stream(6), Some(6));
    }

    #[test]
    fn factory_invoked_once_per_stream() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let m = IncomingStreamsMap::new(2, move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            id
        });
        m.get_or_open_stream(10);
        assert_eq!(created.load(Ordering::SeqCst), 3);
        // Re-requesting existing IDs creates nothing new.
        m.get_or_open_stream(6);
        m.get_or_open_stream(10);
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn accept_returns_streams_in_order() {
        let m = new_map(2);
        m.get_or_open_stream(10);
        assert_eq!(m.accept_stream().unwrap(), 2);
        assert_eq!(m.accept_stream().unwrap(), 6);
        assert_eq!(m.accept_stream().unwrap(), 10);
    }

    #[test]
    fn accept_blocks_until_stream_exists() {
        let m = Arc::new(new_map(3));
        let accepter = {
            let m = m.clone();
            thread::spawn(move || m.accept_stream())
        };
        // Give the accepter time to block.
        thread::sleep(Duration::from_millis(50));
        m.get_or_open_stream(3);
        assert_eq!(accepter.join().unwrap().unwrap(), 3);
    }

    #[test]
    fn get_or_open_returns_none_for_deleted_stream() {
        let m = new_map(2);
        m.get_or_open_stream(6);
        m.delete_stream(2).unwrap();
        assert_eq!(m.get_or_open_stream(2), None);
        // The other stream is untouched.
        assert_eq!(m.get_or_open_stream(6), Some(6));
    }

    #[test]
    fn delete_unknown_stream_errors() {
        let m = new_map(2);
        assert_eq!(m.delete_stream(2), Err(StreamError::UnknownStream(2)));
    }

    #[test]
    fn close_fails_pending_and_future_accepts() {
        let m = Arc::new(new_map(2));
        let err = StreamError::ConnectionClosed("test error".into());

        let pending = {
            let m = m.clone();
            thread::spawn(move || m.accept_stream())
        };
        thread::sleep(Duration::from_millis(50));
        m.close_with_error(err.clone());

        assert_eq!(pending.join().unwrap(), Err(err.clone()));
        assert_eq!(m.accept_stream(), Err(err));
    }

    #[test]
    fn close_wakes_all_blocked_accepters() {
        let m = Arc::new(new_map(2));
        let err = StreamError::ConnectionClosed("test error".into());

        let accepters: Vec<_> = (0..2)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || m.accept_stream())
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        m.close_with_error(err.clone());

        for accepter in accepters {
            assert_eq!(accepter.join().unwrap(), Err(err.clone()));
        }
    }
}
