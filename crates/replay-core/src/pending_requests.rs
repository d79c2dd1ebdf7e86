//! Pending-request table (§4.9): client-side map of outstanding requests
//! awaiting a response, keyed by StreamId.

use replay_protocol::{Envelope, Event, StreamId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, thiserror::Error)]
pub enum PendingRequestError {
    #[error("request {0} timed out")]
    RequestTimeout(StreamId),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unexpected: {0}")]
    Unexpected(String),
}

type Callback = oneshot::Sender<Result<Envelope<Event>, PendingRequestError>>;

#[derive(Default)]
pub struct PendingRequestTable {
    inner: Mutex<HashMap<StreamId, Callback>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the receiving half; the caller
    /// awaits it for the matching response.
    pub fn register(&self, stream_id: StreamId) -> oneshot::Receiver<Result<Envelope<Event>, PendingRequestError>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(stream_id, tx);
        rx
    }

    /// Resolves a pending request with a successful response. Removes the
    /// entry and invokes the callback exactly once.
    pub fn resolve(&self, response: Envelope<Event>) -> bool {
        if let Some(tx) = self.inner.lock().unwrap().remove(&response.stream_id) {
            let _ = tx.send(Ok(response));
            true
        } else {
            false
        }
    }

    pub fn resolve_with_error(&self, stream_id: StreamId, err: PendingRequestError) -> bool {
        if let Some(tx) = self.inner.lock().unwrap().remove(&stream_id) {
            let _ = tx.send(Err(err));
            true
        } else {
            false
        }
    }

    /// Bulk-terminates every outstanding callback on disconnect (§5
    /// Cancellation & timeouts).
    pub fn cancel_all(&self, err: impl Fn() -> PendingRequestError) {
        let mut map = self.inner.lock().unwrap();
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(err()));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use replay_protocol::{Channel, ResponsePayload};
    use serde_json::json;

    fn make_response(stream_id: StreamId) -> Envelope<Event> {
        Envelope {
            stream_id,
            trace_id: replay_protocol::TraceId::new(),
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: 1,
            timestamp: Utc::now(),
            channel: Channel::Program,
            payload_hash: None,
            payload: replay_protocol::Event::Close {
                response: ResponsePayload {
                    service: "http".into(),
                    payload: json!({"status": 200}),
                },
            },
        }
    }

    #[tokio::test]
    async fn register_then_resolve_delivers_the_response_to_the_waiter() {
        let table = PendingRequestTable::new();
        let stream_id = StreamId::new();
        let rx = table.register(stream_id);
        assert!(table.resolve(make_response(stream_id)));
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.stream_id, stream_id);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancel_all_terminates_every_outstanding_callback_with_connection_closed() {
        let table = PendingRequestTable::new();
        let a = table.register(StreamId::new());
        let b = table.register(StreamId::new());
        table.cancel_all(|| PendingRequestError::ConnectionClosed);
        assert!(matches!(
            a.await.unwrap().unwrap_err(),
            PendingRequestError::ConnectionClosed
        ));
        assert!(matches!(
            b.await.unwrap().unwrap_err(),
            PendingRequestError::ConnectionClosed
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn resolve_of_unregistered_stream_id_is_a_no_op() {
        let table = PendingRequestTable::new();
        assert!(!table.resolve(make_response(StreamId::new())));
    }
}
