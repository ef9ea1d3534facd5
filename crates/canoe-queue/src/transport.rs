use thiserror::Error;

use canoe_core::Message;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("message id {id:?} appears twice in one batch for queue {queue}")]
    DuplicateId { queue: String, id: String },

    #[error("serialize message {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("queue {queue} backend error: {detail}")]
    Backend { queue: String, detail: String },
}

/// Sending side of a queue. One call is one downstream send.
pub trait Transport: Send + Sync {
    fn send_batch(&self, queue: &str, batch: &[Message]) -> Result<(), TransportError>;
}

/// A received message plus the handle needed to acknowledge it.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub receipt: String,
    pub message: Message,
}

/// Receiving side of a queue. Received messages stay invisible until acknowledged or until
/// the backend's visibility window runs out, after which they are delivered again.
pub trait QueueSource: Send + Sync {
    fn receive(&self, queue: &str, max: usize) -> Result<Vec<Delivery>, TransportError>;
    fn ack(&self, queue: &str, receipts: &[String]) -> Result<(), TransportError>;
    /// Messages waiting or in flight.
    fn depth(&self, queue: &str) -> Result<usize, TransportError>;
}
