use thiserror::Error;

use crate::TicketId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("stored snapshot for ticket {ticket_id} is corrupt: {source}")]
    CorruptSnapshot {
        ticket_id: TicketId,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode snapshot for ticket {ticket_id}: {source}")]
    EncodeSnapshot {
        ticket_id: TicketId,
        #[source]
        source: serde_json::Error,
    },

    #[error("decode message {message_id}: {source}")]
    DecodeMessage {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode message {message_id}: {source}")]
    EncodeMessage {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },
}
