use crate::{error::CoreError, Ticket, TicketId};

/// Serialized form of a ticket as kept in the snapshot store.
pub fn encode_snapshot(ticket: &Ticket) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(ticket).map_err(|source| CoreError::EncodeSnapshot {
        ticket_id: ticket.id.clone(),
        source,
    })
}

pub fn decode_snapshot(ticket_id: &TicketId, bytes: &[u8]) -> Result<Ticket, CoreError> {
    serde_json::from_slice(bytes).map_err(|source| CoreError::CorruptSnapshot {
        ticket_id: ticket_id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let err = decode_snapshot(&TicketId::from_str("9"), b"<xml/>").unwrap_err();
        assert!(matches!(err, CoreError::CorruptSnapshot { .. }));
    }
}
