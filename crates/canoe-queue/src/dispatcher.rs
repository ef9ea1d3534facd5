use std::collections::HashSet;

use tracing::debug;

use canoe_core::Message;

use crate::{Transport, TransportError};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Splits a message sequence into consecutive batches of at most `batch_size` and sends each
/// batch in order.
pub struct BatchDispatcher<'a> {
    transport: &'a dyn Transport,
    batch_size: usize,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(transport: &'a dyn Transport, batch_size: usize) -> Result<Self, TransportError> {
        if batch_size == 0 {
            return Err(TransportError::InvalidBatchSize);
        }
        Ok(Self { transport, batch_size })
    }

    pub fn with_default_size(transport: &'a dyn Transport) -> Self {
        Self { transport, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Returns the number of sends performed; empty input performs none. A failed send
    /// aborts the remaining batches.
    pub fn dispatch(&self, queue: &str, messages: &[Message]) -> Result<usize, TransportError> {
        let mut sends = 0;
        for batch in messages.chunks(self.batch_size) {
            check_distinct_ids(queue, batch)?;
            self.transport.send_batch(queue, batch)?;
            sends += 1;
            debug!(queue, batch = sends, size = batch.len(), "batch sent");
        }
        Ok(sends)
    }
}

fn check_distinct_ids(queue: &str, batch: &[Message]) -> Result<(), TransportError> {
    let mut seen = HashSet::new();
    for m in batch {
        if !seen.insert(m.id.as_str()) {
            return Err(TransportError::DuplicateId { queue: queue.to_string(), id: m.id.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTransport;

    fn messages(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::new(i.to_string(), &serde_json::json!({ "n": i })).unwrap())
            .collect()
    }

    #[test]
    fn empty_input_sends_nothing() {
        let t = InMemoryTransport::new();
        let d = BatchDispatcher::with_default_size(&t);
        assert_eq!(d.dispatch("q", &[]).unwrap(), 0);
        assert!(t.sent().is_empty());
    }

    #[test]
    fn sends_ceil_n_over_size_batches_in_order() {
        for n in [1, 9, 10, 11, 20, 25] {
            let t = InMemoryTransport::new();
            let d = BatchDispatcher::with_default_size(&t);
            let input = messages(n);
            let sends = d.dispatch("q", &input).unwrap();
            assert_eq!(sends, n.div_ceil(10), "n={n}");

            let sent = t.sent();
            assert!(sent.iter().all(|(_, b)| !b.is_empty() && b.len() <= 10));
            let flat: Vec<Message> = sent.into_iter().flat_map(|(_, b)| b).collect();
            assert_eq!(flat, input);
        }
    }

    #[test]
    fn only_last_batch_is_short() {
        let t = InMemoryTransport::new();
        let d = BatchDispatcher::new(&t, 4).unwrap();
        d.dispatch("q", &messages(10)).unwrap();
        let sizes: Vec<usize> = t.sent().iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let t = InMemoryTransport::new();
        assert!(matches!(BatchDispatcher::new(&t, 0), Err(TransportError::InvalidBatchSize)));
    }

    #[test]
    fn duplicate_ids_in_a_batch_are_rejected_before_sending() {
        let t = InMemoryTransport::new();
        let d = BatchDispatcher::new(&t, 10).unwrap();
        let mut input = messages(3);
        input[2].id = "0".to_string();
        let err = d.dispatch("q", &input).unwrap_err();
        assert!(matches!(err, TransportError::DuplicateId { .. }));
        assert!(t.sent().is_empty());
    }

    #[test]
    fn same_id_in_different_batches_is_fine() {
        let t = InMemoryTransport::new();
        let d = BatchDispatcher::new(&t, 2).unwrap();
        let mut input = messages(4);
        input[2].id = "0".to_string();
        assert_eq!(d.dispatch("q", &input).unwrap(), 2);
    }

    #[test]
    fn failed_send_stops_dispatch() {
        let t = InMemoryTransport::new();
        t.fail_sends_after(1);
        let d = BatchDispatcher::new(&t, 2).unwrap();
        assert!(d.dispatch("q", &messages(6)).is_err());
        assert_eq!(t.sent().len(), 1);
    }
}
