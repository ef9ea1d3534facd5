use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use canoe_core::Message;

use crate::{Delivery, QueueSource, Transport, TransportError};

/// In-memory queues for tests. Records every send and serves the sent messages back through
/// [`QueueSource`].
#[derive(Default)]
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sent: Vec<(String, Vec<Message>)>,
    ready: HashMap<String, VecDeque<Message>>,
    in_flight: HashMap<String, (String, Message)>,
    next_receipt: u64,
    sends_left: Option<usize>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch sent so far as `(queue, messages)`.
    pub fn sent(&self) -> Vec<(String, Vec<Message>)> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Messages sent to `queue`, flattened in send order.
    pub fn sent_to(&self, queue: &str) -> Vec<Message> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(q, _)| q == queue)
            .flat_map(|(_, b)| b.iter().cloned())
            .collect()
    }

    /// Let `n` more sends succeed, then fail every send.
    pub fn fail_sends_after(&self, n: usize) {
        self.inner.lock().unwrap().sends_left = Some(n);
    }

    /// Put unacknowledged messages back at the front of their queues.
    pub fn expire_in_flight(&self) {
        let mut inner = self.inner.lock().unwrap();
        let mut expired: Vec<(String, (String, Message))> = inner.in_flight.drain().collect();
        expired.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, (queue, msg)) in expired {
            inner.ready.entry(queue).or_default().push_front(msg);
        }
    }
}

impl Transport for InMemoryTransport {
    fn send_batch(&self, queue: &str, batch: &[Message]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(left) = inner.sends_left.as_mut() {
            if *left == 0 {
                return Err(TransportError::Backend { queue: queue.to_string(), detail: "send rejected".to_string() });
            }
            *left -= 1;
        }
        for m in batch {
            serde_json::to_string(&m.body).map_err(|source| TransportError::Serialize { id: m.id.clone(), source })?;
        }
        inner.sent.push((queue.to_string(), batch.to_vec()));
        inner.ready.entry(queue.to_string()).or_default().extend(batch.iter().cloned());
        Ok(())
    }
}

impl QueueSource for InMemoryTransport {
    fn receive(&self, queue: &str, max: usize) -> Result<Vec<Delivery>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let mut out = vec![];
        while out.len() < max {
            let Some(message) = inner.ready.get_mut(queue).and_then(|q| q.pop_front()) else {
                break;
            };
            inner.next_receipt += 1;
            // zero-padded so receipts sort in delivery order
            let receipt = format!("{:020}", inner.next_receipt);
            inner.in_flight.insert(receipt.clone(), (queue.to_string(), message.clone()));
            out.push(Delivery { receipt, message });
        }
        Ok(out)
    }

    fn ack(&self, _queue: &str, receipts: &[String]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        for r in receipts {
            inner.in_flight.remove(r);
        }
        Ok(())
    }

    fn depth(&self, queue: &str) -> Result<usize, TransportError> {
        let inner = self.inner.lock().unwrap();
        let ready = inner.ready.get(queue).map_or(0, VecDeque::len);
        let flying = inner.in_flight.values().filter(|(q, _)| q == queue).count();
        Ok(ready + flying)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> Message {
        Message::new(id, &serde_json::json!({ "id": id })).unwrap()
    }

    #[test]
    fn receive_returns_sent_messages_in_order() {
        let t = InMemoryTransport::new();
        t.send_batch("q", &[msg("a"), msg("b"), msg("c")]).unwrap();
        let got: Vec<String> = t.receive("q", 2).unwrap().into_iter().map(|d| d.message.id).collect();
        assert_eq!(got, vec!["a", "b"]);
        assert_eq!(t.depth("q").unwrap(), 3);
    }

    #[test]
    fn unacked_messages_come_back_after_expiry() {
        let t = InMemoryTransport::new();
        t.send_batch("q", &[msg("a"), msg("b")]).unwrap();
        let first = t.receive("q", 2).unwrap();
        t.ack("q", &[first[0].receipt.clone()]).unwrap();
        t.expire_in_flight();
        let again: Vec<String> = t.receive("q", 10).unwrap().into_iter().map(|d| d.message.id).collect();
        assert_eq!(again, vec!["b"]);
    }

    #[test]
    fn queues_are_independent() {
        let t = InMemoryTransport::new();
        t.send_batch("a", &[msg("1")]).unwrap();
        assert!(t.receive("b", 10).unwrap().is_empty());
        assert_eq!(t.sent_to("a").len(), 1);
        assert_eq!(t.depth("b").unwrap(), 0);
    }
}
