use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use canoe_core::Message;
use canoe_queue::{Delivery, QueueSource, Transport, TransportError};

use crate::storage::{now_unix, open_db};

/// Local durable queues in SQLite. Received messages are leased for `visibility_secs`; a
/// message that is not acknowledged inside its lease becomes receivable again.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    visibility_secs: i64,
}

impl SqliteQueue {
    pub fn open(db_path: &Path, visibility_secs: i64) -> Result<Self> {
        Ok(Self { conn: Mutex::new(open_db(db_path)?), visibility_secs })
    }
}

fn backend(queue: &str) -> impl Fn(rusqlite::Error) -> TransportError + '_ {
    move |e| TransportError::Backend { queue: queue.to_string(), detail: e.to_string() }
}

impl Transport for SqliteQueue {
    fn send_batch(&self, queue: &str, batch: &[Message]) -> Result<(), TransportError> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let tx = conn.unchecked_transaction().map_err(backend(queue))?;
        for m in batch {
            let body = serde_json::to_string(&m.body).map_err(|source| TransportError::Serialize { id: m.id.clone(), source })?;
            tx.execute(
                "INSERT INTO queue_messages(queue, message_id, body, enqueued_at, visible_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                params![queue, m.id, body, now],
            )
            .map_err(backend(queue))?;
        }
        tx.commit().map_err(backend(queue))?;
        debug!(queue, size = batch.len(), "batch enqueued");
        Ok(())
    }
}

impl QueueSource for SqliteQueue {
    fn receive(&self, queue: &str, max: usize) -> Result<Vec<Delivery>, TransportError> {
        let conn = self.conn.lock().unwrap();
        let now = now_unix();
        let tx = conn.unchecked_transaction().map_err(backend(queue))?;

        let rows: Vec<(i64, String, String)> = {
            let mut stmt = tx
                .prepare("SELECT seq, message_id, body FROM queue_messages WHERE queue=?1 AND visible_at <= ?2 ORDER BY seq LIMIT ?3")
                .map_err(backend(queue))?;
            let rows = stmt
                .query_map(params![queue, now, max as i64], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .map_err(backend(queue))?;
            rows.collect::<Result<_, _>>().map_err(backend(queue))?
        };

        let mut out = Vec::with_capacity(rows.len());
        for (seq, id, body) in rows {
            let receipt = Uuid::new_v4().to_string();
            tx.execute(
                "UPDATE queue_messages SET receipt=?1, visible_at=?2, receive_count=receive_count+1 WHERE seq=?3",
                params![receipt, now + self.visibility_secs, seq],
            )
            .map_err(backend(queue))?;
            let body = serde_json::from_str(&body).map_err(|e| TransportError::Backend {
                queue: queue.to_string(),
                detail: format!("stored message {id} is not JSON: {e}"),
            })?;
            out.push(Delivery { receipt, message: Message { id, body } });
        }
        tx.commit().map_err(backend(queue))?;
        Ok(out)
    }

    fn ack(&self, queue: &str, receipts: &[String]) -> Result<(), TransportError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(backend(queue))?;
        for r in receipts {
            tx.execute("DELETE FROM queue_messages WHERE queue=?1 AND receipt=?2", params![queue, r])
                .map_err(backend(queue))?;
        }
        tx.commit().map_err(backend(queue))
    }

    fn depth(&self, queue: &str) -> Result<usize, TransportError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(1) FROM queue_messages WHERE queue=?1", params![queue], |r| r.get(0))
            .map_err(backend(queue))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn msg(id: &str) -> Message {
        Message::new(id, &serde_json::json!({ "ticket_id": id })).unwrap()
    }

    #[test]
    fn send_receive_ack() {
        let dir = tempdir().unwrap();
        let q = SqliteQueue::open(&dir.path().join("queues.db"), 300).unwrap();
        q.send_batch("tickets", &[msg("273"), msg("274")]).unwrap();
        assert_eq!(q.depth("tickets").unwrap(), 2);

        let got = q.receive("tickets", 10).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message, msg("273"));
        assert_eq!(got[1].message.id, "274");

        // leased messages are invisible until the lease runs out
        assert!(q.receive("tickets", 10).unwrap().is_empty());

        let receipts: Vec<String> = got.into_iter().map(|d| d.receipt).collect();
        q.ack("tickets", &receipts).unwrap();
        assert_eq!(q.depth("tickets").unwrap(), 0);
    }

    #[test]
    fn unacked_message_is_redelivered_after_lease() {
        let dir = tempdir().unwrap();
        let q = SqliteQueue::open(&dir.path().join("queues.db"), 0).unwrap();
        q.send_batch("tickets", &[msg("273")]).unwrap();
        let first = q.receive("tickets", 1).unwrap();
        let second = q.receive("tickets", 1).unwrap();
        assert_eq!(first[0].message, second[0].message);
        assert_ne!(first[0].receipt, second[0].receipt);

        // a stale receipt no longer acknowledges anything
        q.ack("tickets", &[first[0].receipt.clone()]).unwrap();
        assert_eq!(q.depth("tickets").unwrap(), 1);
    }

    #[test]
    fn receive_respects_max_and_queue() {
        let dir = tempdir().unwrap();
        let q = SqliteQueue::open(&dir.path().join("queues.db"), 300).unwrap();
        q.send_batch("a", &[msg("1"), msg("2"), msg("3")]).unwrap();
        q.send_batch("b", &[msg("9")]).unwrap();
        let got: Vec<String> = q.receive("a", 2).unwrap().into_iter().map(|d| d.message.id).collect();
        assert_eq!(got, vec!["1", "2"]);
        assert_eq!(q.receive("b", 10).unwrap().len(), 1);
    }
}
