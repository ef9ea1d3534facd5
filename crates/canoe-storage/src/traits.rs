use sha2::{Digest, Sha256};
use thiserror::Error;

use canoe_core::TicketId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot store backend error: {0}")]
    Backend(String),

    #[error("snapshot store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot for ticket {ticket_id} changed concurrently (expected etag {expected:?}, found {actual:?})")]
    Conflict {
        ticket_id: TicketId,
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// A stored snapshot plus the etag it was stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub bytes: Vec<u8>,
    pub etag: String,
}

impl StoredSnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        let etag = etag_of(&bytes);
        Self { bytes, etag }
    }
}

/// Hex SHA-256 of the snapshot bytes.
pub fn etag_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Durable per-ticket snapshot storage. Absence is a normal state (`Ok(None)`).
pub trait SnapshotStore: Send + Sync {
    fn get(&self, ticket_id: &TicketId) -> Result<Option<StoredSnapshot>, StorageError>;

    /// Unconditional overwrite; last writer wins.
    fn put(&self, ticket_id: &TicketId, bytes: &[u8]) -> Result<(), StorageError>;

    /// Write only if the current etag equals `expected` (`None` = must not exist yet).
    /// Fails with [`StorageError::Conflict`] otherwise.
    fn compare_and_put(&self, ticket_id: &TicketId, expected: Option<&str>, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove the snapshot only if its current etag equals `expected`.
    /// Fails with [`StorageError::Conflict`] otherwise, including when nothing is stored.
    fn compare_and_delete(&self, ticket_id: &TicketId, expected: &str) -> Result<(), StorageError>;

    /// Number of stored snapshots.
    fn count(&self) -> Result<usize, StorageError>;
}

pub(crate) fn conflict(ticket_id: &TicketId, expected: Option<&str>, actual: Option<&str>) -> StorageError {
    StorageError::Conflict {
        ticket_id: ticket_id.clone(),
        expected: expected.map(str::to_string),
        actual: actual.map(str::to_string),
    }
}
