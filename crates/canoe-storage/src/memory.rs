use std::collections::HashMap;
use std::sync::Mutex;

use canoe_core::TicketId;

use crate::traits::{conflict, SnapshotStore, StorageError, StoredSnapshot};

/// In-memory snapshot store for tests. Not durable.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    snapshots: HashMap<TicketId, StoredSnapshot>,
    writes: usize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful writes, used by tests to assert that nothing was persisted.
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get(&self, ticket_id: &TicketId) -> Result<Option<StoredSnapshot>, StorageError> {
        Ok(self.inner.lock().unwrap().snapshots.get(ticket_id).cloned())
    }

    fn put(&self, ticket_id: &TicketId, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.insert(ticket_id.clone(), StoredSnapshot::new(bytes.to_vec()));
        inner.writes += 1;
        Ok(())
    }

    fn compare_and_put(&self, ticket_id: &TicketId, expected: Option<&str>, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let actual = inner.snapshots.get(ticket_id).map(|s| s.etag.as_str());
        if actual != expected {
            return Err(conflict(ticket_id, expected, actual));
        }
        inner.snapshots.insert(ticket_id.clone(), StoredSnapshot::new(bytes.to_vec()));
        inner.writes += 1;
        Ok(())
    }

    fn compare_and_delete(&self, ticket_id: &TicketId, expected: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let actual = inner.snapshots.get(ticket_id).map(|s| s.etag.as_str());
        if actual != Some(expected) {
            return Err(conflict(ticket_id, Some(expected), actual));
        }
        inner.snapshots.remove(ticket_id);
        Ok(())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.inner.lock().unwrap().snapshots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etag_of;

    #[test]
    fn test_new_store_is_empty() {
        let store = InMemorySnapshotStore::new();
        assert!(store.get(&TicketId::from_str("1")).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_put_overwrites() {
        let store = InMemorySnapshotStore::new();
        let id = TicketId::from_str("1");
        store.put(&id, b"a").unwrap();
        store.put(&id, b"b").unwrap();
        let got = store.get(&id).unwrap().unwrap();
        assert_eq!(got.bytes, b"b");
        assert_eq!(got.etag, etag_of(b"b"));
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_compare_and_put_requires_matching_etag() {
        let store = InMemorySnapshotStore::new();
        let id = TicketId::from_str("1");
        store.compare_and_put(&id, None, b"a").unwrap();

        let err = store.compare_and_put(&id, None, b"b").unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let etag = etag_of(b"a");
        store.compare_and_put(&id, Some(&etag), b"b").unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().bytes, b"b");

        let err = store.compare_and_put(&id, Some(&etag), b"c").unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_compare_and_delete_requires_matching_etag() {
        let store = InMemorySnapshotStore::new();
        let id = TicketId::from_str("1");
        assert!(store.compare_and_delete(&id, &etag_of(b"a")).is_err());

        store.put(&id, b"a").unwrap();
        assert!(store.compare_and_delete(&id, &etag_of(b"b")).is_err());
        store.compare_and_delete(&id, &etag_of(b"a")).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }
}
