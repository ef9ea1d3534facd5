use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use canoe_core::TicketId;

use crate::traits::{conflict, SnapshotStore, StorageError, StoredSnapshot};

/// Snapshot store laid out like an object-storage bucket: `<root>/tickets/<id>.json`.
///
/// Writes go through a temporary file and a rename so readers never see a partial
/// snapshot. Conditional writes are serialized within the process only.
pub struct FsSnapshotStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsSnapshotStore {
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root.join("tickets"))?;
        Ok(Self { root: root.to_path_buf(), write_lock: Mutex::new(()) })
    }

    fn key_path(&self, ticket_id: &TicketId) -> Result<PathBuf, StorageError> {
        let id = ticket_id.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StorageError::Backend(format!("invalid ticket id {id:?}")));
        }
        Ok(self.root.join("tickets").join(format!("{id}.json")))
    }

    fn read(&self, path: &Path) -> Result<Option<StoredSnapshot>, StorageError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(StoredSnapshot::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn get(&self, ticket_id: &TicketId) -> Result<Option<StoredSnapshot>, StorageError> {
        let path = self.key_path(ticket_id)?;
        let found = self.read(&path)?;
        if found.is_none() {
            info!(%ticket_id, path = %path.display(), "no snapshot found");
        }
        Ok(found)
    }

    fn put(&self, ticket_id: &TicketId, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.key_path(ticket_id)?;
        let _guard = self.write_lock.lock().unwrap();
        self.write(&path, bytes)
    }

    fn compare_and_put(&self, ticket_id: &TicketId, expected: Option<&str>, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.key_path(ticket_id)?;
        let _guard = self.write_lock.lock().unwrap();
        let current = self.read(&path)?;
        let actual = current.as_ref().map(|s| s.etag.as_str());
        if actual != expected {
            return Err(conflict(ticket_id, expected, actual));
        }
        self.write(&path, bytes)
    }

    fn compare_and_delete(&self, ticket_id: &TicketId, expected: &str) -> Result<(), StorageError> {
        let path = self.key_path(ticket_id)?;
        let _guard = self.write_lock.lock().unwrap();
        let current = self.read(&path)?;
        let actual = current.as_ref().map(|s| s.etag.as_str());
        if actual != Some(expected) {
            return Err(conflict(ticket_id, Some(expected), actual));
        }
        std::fs::remove_file(&path)?;
        debug!(path = %path.display(), "snapshot removed");
        Ok(())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let mut n = 0;
        for entry in std::fs::read_dir(self.root.join("tickets"))? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                n += 1;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etag_of;
    use tempfile::tempdir;

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        assert!(store.get(&TicketId::from_str("273")).unwrap().is_none());
    }

    #[test]
    fn put_then_get_uses_bucket_layout() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        let id = TicketId::from_str("273");
        store.put(&id, b"{}").unwrap();
        assert!(dir.path().join("tickets").join("273.json").exists());
        assert_eq!(store.get(&id).unwrap().unwrap().bytes, b"{}");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn conditional_write_detects_concurrent_change() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        let id = TicketId::from_str("273");
        store.compare_and_put(&id, None, b"v1").unwrap();
        store.put(&id, b"v2-from-elsewhere").unwrap();

        let err = store.compare_and_put(&id, Some(&etag_of(b"v1")), b"v3").unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.get(&id).unwrap().unwrap().bytes, b"v2-from-elsewhere");
    }

    #[test]
    fn conditional_delete_only_removes_expected_version() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        let id = TicketId::from_str("273");
        store.put(&id, b"v1").unwrap();

        assert!(store.compare_and_delete(&id, &etag_of(b"v0")).is_err());
        store.compare_and_delete(&id, &etag_of(b"v1")).unwrap();
        assert!(!dir.path().join("tickets").join("273.json").exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        assert!(store.get(&TicketId::from_str("../etc")).is_err());
        assert!(store.put(&TicketId::from_str("a/b"), b"x").is_err());
    }
}
