//! In-memory filesystem for tests.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// Mock filesystem: files with block locations, directories, and fault
/// switches for the locator and delete calls.
#[derive(Clone, Default)]
pub struct MockHdfs {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    files: BTreeMap<String, Vec<BlockLocation>>,
    directories: BTreeSet<String>,
    locator_down: bool,
    failing_deletes: u32,
    delete_calls: u32,
    locate_calls: u32,
}

impl MockHdfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (for test setup).
    pub fn add_file(&self, path: &str, blocks: Vec<BlockLocation>) {
        let mut s = self.state.lock().unwrap();
        s.files.insert(path.to_string(), blocks);
    }

    pub fn add_directory(&self, path: &str) {
        let mut s = self.state.lock().unwrap();
        s.directories.insert(path.to_string());
    }

    pub fn set_locator_unavailable(&self, down: bool) {
        self.state.lock().unwrap().locator_down = down;
    }

    /// Make the next `n` delete calls fail with `DeleteFailed`.
    pub fn fail_next_deletes(&self, n: u32) {
        self.state.lock().unwrap().failing_deletes = n;
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.lock().unwrap().delete_calls
    }

    pub fn locate_calls(&self) -> u32 {
        self.state.lock().unwrap().locate_calls
    }
}

#[async_trait]
impl BlockLocator for MockHdfs {
    async fn locate(&self, file_path: &str) -> Result<Vec<BlockLocation>, LocateError> {
        let mut s = self.state.lock().unwrap();
        s.locate_calls += 1;
        if s.locator_down {
            return Err(LocateError::LocatorUnavailable("mock locator down".into()));
        }
        s.files
            .get(file_path)
            .cloned()
            .ok_or_else(|| LocateError::FileNotFound(file_path.to_string()))
    }
}

#[async_trait]
impl FileSystem for MockHdfs {
    async fn stat(&self, path: &str) -> Result<Option<PathKind>, LocateError> {
        let s = self.state.lock().unwrap();
        if s.locator_down {
            return Err(LocateError::LocatorUnavailable("mock locator down".into()));
        }
        if s.directories.contains(path) {
            Ok(Some(PathKind::Directory))
        } else if s.files.contains_key(path) {
            Ok(Some(PathKind::File))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, path: &str, _skip_trash: bool) -> Result<(), DeleteError> {
        let mut s = self.state.lock().unwrap();
        s.delete_calls += 1;
        if s.failing_deletes > 0 {
            s.failing_deletes -= 1;
            return Err(DeleteError::DeleteFailed("mock delete failure".into()));
        }
        s.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| DeleteError::FileNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BlockId;

    #[tokio::test]
    async fn test_mock_lifecycle() {
        let hdfs = MockHdfs::new();
        hdfs.add_file(
            "/data/f",
            vec![BlockLocation {
                block_id: BlockId::new(1),
                replicas: vec![],
            }],
        );
        hdfs.add_directory("/data");

        assert_eq!(hdfs.stat("/data").await.unwrap(), Some(PathKind::Directory));
        assert_eq!(hdfs.stat("/data/f").await.unwrap(), Some(PathKind::File));
        assert_eq!(hdfs.locate("/data/f").await.unwrap().len(), 1);

        hdfs.fail_next_deletes(1);
        assert!(matches!(
            hdfs.delete("/data/f", true).await,
            Err(DeleteError::DeleteFailed(_))
        ));
        hdfs.delete("/data/f", true).await.unwrap();
        assert_eq!(
            hdfs.delete("/data/f", true).await,
            Err(DeleteError::FileNotFound("/data/f".into()))
        );
        assert_eq!(hdfs.delete_calls(), 3);
        assert_eq!(hdfs.stat("/data/f").await.unwrap(), None);
    }
}
