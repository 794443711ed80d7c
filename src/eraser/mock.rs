//! Recording eraser for tests.

use super::traits::{EraseError, SecureEraser};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Unlinks files and records every erased path. Can be told to fail.
#[derive(Clone, Default)]
pub struct MockEraser {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    erased: Vec<PathBuf>,
    failing: u32,
}

impl MockEraser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` erase calls fail, leaving the file untouched.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().failing = n;
    }

    pub fn erased(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().erased.clone()
    }
}

#[async_trait]
impl SecureEraser for MockEraser {
    async fn erase(&self, path: &Path, _passes: u32) -> Result<(), EraseError> {
        {
            let mut s = self.state.lock().unwrap();
            if s.failing > 0 {
                s.failing -= 1;
                return Err(EraseError::Failed {
                    path: path.to_path_buf(),
                    message: "mock eraser failure".into(),
                });
            }
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                self.state.lock().unwrap().erased.push(path.to_path_buf());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EraseError::PathNotFound(path.to_path_buf()))
            }
            Err(source) => Err(EraseError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
