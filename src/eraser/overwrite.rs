//! In-process multi-pass overwrite.
//!
//! Each pass writes random bytes over the whole file and syncs it to the
//! device; a final pass writes zeros. The file is then unlinked. Useful where
//! coreutils `shred` is not installed.

use super::traits::{EraseError, SecureEraser};
use async_trait::async_trait;
use rand::RngCore;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const CHUNK: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct OverwriteEraser;

impl OverwriteEraser {
    pub fn new() -> Self {
        Self
    }
}

fn overwrite(path: &Path, passes: u32) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    let mut buf = vec![0u8; CHUNK];
    let mut rng = rand::thread_rng();

    for pass in 0..=passes {
        let zero_pass = pass == passes;
        file.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK as u64) as usize;
            if zero_pass {
                buf[..n].fill(0);
            } else {
                rng.fill_bytes(&mut buf[..n]);
            }
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        file.sync_all()?;
    }
    drop(file);
    std::fs::remove_file(path)
}

#[async_trait]
impl SecureEraser for OverwriteEraser {
    async fn erase(&self, path: &Path, passes: u32) -> Result<(), EraseError> {
        let owned: PathBuf = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || overwrite(&owned, passes))
            .await
            .map_err(|e| EraseError::Failed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        result.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                EraseError::PathNotFound(path.to_path_buf())
            } else {
                EraseError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "overwrite"
    }
}
