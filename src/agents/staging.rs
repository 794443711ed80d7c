//! Staging area for replicas awaiting erasure.
//!
//! Before anything destructive happens the replica is copied into a staging
//! directory on the same mount, hashed, and the digest recorded in the
//! ledger. A crash at any later point leaves either the intact original or a
//! verifiable staged copy.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("replica {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("staging I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Staging directory for a replica.
///
/// With a known node data directory the staging area sits at its top;
/// otherwise next to the replica. Either way it shares the replica's mount.
pub fn staging_dir(local_path: &Path, data_dir: Option<&Path>, dir_name: &str) -> PathBuf {
    match data_dir {
        Some(dir) => dir.join(dir_name),
        None => local_path
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .join(dir_name),
    }
}

/// `<staging dir>/<file name>.staged`
pub fn staged_path(staging_dir: &Path, local_path: &Path) -> PathBuf {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replica".to_string());
    staging_dir.join(format!("{}.staged", name))
}

/// Temporary sibling a copy is written to before it is renamed to `dest`.
pub fn staging_tmp_path(dest: &Path) -> PathBuf {
    dest.with_extension("staged.tmp")
}

/// Copy `source` to `dest` and return the hex SHA-256 of what was written.
///
/// The copy goes to [`staging_tmp_path`] first and is renamed into place
/// after an fsync, so `dest` either does not exist or is complete. A failed
/// copy can leave a partial temporary file behind; callers erase it.
pub async fn stage_copy(source: &Path, dest: &Path) -> Result<String, StagingError> {
    let mut input = match tokio::fs::File::open(source).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StagingError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => return Err(io_err(source)(e)),
    };

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        restrict(parent, 0o700).await?;
    }

    let tmp = staging_tmp_path(dest);
    let mut output = tokio::fs::File::create(&tmp).await.map_err(io_err(&tmp))?;
    restrict(&tmp, 0o600).await?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = input.read(&mut buf).await.map_err(io_err(source))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        output.write_all(&buf[..n]).await.map_err(io_err(&tmp))?;
    }
    output.sync_all().await.map_err(io_err(&tmp))?;
    drop(output);

    tokio::fs::rename(&tmp, dest).await.map_err(io_err(dest))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of a file, `None` if it does not exist.
pub async fn file_digest(path: &Path) -> Result<Option<String>, StagingError> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Some(hex::encode(hasher.finalize())))
}

/// Whether a path exists. Errors other than "not found" count as present so
/// callers never conclude a replica is gone when it may not be.
pub async fn exists(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(_) => true,
        Err(e) => e.kind() != std::io::ErrorKind::NotFound,
    }
}

#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StagingError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(io_err(path))
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), StagingError> {
    Ok(())
}
