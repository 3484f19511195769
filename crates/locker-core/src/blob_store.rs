//! Filesystem blob store.
//!
//! Ciphertext lives under `{root}/encrypted_files/{doc_id}`. Writes are atomic
//! (temp file + rename) so a crash never leaves a half-written blob behind a
//! committed record.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::BlobStore;

pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    /// Create a new filesystem store with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a relative blob path, refusing anything that could escape the
    /// base directory.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let mut has_component = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => has_component = true,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "blob path must be relative without '..': {}",
                        path
                    )))
                }
            }
        }
        if !has_component {
            return Err(Error::InvalidInput("empty blob path".to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Validate that the store can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch permission errors and
    /// missing directories early.
    pub async fn validate(&self) -> Result<()> {
        let probe = ".health-check/probe.bin";
        let data = b"storage-health-check";
        self.write(probe, data).await?;
        let read_back = self.read(probe).await?;
        if read_back != data {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        self.delete(probe).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;
        Ok(())
    }
}

/// `{file name}.tmp` next to the target, so names differing only in
/// extension never share a temp file.
fn temp_path_for(full_path: &Path) -> PathBuf {
    let mut name = full_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_then_rename(
    temp_path: &Path,
    full_path: &Path,
    data: &[u8],
) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    // rw------- (owner only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    fs::rename(temp_path, full_path).await
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(storage_path = %path, size = data.len(), "blob_store: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "blob_store: create_dir_all failed");
                e
            })?;
        }

        let temp_path = temp_path_for(&full_path);
        if let Err(e) = write_then_rename(&temp_path, &full_path, data).await {
            warn!(storage_path = %path, error = %e, "blob_store: write failed");
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        temp_path = %temp_path.display(),
                        error = %cleanup,
                        "blob_store: temp file left behind"
                    );
                }
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}
