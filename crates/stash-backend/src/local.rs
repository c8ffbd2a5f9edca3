use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use walkdir::WalkDir;

use stash_types::BackendKey;

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, ObjectReader};

const TEMP_SUFFIX: &str = ".partial";

/// Backend storing each object as a file under a root directory.
///
/// Key segments map to nested directories:
/// `{root}/ab/ab12…` for key `ab/ab12…`. Writes go to a hidden temp file in
/// the target directory and are renamed into place once complete, so readers
/// never observe a partially written object.
#[derive(Debug)]
pub struct LocalDirBackend {
    root: PathBuf,
}

impl LocalDirBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!(path = %root.display(), "opened local directory backend");
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &BackendKey) -> PathBuf {
        key.segments().fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.{}{TEMP_SUFFIX}", uuid::Uuid::now_v7().simple()))
    }

    fn not_found(key: &BackendKey, err: io::Error) -> BackendError {
        if err.kind() == io::ErrorKind::NotFound {
            BackendError::NotFound(key.clone())
        } else {
            BackendError::Io(err)
        }
    }
}

#[async_trait]
impl Backend for LocalDirBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &BackendKey, mut reader: ObjectReader, size: u64) -> BackendResult<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = Self::temp_path(&path);
        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, io::Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }
        };
        if written != size {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(BackendError::SizeMismatch {
                key: key.clone(),
                expected: size,
                actual: written,
            });
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(key = %key, size, "stored object");
        Ok(())
    }

    async fn get(&self, key: &BackendKey) -> BackendResult<ObjectReader> {
        let file = tokio::fs::File::open(self.object_path(key))
            .await
            .map_err(|e| Self::not_found(key, e))?;
        Ok(Box::new(file))
    }

    async fn remove(&self, key: &BackendKey) -> BackendResult<bool> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &BackendKey) -> BackendResult<bool> {
        Ok(tokio::fs::try_exists(self.object_path(key)).await?)
    }

    async fn size(&self, key: &BackendKey) -> BackendResult<u64> {
        let meta = tokio::fs::metadata(self.object_path(key))
            .await
            .map_err(|e| Self::not_found(key, e))?;
        Ok(meta.len())
    }

    async fn list_keys(&self) -> BackendResult<Vec<BackendKey>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_keys(&root))
            .await
            .map_err(|e| BackendError::Io(io::Error::other(e)))?
    }
}

fn scan_keys(root: &Path) -> BackendResult<Vec<BackendKey>> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        keys.push(BackendKey::new(key.join("/"))?);
    }
    keys.sort();
    Ok(keys)
}
