//! Object storage on the local filesystem, served under a public base URL.

use async_trait::async_trait;
use bytes::Bytes;
use hobbyshare_common::storage::{ObjectStorage, StorageError, key_from_url};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalObjectStorage {
    /// Creates the root directory if it does not exist yet.
    pub async fn new(root: PathBuf, public_url: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::Io {
                key: root.display().to_string(),
                source,
            })?;

        Ok(Self {
            root,
            public_url: public_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Keys are flat object names; anything that could escape the root is refused.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(|c: char| matches!(c, '/' | '\\' | '\0'));

        if valid {
            Ok(self.root.join(key))
        } else {
            Err(StorageError::InvalidKey(key.to_owned()))
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    fn url_for(&self, name: &str) -> String {
        format!("{}/{name}", self.public_url)
    }

    fn object_key<'a>(&self, url: &'a str) -> &'a str {
        key_from_url(&self.public_url, url)
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = self.resolve(key)?;

        fs::write(&path, &data)
            .await
            .map_err(|source| StorageError::Io {
                key: key.to_owned(),
                source,
            })?;

        debug!(key, bytes = data.len(), "Wrote object");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted object");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }
}
