//! Object storage for post images.

use async_trait::async_trait;
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use bytes::Bytes;
use std::fmt::Debug;
use thiserror::Error;

pub const OBJECT_NAME_RANDOM_LEN: usize = 16;
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("Object storage I/O failed for {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// An uploaded image file as received from the client.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageFile {
    /// Non-empty and declared as `image/*`.
    #[must_use]
    pub fn is_image(&self) -> bool {
        !self.data.is_empty()
            && self
                .content_type
                .as_deref()
                .is_some_and(|content_type| content_type.starts_with("image/"))
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + Debug + 'static {
    /// Collision-resistant object name that keeps the original extension.
    fn generate_unique_name(&self, file_name: &str) -> String {
        unique_object_name(file_name)
    }

    /// Public URL under which the object is served.
    fn url_for(&self, name: &str) -> String;

    /// Object key for a public URL. URLs under another base resolve to their last
    /// path segment, and inputs that are already keys are returned as-is.
    fn object_key<'a>(&self, url: &'a str) -> &'a str;

    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    /// Deleting an object that does not exist succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

#[must_use]
pub fn unique_object_name(file_name: &str) -> String {
    let random: [u8; OBJECT_NAME_RANDOM_LEN] = rand::random();
    let stem = BASE64_URL_SAFE_NO_PAD.encode(random);

    match file_extension(file_name) {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}

/// Key part of `url` relative to `public_url`, falling back to the last path segment.
#[must_use]
pub fn key_from_url<'a>(public_url: &str, url: &'a str) -> &'a str {
    if let Some(key) = url
        .strip_prefix(public_url)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        return key;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

fn file_extension(file_name: &str) -> Option<String> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|c| c.is_ascii_alphanumeric());

    valid.then(|| extension.to_ascii_lowercase())
}
