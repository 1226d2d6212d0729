//! Blob stores
//!
//! A [`BlobStore`] is the key-value capability the connection sits on:
//! exists / get / put / delete / list / head over relative keys. Payloads
//! are opaque bytes here; serialization happens above this layer.

mod fs;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra request headers, by name
pub type Headers = BTreeMap<String, String>;

/// A lazy, finite sequence of relative keys
pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// Content type reported when a writer did not set one
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// Canned ACL applied to written objects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    #[default]
    Private,
    PublicRead,
}

impl Acl {
    pub fn from_public(public: bool) -> Self {
        if public {
            Acl::PublicRead
        } else {
            Acl::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

/// Settings for a single write
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub acl: Acl,
    pub headers: Headers,
}

impl PutOptions {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Metadata of a stored object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_language: Option<String>,
    pub content_encoding: Option<String>,
    pub content_length: u64,
    pub etag: Option<String>,
    pub acl: Option<Acl>,
}

impl ObjectMeta {
    /// Metadata a local store records for a write
    pub fn for_write(data: &[u8], options: &PutOptions, now: DateTime<Utc>) -> Self {
        ObjectMeta {
            content_type: Some(
                options
                    .header("Content-Type")
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string(),
            ),
            last_modified: Some(now),
            content_language: options.header("Content-Language").map(str::to_string),
            content_encoding: options.header("Content-Encoding").map(str::to_string),
            content_length: data.len() as u64,
            etag: Some(content_digest(data)),
            acl: Some(options.acl),
        }
    }
}

/// BLAKE3 hex digest used as the etag by local stores
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

/// One page of a paginated listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub keys: Vec<String>,
    /// Token for the following page; `None` on the last page
    pub next: Option<String>,
}

/// Keys of a paginated listing, fetched one page at a time
///
/// `fetch` receives the continuation token (`None` for the first page) and
/// is only called again once the previous page has been consumed. After a
/// failed fetch the iterator yields the error and then ends.
pub struct Pages<F> {
    fetch: F,
    pending: std::vec::IntoIter<String>,
    token: Option<String>,
    done: bool,
}

impl<F> Pages<F>
where
    F: FnMut(Option<String>) -> Result<Page>,
{
    pub fn new(fetch: F) -> Self {
        Pages {
            fetch,
            pending: Vec::new().into_iter(),
            token: None,
            done: false,
        }
    }
}

impl<F> Iterator for Pages<F>
where
    F: FnMut(Option<String>) -> Result<Page>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.pending.next() {
                return Some(Ok(key));
            }
            if self.done {
                return None;
            }
            match (self.fetch)(self.token.take()) {
                Ok(page) => {
                    self.done = page.next.is_none();
                    self.token = page.next;
                    self.pending = page.keys.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Key-value blob storage addressed by relative keys
///
/// Implementations:
/// - [`MemoryStore`] for tests and embedding
/// - [`FsStore`] for a local directory standing in for a bucket
/// - `S3Store` (feature `s3`) for S3-compatible services
pub trait BlobStore: Send + Sync {
    /// Check the store is reachable with the configured credentials
    ///
    /// Called once when a connection is opened. Rejected credentials must
    /// surface as [`crate::Error::Auth`].
    fn verify(&self) -> Result<()> {
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch an object's bytes, `None` if absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()>;

    /// Remove an object; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, in lexicographic order
    fn list<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>>;

    /// Object metadata, `None` if absent
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;
}

impl<S: BlobStore + ?Sized> BlobStore for Box<S> {
    fn verify(&self) -> Result<()> {
        (**self).verify()
    }

    fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        (**self).put(key, data, options)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>> {
        (**self).list(prefix)
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        (**self).head(key)
    }
}
