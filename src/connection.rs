//! High-level connection API
//!
//! A [`Connection`] ties a bucket root, a [`BlobStore`] and a default
//! [`Pipeline`] together. Every operation resolves its key template once,
//! runs the payload through the effective pipeline and makes one store
//! call. Keys handed back are always absolute (`s3://bucket/...`).

use crate::codec::Pipeline;
use crate::config::{CallOptions, ConnectConfig, Credentials};
use crate::key::{format_key, parse_root, Clock, Fields, Root, SystemClock};
use crate::store::{Acl, BlobStore, Headers, ObjectMeta, PutOptions};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a conditional write
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Created {
    /// The object was written at this key
    Written(String),
    /// An object already existed at this key; nothing was written
    Exists(String),
}

impl Created {
    pub fn is_written(&self) -> bool {
        matches!(self, Created::Written(_))
    }

    /// The absolute key, whether or not it was written
    pub fn key(&self) -> &str {
        match self {
            Created::Written(key) | Created::Exists(key) => key,
        }
    }

    /// The key if the object was written
    pub fn written(self) -> Option<String> {
        match self {
            Created::Written(key) => Some(key),
            Created::Exists(_) => None,
        }
    }
}

/// A connection to one bucket
///
/// Configuration is immutable after [`Connection::open`]; per-call settings
/// travel in [`CallOptions`].
pub struct Connection {
    root: Root,
    store: Box<dyn BlobStore>,
    serializer: Pipeline,
    acl: Acl,
    headers: Headers,
    clock: Arc<dyn Clock>,
}

/// Connect to an S3 bucket
///
/// Credentials come from `config` or the `AWS_ACCESS_KEY_ID` /
/// `AWS_SECRET_ACCESS_KEY` environment variables and are checked before
/// any operation can run.
///
/// ```ignore
/// let plz = s3plz::connect("s3://my-bucket", ConnectConfig::new())?;
/// let key = plz.put(&record, "records/{@date_path}/{@uid}.json.gz", &CallOptions::new())?;
/// ```
pub fn connect(uri: &str, config: ConnectConfig) -> Result<Connection> {
    let bucket = parse_root(uri)?;
    let credentials = Credentials::resolve(&config)?;
    open_s3(uri, &bucket, &credentials, config)
}

#[cfg(feature = "s3")]
fn open_s3(
    uri: &str,
    bucket: &str,
    credentials: &Credentials,
    config: ConnectConfig,
) -> Result<Connection> {
    let store = crate::store::S3Store::new(
        bucket,
        credentials,
        config.region.as_deref(),
        config.endpoint.as_deref(),
    )?;
    Connection::open(uri, store, config)
}

#[cfg(not(feature = "s3"))]
fn open_s3(
    _uri: &str,
    _bucket: &str,
    _credentials: &Credentials,
    _config: ConnectConfig,
) -> Result<Connection> {
    Err(Error::Config(
        "s3plz was built without the `s3` feature".into(),
    ))
}

impl Connection {
    /// Open a connection over any blob store
    pub fn open(uri: &str, store: impl BlobStore + 'static, config: ConnectConfig) -> Result<Self> {
        let root = Root::parse(uri)?;
        store.verify()?;
        debug!("Connected to {}", root.prefix());

        Ok(Connection {
            root,
            store: Box::new(store),
            serializer: config.serializer.unwrap_or_default(),
            acl: Acl::from_public(config.public),
            headers: config.headers,
            clock: Arc::new(SystemClock),
        })
    }

    /// Resolve auto fields from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn bucket(&self) -> &str {
        self.root.bucket()
    }

    /// The connection's default pipeline
    pub fn serializer(&self) -> &Pipeline {
        &self.serializer
    }

    pub fn acl(&self) -> Acl {
        self.acl
    }

    /// The pipeline in effect for one call
    fn pipeline<'a>(&'a self, opts: &'a CallOptions) -> &'a Pipeline {
        opts.serializer.as_ref().unwrap_or(&self.serializer)
    }

    /// Relative backend key for a template
    fn resolve(&self, template: &str, fields: &Fields) -> Result<String> {
        let relative = self.root.to_relative(template);
        let key = format_key(&relative, fields, self.clock.as_ref())?;
        Ok(self.root.to_relative(&key))
    }

    /// Resolve a key template the way every operation does, without
    /// touching the store
    pub fn format_key(&self, template: &str, opts: &CallOptions) -> Result<String> {
        Ok(self.root.to_absolute(&self.resolve(template, &opts.fields)?))
    }

    /// Fields from the value itself, overlaid with the caller's fields
    fn fields_for<T: Serialize + ?Sized>(value: &T, template: &str, opts: &CallOptions) -> Fields {
        if !template.contains('{') {
            return opts.fields.clone();
        }
        let mut fields = Fields::from_value(value);
        fields.merge(opts.fields.clone());
        fields
    }

    fn write(&self, key: &str, payload: &[u8], opts: &CallOptions) -> Result<String> {
        let mut headers = self.headers.clone();
        headers.extend(opts.headers.clone());
        let options = PutOptions {
            acl: self.acl,
            headers,
        };

        debug!("Putting {} bytes at {}", payload.len(), key);
        self.store.put(key, payload, &options)?;
        Ok(self.root.to_absolute(key))
    }

    // === Serialization ===

    /// Serialize a value with the call's effective pipeline
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T, opts: &CallOptions) -> Result<Vec<u8>> {
        self.pipeline(opts).serialize(value)
    }

    /// Deserialize a payload with the call's effective pipeline
    pub fn deserialize<T: DeserializeOwned>(&self, payload: &[u8], opts: &CallOptions) -> Result<T> {
        self.pipeline(opts).deserialize(payload)
    }

    // === Writes ===

    /// Serialize `value` and upload it; returns the absolute key
    ///
    /// Top-level scalar members of `value` are available to the template
    /// alongside `opts.fields`, which take precedence.
    pub fn put<T: Serialize + ?Sized>(
        &self,
        value: &T,
        template: &str,
        opts: &CallOptions,
    ) -> Result<String> {
        let key = self.resolve(template, &Self::fields_for(value, template, opts))?;
        let payload = self.serialize(value, opts)?;
        self.write(&key, &payload, opts)
    }

    /// Upload raw bytes through the byte form of the pipeline
    pub fn put_bytes(&self, data: &[u8], template: &str, opts: &CallOptions) -> Result<String> {
        let key = self.resolve(template, &opts.fields)?;
        let payload = self.pipeline(opts).serialize_bytes(data)?;
        self.write(&key, &payload, opts)
    }

    /// Upload `value` only if nothing exists at the resolved key yet
    ///
    /// The key is resolved once, so `@uid`/time fields are the same for the
    /// check and the write. The check and the write are separate store
    /// calls; a concurrent writer can slip in between.
    pub fn create<T: Serialize + ?Sized>(
        &self,
        value: &T,
        template: &str,
        opts: &CallOptions,
    ) -> Result<Created> {
        let key = self.resolve(template, &Self::fields_for(value, template, opts))?;
        if self.store.exists(&key)? {
            debug!("Not creating {}: already exists", key);
            return Ok(Created::Exists(self.root.to_absolute(&key)));
        }
        let payload = self.serialize(value, opts)?;
        Ok(Created::Written(self.write(&key, &payload, opts)?))
    }

    /// Raw-bytes form of [`Connection::create`]
    pub fn create_bytes(&self, data: &[u8], template: &str, opts: &CallOptions) -> Result<Created> {
        let key = self.resolve(template, &opts.fields)?;
        if self.store.exists(&key)? {
            return Ok(Created::Exists(self.root.to_absolute(&key)));
        }
        let payload = self.pipeline(opts).serialize_bytes(data)?;
        Ok(Created::Written(self.write(&key, &payload, opts)?))
    }

    #[deprecated(note = "use `Connection::create`, which behaves identically")]
    pub fn upsert<T: Serialize + ?Sized>(
        &self,
        value: &T,
        template: &str,
        opts: &CallOptions,
    ) -> Result<Created> {
        warn!("upsert is deprecated and kept for backwards compatibility; use create instead");
        self.create(value, template, opts)
    }

    // === Reads ===

    /// Download and deserialize an object; `None` if it does not exist
    pub fn get<T: DeserializeOwned>(&self, template: &str, opts: &CallOptions) -> Result<Option<T>> {
        let key = self.resolve(template, &opts.fields)?;
        debug!("Getting {}", key);
        match self.store.get(&key)? {
            Some(payload) => Ok(Some(self.deserialize(&payload, opts)?)),
            None => Ok(None),
        }
    }

    /// Download an object through the byte form of the pipeline
    pub fn get_bytes(&self, template: &str, opts: &CallOptions) -> Result<Option<Vec<u8>>> {
        let key = self.resolve(template, &opts.fields)?;
        debug!("Getting {}", key);
        match self.store.get(&key)? {
            Some(payload) => Ok(Some(self.pipeline(opts).deserialize_bytes(&payload)?)),
            None => Ok(None),
        }
    }

    /// Metadata for an object; `None` if it does not exist
    pub fn get_meta(&self, template: &str, opts: &CallOptions) -> Result<Option<ObjectMeta>> {
        let key = self.resolve(template, &opts.fields)?;
        self.store.head(&key)
    }

    /// Time since the object was last modified
    ///
    /// `None` if the object does not exist or the backend reports no
    /// modification time.
    pub fn get_age(&self, template: &str, opts: &CallOptions) -> Result<Option<chrono::Duration>> {
        let meta = self.get_meta(template, opts)?;
        Ok(meta
            .and_then(|m| m.last_modified)
            .map(|modified| self.clock.now() - modified))
    }

    /// The absolute key if an object exists there
    pub fn exists(&self, template: &str, opts: &CallOptions) -> Result<Option<String>> {
        let key = self.resolve(template, &opts.fields)?;
        if self.store.exists(&key)? {
            Ok(Some(self.root.to_absolute(&key)))
        } else {
            Ok(None)
        }
    }

    /// Backend prefix for a directory template
    fn directory(&self, directory: &str, opts: &CallOptions) -> Result<String> {
        let mut prefix = self.resolve(directory, &opts.fields)?;
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(prefix)
    }

    /// Lazily list absolute keys under a directory
    ///
    /// An empty directory lists the whole bucket.
    pub fn ls<'a>(
        &'a self,
        directory: &str,
        opts: &CallOptions,
    ) -> Result<impl Iterator<Item = Result<String>> + 'a> {
        let prefix = self.directory(directory, opts)?;
        debug!("Listing {}", prefix);
        let root = &self.root;
        Ok(self
            .store
            .list(&prefix)?
            .map(move |key| key.map(|k| root.to_absolute(&k))))
    }

    /// Lazily fetch `(absolute key, value)` pairs under a directory
    ///
    /// Objects removed between listing and fetching are skipped.
    pub fn stream<'a, T: DeserializeOwned + 'a>(
        &'a self,
        directory: &str,
        opts: &CallOptions,
    ) -> Result<impl Iterator<Item = Result<(String, T)>> + 'a> {
        let pipeline = self.pipeline(opts).clone();
        Ok(self
            .fetch_all(directory, opts)?
            .map(move |entry| {
                let (key, payload) = entry?;
                Ok((key, pipeline.deserialize(&payload)?))
            }))
    }

    /// Raw-bytes form of [`Connection::stream`]
    pub fn stream_bytes<'a>(
        &'a self,
        directory: &str,
        opts: &CallOptions,
    ) -> Result<impl Iterator<Item = Result<(String, Vec<u8>)>> + 'a> {
        let pipeline = self.pipeline(opts).clone();
        Ok(self
            .fetch_all(directory, opts)?
            .map(move |entry| {
                let (key, payload) = entry?;
                Ok((key, pipeline.deserialize_bytes(&payload)?))
            }))
    }

    fn fetch_all<'a>(
        &'a self,
        directory: &str,
        opts: &CallOptions,
    ) -> Result<impl Iterator<Item = Result<(String, Vec<u8>)>> + 'a> {
        let prefix = self.directory(directory, opts)?;
        let store = &self.store;
        let root = &self.root;
        Ok(store.list(&prefix)?.filter_map(move |key| {
            let key = match key {
                Ok(key) => key,
                Err(e) => return Some(Err(e)),
            };
            match store.get(&key) {
                Ok(Some(payload)) => Some(Ok((root.to_absolute(&key), payload))),
                Ok(None) => {
                    debug!("Skipping {}: removed while streaming", key);
                    None
                }
                Err(e) => Some(Err(e)),
            }
        }))
    }

    // === Deletes ===

    /// Delete an object; returns the absolute key
    pub fn delete(&self, template: &str, opts: &CallOptions) -> Result<String> {
        let key = self.resolve(template, &opts.fields)?;
        debug!("Deleting {}", key);
        self.store.delete(&key)?;
        Ok(self.root.to_absolute(&key))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("root", &self.root.prefix())
            .field("serializer", &self.serializer.to_string())
            .field("acl", &self.acl)
            .finish()
    }
}
