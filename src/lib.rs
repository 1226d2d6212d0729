//! # s3plz
//!
//! A convenience layer over S3-style object storage.
//!
//! s3plz pairs a composable serialization pipeline with templated object
//! keys, so that storing a value is one call and reading it back is another.
//!
//! ## Core Concepts
//!
//! - **Pipelines**: Dot-delimited stage lists like `json.gz`, applied left
//!   to right on write and right to left on read
//! - **Key templates**: Keys with `{field}` placeholders, filled from the
//!   value, from caller fields, and from auto fields like `{@uid}`
//! - **Roots**: Every connection is bound to one bucket; keys may be given
//!   relative or as `s3://bucket/...` and come back absolute
//! - **Blob stores**: S3 in production, memory or a local directory otherwise
//!
//! ## Example
//!
//! ```ignore
//! use s3plz::{connect, CallOptions, ConnectConfig, Pipeline};
//!
//! let plz = connect(
//!     "s3://my-bucket",
//!     ConnectConfig::new().serializer(Pipeline::parse("json.gz")?),
//! )?;
//! let key = plz.put(&record, "events/{@date_path}/{@uid}.json.gz", &CallOptions::new())?;
//! let back: Option<Record> = plz.get(&key, &CallOptions::new())?;
//! ```

pub mod codec;
pub mod config;
pub mod key;
pub mod store;

mod connection;
mod error;

pub use codec::{Pipeline, Stage};
pub use config::{CallOptions, ConnectConfig, Credentials};
pub use connection::{connect, Connection, Created};
pub use error::{Error, Result};
pub use key::{
    format_key, is_s3_uri, parse_root, parse_uri, s3_to_url, url_to_s3, Clock, Fields,
    FixedClock, Root, SystemClock,
};
#[cfg(feature = "s3")]
pub use store::S3Store;
pub use store::{Acl, BlobStore, FsStore, MemoryStore, ObjectMeta, Page, Pages, PutOptions};
