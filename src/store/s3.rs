//! S3 blob store on the blocking `rust-s3` client

use super::{BlobStore, KeyIter, ObjectMeta, Page, Pages, PutOptions, DEFAULT_CONTENT_TYPE};
use crate::config::Credentials;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials as AwsCredentials;
use s3::error::S3Error;
use s3::region::Region;

const DEFAULT_REGION: &str = "us-east-1";

/// Probe key used to check credentials; it never needs to exist
const VERIFY_KEY: &str = ".s3plz-verify";

/// A blob store backed by an S3-compatible bucket
pub struct S3Store {
    bucket: Box<Bucket>,
}

fn status_of(err: &S3Error) -> Option<u16> {
    match err {
        S3Error::HttpFailWithBody(code, _) => Some(*code),
        _ => None,
    }
}

fn backend(err: S3Error) -> Error {
    match status_of(&err) {
        Some(401) | Some(403) => Error::Auth(format!("Credentials rejected by S3: {}", err)),
        _ => Error::Backend(err.to_string()),
    }
}

impl S3Store {
    /// Connect to `bucket_name`; `endpoint` selects an S3-compatible
    /// service with path-style addressing
    pub fn new(
        bucket_name: &str,
        credentials: &Credentials,
        region: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let region_name = region.unwrap_or(DEFAULT_REGION);
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region_name.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region_name
                .parse()
                .map_err(|e| Error::Config(format!("Invalid region {}: {}", region_name, e)))?,
        };

        let creds = AwsCredentials::new(
            Some(&credentials.key),
            Some(&credentials.secret),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Auth(format!("Invalid credentials: {}", e)))?;

        let mut bucket = Bucket::new(bucket_name, region, creds).map_err(backend)?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }
        Ok(S3Store { bucket })
    }
}

impl BlobStore for S3Store {
    fn verify(&self) -> Result<()> {
        match self.bucket.head_object(VERIFY_KEY) {
            Ok(_) => Ok(()),
            Err(e) if status_of(&e) == Some(404) => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        match self.bucket.head_object(key) {
            Ok(_) => Ok(true),
            Err(e) if status_of(&e) == Some(404) => Ok(false),
            Err(e) => Err(backend(e)),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.bucket.get_object(key) {
            Ok(response) => Ok(Some(response.as_slice().to_vec())),
            Err(e) if status_of(&e) == Some(404) => Ok(None),
            Err(e) => Err(backend(e)),
        }
    }

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        let mut bucket = self.bucket.clone();
        bucket.add_header("x-amz-acl", options.acl.as_str());
        for (name, value) in &options.headers {
            if !name.eq_ignore_ascii_case("Content-Type") {
                bucket.add_header(name, value);
            }
        }
        let content_type = options.header("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE);
        bucket
            .put_object_with_content_type(key, data, content_type)
            .map_err(backend)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.bucket.delete_object(key) {
            Ok(_) => Ok(()),
            Err(e) if status_of(&e) == Some(404) => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    fn list<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>> {
        let prefix = prefix.to_string();
        let bucket = &self.bucket;
        Ok(Box::new(Pages::new(move |token| {
            let (page, _) = bucket
                .list_page(prefix.clone(), None, token, None, None)
                .map_err(backend)?;
            Ok(Page {
                keys: page.contents.into_iter().map(|object| object.key).collect(),
                next: page
                    .next_continuation_token
                    .filter(|_| page.is_truncated),
            })
        })))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let (head, _) = match self.bucket.head_object(key) {
            Ok(found) => found,
            Err(e) if status_of(&e) == Some(404) => return Ok(None),
            Err(e) => return Err(backend(e)),
        };
        let last_modified = head
            .last_modified
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(Some(ObjectMeta {
            content_type: head.content_type,
            last_modified,
            content_language: head.content_language,
            content_encoding: head.content_encoding,
            content_length: head.content_length.unwrap_or(0).max(0) as u64,
            etag: head.e_tag,
            acl: None,
        }))
    }
}
