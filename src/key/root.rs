//! Bucket roots and absolute/relative key forms
//!
//! Backends only ever see relative keys (`dir/file.json`); callers only
//! ever get absolute keys back (`s3://bucket/dir/file.json`).

use crate::{Error, Result};

/// URI schemes accepted for a root
pub const SCHEMES: [&str; 2] = ["s3", "s3n"];

/// Parse an S3 URI into `(bucket, path)`
///
/// A trailing `/` is appended before parsing, so `s3://walrus` and
/// `s3://walrus/` both give `("walrus", "/")`.
pub fn parse_uri(uri: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidRootUri(uri.to_string());

    let mut full = uri.trim().to_string();
    if !full.ends_with('/') {
        full.push('/');
    }

    let (scheme, rest) = full.split_once("://").ok_or_else(invalid)?;
    if !SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        return Err(invalid());
    }

    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => return Err(invalid()),
    };
    if host.is_empty() || !path.contains('/') {
        return Err(invalid());
    }

    Ok((host.to_string(), path.to_string()))
}

/// Parse an S3 URI and return its bucket name
pub fn parse_root(uri: &str) -> Result<String> {
    parse_uri(uri).map(|(bucket, _)| bucket)
}

/// True if `uri` parses as an S3 URI
pub fn is_s3_uri(uri: &str) -> bool {
    parse_uri(uri).is_ok()
}

/// Convert `s3://bucket/path` to its public HTTP URL
pub fn s3_to_url(uri: &str) -> Result<String> {
    let (bucket, path) = parse_uri(uri)?;
    let mut path = path.trim_start_matches('/');
    if !uri.ends_with('/') {
        path = path.strip_suffix('/').unwrap_or(path);
    }
    Ok(format!("http://{}.s3.amazonaws.com/{}", bucket, path))
}

/// Convert a public `http(s)://bucket.s3.amazonaws.com/path` URL back to an S3 URI
pub fn url_to_s3(url: &str) -> Result<String> {
    let no_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| Error::InvalidRootUri(url.to_string()))?;
    let (bucket, path) = no_scheme
        .split_once(".s3.amazonaws.com/")
        .ok_or_else(|| Error::InvalidRootUri(url.to_string()))?;
    if bucket.is_empty() {
        return Err(Error::InvalidRootUri(url.to_string()));
    }
    Ok(format!("s3://{}/{}", bucket, path))
}

fn has_scheme(key: &str) -> bool {
    SCHEMES.iter().any(|s| {
        key.strip_prefix(s)
            .map_or(false, |rest| rest.starts_with("://"))
    })
}

/// The top-level container every key is relative to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Root {
    bucket: String,
    prefix: String,
}

impl Root {
    /// Parse a root URI such as `s3://my-bucket`
    pub fn parse(uri: &str) -> Result<Self> {
        let bucket = parse_root(uri)?;
        Ok(Root {
            prefix: format!("s3://{}", bucket),
            bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Absolute prefix, always `s3://<bucket>`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strip this root from `key`, then any leading separators
    ///
    /// Keys under a different root are left absolute.
    pub fn to_relative(&self, key: &str) -> String {
        let mut rest = key;
        for scheme in SCHEMES {
            let prefix = format!("{}://{}", scheme, self.bucket);
            if let Some(stripped) = key.strip_prefix(prefix.as_str()) {
                if stripped.is_empty() || stripped.starts_with('/') {
                    rest = stripped;
                    break;
                }
            }
        }
        rest.trim_start_matches('/').to_string()
    }

    /// The absolute form of `key` under this root
    ///
    /// Keys that already name another root are returned unchanged.
    pub fn to_absolute(&self, key: &str) -> String {
        let relative = self.to_relative(key);
        if has_scheme(&relative) {
            relative
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Root {
        Root::parse("s3://mybucket").unwrap()
    }

    #[test]
    fn test_parse_root() {
        assert_eq!(parse_root("s3://mybucket/").unwrap(), "mybucket");
        assert_eq!(parse_root("s3://mybucket").unwrap(), "mybucket");
        assert_eq!(parse_root("s3n://mybucket/tmp/").unwrap(), "mybucket");
    }

    #[test]
    fn test_parse_uri_returns_path() {
        let (bucket, path) = parse_uri("s3://walrus/tmp/").unwrap();
        assert_eq!(bucket, "walrus");
        assert_eq!(path, "/tmp/");
    }

    #[test]
    fn test_invalid_roots() {
        for uri in ["http://not-s3", "s3://", "s3:///path", "mybucket", "gs://bucket"] {
            assert!(
                matches!(parse_root(uri), Err(Error::InvalidRootUri(_))),
                "{} should be rejected",
                uri
            );
            assert!(!is_s3_uri(uri));
        }
    }

    #[test]
    fn test_to_relative() {
        let root = root();
        assert_eq!(root.to_relative("s3://mybucket/a/b.json"), "a/b.json");
        assert_eq!(root.to_relative("/a/b.json"), "a/b.json");
        assert_eq!(root.to_relative("a/b.json"), "a/b.json");
        assert_eq!(root.to_relative("s3n://mybucket/a"), "a");
    }

    #[test]
    fn test_similar_bucket_names_are_not_stripped() {
        let root = root();
        assert_eq!(root.to_relative("s3://mybucket2/a"), "s3://mybucket2/a");
        assert_eq!(root.to_absolute("s3://mybucket2/a"), "s3://mybucket2/a");
    }

    #[test]
    fn test_to_absolute() {
        let root = root();
        assert_eq!(root.to_absolute("a/b.json"), "s3://mybucket/a/b.json");
        assert_eq!(root.to_absolute("s3://mybucket/a/b.json"), "s3://mybucket/a/b.json");
    }

    #[test]
    fn test_normalization_roundtrip_is_stable() {
        let root = root();
        for key in [
            "a/b",
            "/a/b",
            "//a/b",
            "s3://mybucket/a/b",
            "s3://mybucket//a/b",
            "s3n://mybucket/a",
            "s3://elsewhere/a",
            "",
        ] {
            assert_eq!(
                root.to_absolute(&root.to_relative(key)),
                root.to_absolute(key),
                "unstable for {:?}",
                key
            );
        }
    }

    #[test]
    fn test_url_conversions() {
        assert_eq!(
            s3_to_url("s3://walrus/tmp/file.txt").unwrap(),
            "http://walrus.s3.amazonaws.com/tmp/file.txt"
        );
        assert_eq!(
            s3_to_url("s3://walrus/tmp/").unwrap(),
            "http://walrus.s3.amazonaws.com/tmp/"
        );
        assert_eq!(
            url_to_s3("http://walrus.s3.amazonaws.com/tmp/file.txt").unwrap(),
            "s3://walrus/tmp/file.txt"
        );
        assert!(url_to_s3("ftp://walrus").is_err());
    }
}
