//! Directory-backed blob store
//!
//! Layout:
//! ```text
//! <root>/
//!   objects/<key>          object bytes, one file per key
//!   meta/<key>.json        ObjectMeta written alongside each put
//! ```
//!
//! Keys map directly onto relative paths, so they must not contain empty,
//! `.` or `..` segments.

use super::{BlobStore, KeyIter, ObjectMeta, PutOptions, DEFAULT_CONTENT_TYPE};
use crate::key::{Clock, SystemClock};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const OBJECTS_DIR: &str = "objects";
const META_DIR: &str = "meta";

/// A local directory standing in for a bucket
pub struct FsStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        fs::create_dir_all(root.join(META_DIR))?;
        Ok(FsStore {
            root,
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp `last_modified` from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The store's root directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn check_key(key: &str) -> Result<()> {
        let bad_segment = key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if key.is_empty() || bad_segment || key.contains('\\') {
            return Err(Error::Backend(format!(
                "Key cannot be stored on the filesystem: {:?}",
                key
            )));
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.root.join(OBJECTS_DIR).join(key))
    }

    fn meta_path(&self, key: &str) -> Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.root.join(META_DIR).join(format!("{}.json", key)))
    }

    /// Collect keys below `dir`, depth first, as `/`-joined relative paths
    fn walk(dir: &Path, base: &str, keys: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let key = if base.is_empty() {
                name
            } else {
                format!("{}/{}", base, name)
            };
            if entry.file_type()?.is_dir() {
                Self::walk(&entry.path(), &key, keys)?;
            } else {
                keys.push(key);
            }
        }
        Ok(())
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl BlobStore for FsStore {
    fn verify(&self) -> Result<()> {
        let objects = self.root.join(OBJECTS_DIR);
        if !objects.is_dir() {
            return Err(Error::Backend(format!(
                "Store directory is missing: {}",
                objects.display()
            )));
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.object_path(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        not_found_as_none(fs::read(self.object_path(key)?))
    }

    fn put(&self, key: &str, data: &[u8], options: &PutOptions) -> Result<()> {
        let path = self.object_path(key)?;
        let meta_path = self.meta_path(key)?;
        for p in [&path, &meta_path] {
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&path, data)?;
        let meta = ObjectMeta::for_write(data, options, self.clock.now());
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        not_found_as_none(fs::remove_file(self.object_path(key)?))?;
        not_found_as_none(fs::remove_file(self.meta_path(key)?))?;
        Ok(())
    }

    fn list<'a>(&'a self, prefix: &str) -> Result<KeyIter<'a>> {
        // only the directory holding the prefix can contain matches
        let base = prefix.rfind('/').map_or("", |end| &prefix[..end]);
        let mut start = self.root.join(OBJECTS_DIR);
        if !base.is_empty() {
            if Self::check_key(base).is_err() {
                return Ok(Box::new(std::iter::empty()));
            }
            start = start.join(base);
        }
        if !start.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let mut keys = Vec::new();
        Self::walk(&start, base, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.object_path(key)?;
        let Some(stat) = not_found_as_none(fs::metadata(&path))? else {
            return Ok(None);
        };

        if let Some(raw) = not_found_as_none(fs::read(self.meta_path(key)?))? {
            return Ok(Some(serde_json::from_slice(&raw)?));
        }

        // Dropped into the directory by hand: derive what we can
        let data = fs::read(&path)?;
        Ok(Some(ObjectMeta {
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            last_modified: stat.modified().ok().map(DateTime::<Utc>::from),
            content_language: None,
            content_encoding: None,
            content_length: stat.len(),
            etag: Some(super::content_digest(&data)),
            acl: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::FixedClock;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();

        store
            .put("a/b/c.json", b"{}", &PutOptions::default())
            .unwrap();
        assert!(store.exists("a/b/c.json").unwrap());
        assert_eq!(store.get("a/b/c.json").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get("a/b/missing").unwrap(), None);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        {
            let store = FsStore::open(dir.path()).unwrap();
            store.put("k", b"persistent", &PutOptions::default()).unwrap();
        }
        {
            let store = FsStore::open(dir.path()).unwrap();
            assert_eq!(store.get("k").unwrap(), Some(b"persistent".to_vec()));
        }
    }

    #[test]
    fn test_list_is_sorted_and_prefixed() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        for key in ["t/2", "t/1", "t/sub/3", "u/4"] {
            store.put(key, b"x", &PutOptions::default()).unwrap();
        }

        let keys: Vec<String> = store.list("t/").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec!["t/1", "t/2", "t/sub/3"]);
    }

    #[test]
    fn test_list_walks_only_the_prefix_directory() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        for key in ["t/sub/1", "t/sub/2", "t/sibling", "u/3"] {
            store.put(key, b"x", &PutOptions::default()).unwrap();
        }
        // a file where the walk would otherwise descend
        fs::write(dir.path().join(OBJECTS_DIR).join("t-file"), b"x").unwrap();

        let keys: Vec<String> = store.list("t/s").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec!["t/sibling", "t/sub/1", "t/sub/2"]);

        let keys: Vec<String> = store.list("t/sub/").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec!["t/sub/1", "t/sub/2"]);

        assert_eq!(store.list("missing/").unwrap().count(), 0);
        assert_eq!(store.list("t/sibling/").unwrap().count(), 0);
        assert_eq!(store.list("../").unwrap().count(), 0);
        assert_eq!(store.list("").unwrap().count(), 5);
    }

    #[test]
    fn test_delete_removes_object_and_meta() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.put("k", b"x", &PutOptions::default()).unwrap();

        store.delete("k").unwrap();
        assert!(!store.exists("k").unwrap());
        assert!(store.head("k").unwrap().is_none());
        store.delete("k").unwrap();
    }

    #[test]
    fn test_head_uses_recorded_meta() {
        let dir = tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let store = FsStore::open(dir.path())
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(at)));

        let mut options = PutOptions::default();
        options
            .headers
            .insert("Content-Type".into(), "application/json".into());
        store.put("k.json", b"[1]", &options).unwrap();

        let meta = store.head("k.json").unwrap().unwrap();
        assert_eq!(meta.last_modified, Some(at));
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));
        assert_eq!(meta.content_length, 3);
    }

    #[test]
    fn test_head_without_sidecar() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(OBJECTS_DIR).join("manual"), b"abc").unwrap();

        let meta = store.head("manual").unwrap().unwrap();
        assert_eq!(meta.content_length, 3);
        assert!(meta.last_modified.is_some());
    }

    #[test]
    fn test_rejects_path_escapes() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        for key in ["../escape", "a//b", "", "dir/", "./x"] {
            assert!(
                store.put(key, b"x", &PutOptions::default()).is_err(),
                "{:?} should be rejected",
                key
            );
        }
    }
}
