//! Connection and per-call configuration
//!
//! [`ConnectConfig`] is fixed when a connection is opened. [`CallOptions`]
//! applies to one operation only and never changes the connection.

use crate::codec::Pipeline;
use crate::key::Fields;
use crate::store::Headers;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Options recognised when opening a connection
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Default pipeline; `None` stores payloads as given
    pub serializer: Option<Pipeline>,
    /// Write objects as `public-read` instead of `private`
    pub public: bool,
    /// Headers sent with every write
    pub headers: Headers,
    /// Access key, overriding `AWS_ACCESS_KEY_ID`
    pub key: Option<String>,
    /// Secret key, overriding `AWS_SECRET_ACCESS_KEY`
    pub secret: Option<String>,
    pub region: Option<String>,
    /// Endpoint of an S3-compatible service
    pub endpoint: Option<String>,
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("serializer", &self.serializer)
            .field("public", &self.public)
            .field("headers", &self.headers)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ConnectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serializer(mut self, pipeline: Pipeline) -> Self {
        self.serializer = Some(pipeline);
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self
    }

    /// Read settings from environment variables
    ///
    /// Priority: explicit builder calls after this > environment > defaults.
    /// - `PLZ_SERIALIZER`: default pipeline spec
    /// - `PLZ_PUBLIC`: `1`/`true` for public-read objects
    /// - `AWS_REGION`, `S3_ENDPOINT`
    ///
    /// Credentials are left to [`Credentials::resolve`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let serializer = match lookup("PLZ_SERIALIZER") {
            Some(spec) if !spec.trim().is_empty() => Some(Pipeline::parse(&spec)?),
            _ => None,
        };
        let public = lookup("PLZ_PUBLIC")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(ConnectConfig {
            serializer,
            public,
            region: lookup("AWS_REGION"),
            endpoint: lookup("S3_ENDPOINT"),
            ..Default::default()
        })
    }

    /// Default config file location (`~/.config/s3plz/config.json`)
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?
            .join("s3plz")
            .join("config.json"))
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write this config as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", path.display(), e)))
    }
}

/// Access key pair for a storage backend
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Take the key pair from `config`, falling back to the environment
    pub fn resolve(config: &ConnectConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// [`Credentials::resolve`] with a custom variable lookup
    pub fn resolve_with(
        config: &ConnectConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let pick = |explicit: &Option<String>, var: &str| {
            explicit
                .clone()
                .or_else(|| lookup(var))
                .filter(|v| !v.trim().is_empty())
        };

        match (
            pick(&config.key, ACCESS_KEY_ENV),
            pick(&config.secret, SECRET_KEY_ENV),
        ) {
            (Some(key), Some(secret)) => Ok(Credentials { key, secret }),
            _ => Err(Error::Auth(format!(
                "You must pass in a key and secret or set {} and {} as environment variables",
                ACCESS_KEY_ENV, SECRET_KEY_ENV
            ))),
        }
    }
}

/// Settings for a single operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Pipeline for this call only, overriding the connection default
    pub serializer: Option<Pipeline>,
    /// Headers merged over the connection's default headers
    pub headers: Headers,
    /// Fields for key templates
    pub fields: Fields,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serializer(mut self, pipeline: Pipeline) -> Self {
        self.serializer = Some(pipeline);
        self
    }

    /// Parse and set a pipeline override
    pub fn serializer_spec(self, spec: &str) -> Result<Self> {
        Ok(self.serializer(Pipeline::parse(spec)?))
    }

    /// Store and fetch payloads as given for this call
    pub fn raw(self) -> Self {
        self.serializer(Pipeline::raw())
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.merge(fields);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_credentials_from_config_win() {
        let config = ConnectConfig::new().credentials("k", "s");
        let creds = Credentials::resolve_with(
            &config,
            env(&[(ACCESS_KEY_ENV, "env-k"), (SECRET_KEY_ENV, "env-s")]),
        )
        .unwrap();
        assert_eq!(creds.key, "k");
        assert_eq!(creds.secret, "s");
    }

    #[test]
    fn test_credentials_from_env() {
        let creds = Credentials::resolve_with(
            &ConnectConfig::new(),
            env(&[(ACCESS_KEY_ENV, "env-k"), (SECRET_KEY_ENV, "env-s")]),
        )
        .unwrap();
        assert_eq!(creds.key, "env-k");
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let err = Credentials::resolve_with(&ConnectConfig::new(), env(&[(ACCESS_KEY_ENV, "k")]))
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let blank = ConnectConfig::new().credentials("", "s");
        assert!(Credentials::resolve_with(&blank, env(&[])).is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = ConnectConfig::new().credentials("k", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
        let creds = Credentials::resolve_with(&config, env(&[])).unwrap();
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_from_env() {
        let config = ConnectConfig::from_lookup(env(&[
            ("PLZ_SERIALIZER", "json.gz"),
            ("PLZ_PUBLIC", "true"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.serializer, Some(Pipeline::parse("json.gz").unwrap()));
        assert!(config.public);
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));

        assert!(ConnectConfig::from_lookup(env(&[("PLZ_SERIALIZER", "yaml")])).is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ConnectConfig::new()
            .serializer(Pipeline::parse("json.zst").unwrap())
            .public(true)
            .header("Cache-Control", "no-cache");
        config.save(&path).unwrap();

        assert_eq!(ConnectConfig::load(&path).unwrap(), config);
        assert_eq!(
            ConnectConfig::load_or_default(&dir.path().join("missing.json")).unwrap(),
            ConnectConfig::default()
        );
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"serializer": "json"}"#).unwrap();

        let config = ConnectConfig::load(&path).unwrap();
        assert_eq!(config.serializer, Some(Pipeline::parse("json").unwrap()));
        assert!(!config.public);
    }

    #[test]
    fn test_call_options_builder() {
        let opts = CallOptions::new()
            .serializer_spec("json.gz")
            .unwrap()
            .field("a", 1)
            .header("Content-Type", "application/json");
        assert_eq!(opts.serializer.unwrap().to_string(), "json.gz");
        assert_eq!(opts.fields.get("a"), Some("1"));
        assert_eq!(opts.headers.len(), 1);
    }
}
