//! Composable serialization pipeline
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s parsed from a
//! dot-delimited spec such as `"json.gz"`. Serialization applies the stages
//! left to right; deserialization applies their inverses right to left, so
//! the two are exact inverses for the same spec.
//!
//! Stages come in two kinds:
//! - **encoders** (`json`, `bincode`) turn a typed value into bytes
//! - **byte transforms** (`gz`, `zip`, `zst`) turn bytes into bytes
//!
//! An encoder may only lead a pipeline.

pub mod stages;

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A forward or inverse byte transform
type ByteFn = fn(&[u8]) -> Result<Vec<u8>>;

/// A single named, invertible transform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// UTF-8 JSON text
    Json,
    /// Generic binary serialization (`bincode`, also accepted as `pickle`)
    Bincode,
    /// gzip container
    Gzip,
    /// zip archive with a single member
    Zip,
    /// zstd frame
    Zstd,
}

impl Stage {
    /// Every registered stage, in the order they are listed in errors
    pub const ALL: [Stage; 5] = [
        Stage::Json,
        Stage::Gzip,
        Stage::Zip,
        Stage::Bincode,
        Stage::Zstd,
    ];

    /// The name used for this stage in a pipeline spec
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Json => "json",
            Stage::Bincode => "bincode",
            Stage::Gzip => "gz",
            Stage::Zip => "zip",
            Stage::Zstd => "zst",
        }
    }

    /// Look up a stage by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Stage::Json),
            "bincode" | "pickle" => Some(Stage::Bincode),
            "gz" => Some(Stage::Gzip),
            "zip" => Some(Stage::Zip),
            "zst" => Some(Stage::Zstd),
            _ => None,
        }
    }

    /// Whether this stage encodes typed values rather than bytes
    pub fn is_encoder(&self) -> bool {
        self.as_encoder().is_some()
    }

    /// Comma separated list of supported stage names
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The (forward, inverse) byte transforms for this stage
    ///
    /// For encoders these treat the input as a raw byte value of that
    /// encoding.
    fn transforms(&self) -> (ByteFn, ByteFn) {
        match self {
            Stage::Json => (stages::bytes_to_json, stages::bytes_from_json),
            Stage::Bincode => (stages::bytes_to_bincode, stages::bytes_from_bincode),
            Stage::Gzip => (stages::to_gz, stages::from_gz),
            Stage::Zip => (stages::to_zip, stages::from_zip),
            Stage::Zstd => (stages::to_zst, stages::from_zst),
        }
    }

    fn as_encoder(&self) -> Option<Encoder> {
        match self {
            Stage::Json => Some(Encoder::Json),
            Stage::Bincode => Some(Encoder::Bincode),
            Stage::Gzip | Stage::Zip | Stage::Zstd => None,
        }
    }
}

/// The stages that turn typed values into bytes
#[derive(Clone, Copy, Debug)]
enum Encoder {
    Json,
    Bincode,
}

impl Encoder {
    fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Encoder::Json => stages::to_json(value),
            Encoder::Bincode => Ok(bincode::serialize(value)?),
        }
    }

    fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            Encoder::Json => Ok(serde_json::from_slice(data)?),
            Encoder::Bincode => Ok(bincode::deserialize(data)?),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::from_name(s).ok_or_else(|| Error::UnsupportedStage {
            name: s.to_string(),
            supported: Stage::supported(),
        })
    }
}

/// An ordered sequence of stages
///
/// The empty pipeline is a pass-through for raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// The empty, pass-through pipeline
    pub fn raw() -> Self {
        Pipeline::default()
    }

    /// Build a pipeline from stages, validating encoder placement
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        if let Some(pos) = stages.iter().skip(1).position(|s| s.is_encoder()) {
            let pipeline = Pipeline { stages };
            return Err(Error::InvalidPipeline {
                reason: format!(
                    "`{}` encodes values and can only be the first stage",
                    pipeline.stages[pos + 1]
                ),
                pipeline: pipeline.to_string(),
            });
        }
        Ok(Pipeline { stages })
    }

    /// Parse a dot-delimited spec; the empty string is the raw pipeline
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Pipeline::raw());
        }
        let stages = spec
            .split('.')
            .map(Stage::from_str)
            .collect::<Result<Vec<_>>>()?;
        Pipeline::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// True when the pipeline leaves payloads untouched
    pub fn is_raw(&self) -> bool {
        self.stages.is_empty()
    }

    /// The leading value encoder, if any
    pub fn encoder(&self) -> Option<Stage> {
        self.stages.first().copied().filter(Stage::is_encoder)
    }

    /// Byte transforms that follow the encoder
    fn byte_stages(&self) -> &[Stage] {
        match self.encoder() {
            Some(_) => &self.stages[1..],
            None => &self.stages,
        }
    }

    /// Serialize a typed value: encode with the leading encoder, then run the
    /// byte transforms left to right
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let encoder = self.require_encoder()?;
        let mut result = encoder.encode(value)?;
        for stage in self.byte_stages() {
            result = (stage.transforms().0)(&result)?;
        }
        Ok(result)
    }

    /// Invert [`Pipeline::serialize`]
    pub fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        let encoder = self.require_encoder()?;
        let mut result = payload.to_vec();
        for stage in self.byte_stages().iter().rev() {
            result = (stage.transforms().1)(&result)?;
        }
        encoder.decode(&result)
    }

    /// Serialize raw bytes; the raw pipeline returns them unchanged
    pub fn serialize_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut result = data.to_vec();
        for stage in &self.stages {
            result = (stage.transforms().0)(&result)?;
        }
        Ok(result)
    }

    /// Invert [`Pipeline::serialize_bytes`]
    pub fn deserialize_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut result = payload.to_vec();
        for stage in self.stages.iter().rev() {
            result = (stage.transforms().1)(&result)?;
        }
        Ok(result)
    }

    fn require_encoder(&self) -> Result<Encoder> {
        self.stages
            .first()
            .and_then(Stage::as_encoder)
            .ok_or_else(|| Error::InvalidPipeline {
                pipeline: self.to_string(),
                reason: "no value encoder (json or bincode) leads the pipeline; \
                         use the raw bytes operations instead"
                    .into(),
            })
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.write_str(&names.join("."))
    }
}

impl FromStr for Pipeline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pipeline::parse(s)
    }
}

impl Serialize for Pipeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pipeline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let spec = String::deserialize(deserializer)?;
        Pipeline::parse(&spec).map_err(serde::de::Error::custom)
    }
}
