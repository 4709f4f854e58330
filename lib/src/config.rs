//! Container-wide defaults for new streams and the metadata segment name.
//!
//! A config can be built in code with [`ContainerConfig::builder`] or loaded
//! from a JSON file. Either way it is validated before use, so a container
//! never writes a stream whose parameters a reader could not address.

use std::fmt;
use std::io::{BufReader, Write};
use std::path::Path;

use aff4_bevy::params::{DEFAULT_CHUNKS_PER_SEGMENT, DEFAULT_CHUNK_SIZE};
use aff4_bevy::{Compression, DigestMethod, StreamParams};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::consts::METADATA_SEGMENT;
use crate::errors::Aff4Error;
use crate::Result;

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunks_per_segment() -> u32 {
    DEFAULT_CHUNKS_PER_SEGMENT
}

fn default_metadata_segment() -> String {
    METADATA_SEGMENT.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ContainerConfig {
    /// Logical chunk size of new image streams, in bytes.
    #[serde(default = "default_chunk_size")]
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: u32,
    #[serde(default = "default_chunks_per_segment")]
    #[builder(default = "DEFAULT_CHUNKS_PER_SEGMENT")]
    pub chunks_per_segment: u32,
    #[serde(default)]
    #[builder(default)]
    pub compression: Compression,
    /// Hash recorded for the content of each image stream.
    #[serde(default)]
    #[builder(default)]
    pub content_digest: DigestMethod,
    #[serde(default = "default_metadata_segment")]
    #[builder(setter(into), default = "METADATA_SEGMENT.to_string()")]
    pub metadata_segment: String,
}

impl ContainerConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        let params = StreamParams::new(
            self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            self.chunks_per_segment.unwrap_or(DEFAULT_CHUNKS_PER_SEGMENT),
            self.compression.unwrap_or_default(),
        );
        params.validate().map_err(|e| e.to_string())?;
        if matches!(&self.metadata_segment, Some(name) if name.is_empty()) {
            return Err("metadata segment name must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks_per_segment: DEFAULT_CHUNKS_PER_SEGMENT,
            compression: Compression::default(),
            content_digest: DigestMethod::default(),
            metadata_segment: default_metadata_segment(),
        }
    }
}

impl ContainerConfig {
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::default()
    }

    /// Stream parameters for new image streams.
    pub fn stream_params(&self) -> StreamParams {
        StreamParams::new(self.chunk_size, self.chunks_per_segment, self.compression)
    }

    pub fn validate(&self) -> Result<()> {
        self.stream_params()
            .validate()
            .map_err(|e| Aff4Error::Config(e.to_string()))?;
        if self.metadata_segment.is_empty() {
            return Err(Aff4Error::Config(
                "metadata segment name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let config: ContainerConfig = serde_json::from_reader(reader)
            .map_err(|e| Aff4Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let config_str =
            serde_json::to_string_pretty(&self).map_err(|e| Aff4Error::Config(e.to_string()))?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }
}

impl fmt::Display for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container configuration:")?;
        writeln!(f, "  chunk size:         {}", self.chunk_size)?;
        writeln!(f, "  chunks per segment: {}", self.chunks_per_segment)?;
        writeln!(f, "  compression:        {}", self.compression.uri())?;
        writeln!(f, "  content digest:     {}", self.content_digest.uri())?;
        write!(f, "  metadata segment:   {}", self.metadata_segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default() {
        let built = ContainerConfig::builder().build().unwrap();
        assert_eq!(built, ContainerConfig::default());
        assert_eq!(built.stream_params(), StreamParams::default());
    }

    #[test]
    fn builder_rejects_zero_chunk_size() {
        let err = ContainerConfig::builder().chunk_size(0).build();
        assert!(err.is_err());
        let err = ContainerConfig::builder().metadata_segment("").build();
        assert!(err.is_err());
    }

    #[test]
    fn file_roundtrip_with_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aff4.json");
        std::fs::write(&path, r#"{"chunk_size": 4096, "compression": "stored"}"#).unwrap();
        let cfg = ContainerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.chunk_size, 4096);
        assert_eq!(cfg.compression, Compression::Stored);
        assert_eq!(cfg.chunks_per_segment, DEFAULT_CHUNKS_PER_SEGMENT);

        let out = dir.path().join("saved.json");
        cfg.save_to_file(&out).unwrap();
        assert_eq!(ContainerConfig::from_file(&out).unwrap(), cfg);
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"chunks_per_segment": 0}"#).unwrap();
        assert!(matches!(
            ContainerConfig::from_file(&path),
            Err(Aff4Error::Config(_))
        ));
    }
}
