//! Running content digests computed while a stream is written.
//!
//! MD5 remains the default for compatibility with existing containers; the
//! method is recorded next to the value so readers never have to guess.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hash function used for a stream's content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestMethod {
    #[default]
    Md5,
    Sha256,
    Blake3,
}

impl DigestMethod {
    const MD5_URI: &'static str = "http://aff4.org/Schema#MD5";
    const SHA256_URI: &'static str = "http://aff4.org/Schema#SHA256";
    const BLAKE3_URI: &'static str = "http://aff4.org/Schema#Blake3";

    pub fn uri(&self) -> &'static str {
        match self {
            DigestMethod::Md5 => Self::MD5_URI,
            DigestMethod::Sha256 => Self::SHA256_URI,
            DigestMethod::Blake3 => Self::BLAKE3_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::MD5_URI => Some(DigestMethod::Md5),
            Self::SHA256_URI => Some(DigestMethod::Sha256),
            Self::BLAKE3_URI => Some(DigestMethod::Blake3),
            _ => None,
        }
    }

    pub fn hasher(&self) -> StreamHasher {
        match self {
            DigestMethod::Md5 => StreamHasher::Md5(Md5::new()),
            DigestMethod::Sha256 => StreamHasher::Sha256(Sha256::new()),
            DigestMethod::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// One-shot lowercase hex digest of `data`.
    pub fn digest_hex(&self, data: &[u8]) -> String {
        let mut h = self.hasher();
        h.update(data);
        h.finalize_hex()
    }
}

/// Incremental hasher for one of the supported [`DigestMethod`]s.
#[derive(Clone)]
pub enum StreamHasher {
    Md5(Md5),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl std::fmt::Debug for StreamHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamHasher({:?})", self.method())
    }
}

impl StreamHasher {
    pub fn method(&self) -> DigestMethod {
        match self {
            StreamHasher::Md5(_) => DigestMethod::Md5,
            StreamHasher::Sha256(_) => DigestMethod::Sha256,
            StreamHasher::Blake3(_) => DigestMethod::Blake3,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Md5(h) => h.update(data),
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Md5(h) => hex::encode(h.finalize()),
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}
