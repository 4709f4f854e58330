//! Error type for container, map and provenance operations.
//!
//! Codec failures from the bevy layer pass through unchanged so callers can
//! still match on [`aff4_bevy::BevyError`] variants.

use aff4_bevy::BevyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Aff4Error {
    #[error(transparent)]
    Bevy(#[from] BevyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The requested offset lies in a region the map marks as UnknownData.
    #[error("{map}: offset {offset} resolves to UnknownData")]
    AddressResolution { map: String, offset: u64 },

    /// No map point covers the requested offset.
    #[error("{map}: offset {offset} is not covered by any map point")]
    UncoveredAddress { map: String, offset: u64 },

    #[error("invalid map {map}: {reason}")]
    MapInvariant { map: String, reason: String },

    #[error("expected one {predicate} for {subject}, found {count}")]
    Ambiguous {
        subject: String,
        predicate: String,
        count: usize,
    },

    #[error("{subject} has no {predicate}")]
    MissingFact { subject: String, predicate: String },

    #[error("invalid {predicate} for {subject}: {reason}")]
    InvalidFact {
        subject: String,
        predicate: String,
        reason: String,
    },

    #[error("cannot seek map from write position {write_ptr} back to {requested}")]
    InvalidSeek { write_ptr: u64, requested: u64 },

    #[error("not a slice resource: {0}")]
    InvalidResource(String),

    #[error("{0} is neither an image stream nor a map")]
    UnknownStream(String),

    #[error("{0} already exists in this container")]
    Exists(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signing failed: {0}")]
    Crypto(String),

    #[error("authority {0} must be closed before it can issue warrants")]
    AuthorityNotClosed(String),

    #[error("invalid warrant {warrant}: {reason}")]
    InvalidWarrant { warrant: String, reason: String },

    #[error("metadata line {line}: {source}")]
    Metadata {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Aff4Error {
    pub(crate) fn invalid_fact(
        subject: &str,
        predicate: &str,
        reason: impl Into<String>,
    ) -> Self {
        Aff4Error::InvalidFact {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn map_invariant(map: &str, reason: impl Into<String>) -> Self {
        Aff4Error::MapInvariant {
            map: map.to_string(),
            reason: reason.into(),
        }
    }
}
