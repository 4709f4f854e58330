//! aff4: forensic evidence containers.
//!
//! A container is a blob store plus a metadata graph. Evidence bytes live in
//! image streams (chunked, compressed, randomly addressable; see the
//! `aff4-bevy` crate); maps stitch ranges of streams into sparse virtual
//! images; every fact about them is a quad in an indexed [`QuadStore`].
//! Warrants sign digests of chosen graphs so that later tampering shows up.
//!
//! Basic example
//!
//! ```no_run
//! use aff4::integrity::verify_container;
//! use aff4::{Container, ContainerConfig};
//! use aff4_bevy::DirectoryStore;
//!
//! let store = DirectoryStore::create("/tmp/case-001").unwrap();
//! let mut container = Container::create(store, ContainerConfig::default()).unwrap();
//! let mut image = container.new_image_stream().unwrap();
//! image.write(&[0u8; 4096]).unwrap();
//! image.close().unwrap();
//! assert!(verify_container(&container).is_ok());
//! container.close().unwrap();
//! ```

pub mod config;
pub mod consts;
pub mod container;
pub mod errors;
pub mod integrity;
pub mod map;
pub mod provenance;
pub mod quadstore;
pub mod stream;
pub mod term;
pub mod text;

pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use container::{Container, StreamKind};
pub use errors::Aff4Error;
pub use map::{MapInfo, MapPoint, MapReader, MapTarget, MapWriter};
pub use quadstore::{Quad, QuadStore};
pub use stream::{ImageStreamInfo, ImageStreamReader, ImageStreamWriter, RandomRead};
pub use term::{Literal, Object, SliceResource};

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Aff4Error>;
