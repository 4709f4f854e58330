//! A container session: one blob store, one metadata graph, one volume.
//!
//! The session owns the [`QuadStore`] for as long as the container is open.
//! Writers borrow it mutably and add their facts when they close; readers
//! borrow the session shared and look their parameters up in it. Closing the
//! session serializes the graph into the metadata segment and hands the
//! store back.
//!
//! Basic example
//!
//! ```no_run
//! use aff4::{Container, ContainerConfig, RandomRead};
//! use aff4_bevy::MemoryStore;
//!
//! let mut container = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
//! let mut w = container.new_image_stream().unwrap();
//! w.write(b"evidence").unwrap();
//! let info = w.close().unwrap();
//! let store = container.close().unwrap();
//!
//! let container = Container::open(store).unwrap();
//! let mut r = container.open_stream(&info.urn).unwrap();
//! assert_eq!(r.read_all().unwrap(), b"evidence");
//! ```

use std::io;

use aff4_bevy::{BlobStore, Compression, DigestMethod, StreamParams};
use log::{debug, info};
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::consts::{
    CHUNKS_IN_SEGMENT, CHUNK_SIZE, COMPRESSION_METHOD, HASH, IMAGE_STREAM, MAP, SIZE, TYPE,
    VOLUME,
};
use crate::errors::Aff4Error;
use crate::map::{MapReader, MapWriter};
use crate::quadstore::QuadStore;
use crate::stream::{ImageStreamInfo, ImageStreamReader, ImageStreamWriter, RandomRead};
use crate::term::Object;
use crate::text;
use crate::Result;

/// How deep maps may reference other maps before a read gives up.
const MAX_MAP_DEPTH: usize = 16;

/// What a stream URN refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Image,
    Map,
}

#[derive(Debug)]
pub struct Container<S: BlobStore> {
    store: S,
    config: ContainerConfig,
    volume: String,
    graph: QuadStore,
}

impl<S: BlobStore> Container<S> {
    /// A fresh `aff4://` URN.
    pub fn new_urn() -> String {
        format!("aff4://{}", Uuid::new_v4())
    }

    /// Start a new volume in `store`.
    pub fn create(store: S, config: ContainerConfig) -> Result<Self> {
        Self::create_with_urn(store, config, Self::new_urn())
    }

    pub fn create_with_urn(
        store: S,
        config: ContainerConfig,
        volume: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let volume = volume.into();
        let mut graph = QuadStore::new();
        graph.insert(&volume, &volume, TYPE, Object::resource(VOLUME));
        info!("Created volume {}", volume);
        Ok(Self {
            store,
            config,
            volume,
            graph,
        })
    }

    /// Open an existing volume using the default configuration.
    pub fn open(store: S) -> Result<Self> {
        Self::open_with_config(store, ContainerConfig::default())
    }

    /// Open an existing volume. `config` names the metadata segment and sets
    /// the defaults for any streams added from now on.
    pub fn open_with_config(store: S, config: ContainerConfig) -> Result<Self> {
        config.validate()?;
        let raw = store.get(&config.metadata_segment)?;
        let text = String::from_utf8(raw)
            .map_err(|e| Aff4Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let graph = text::parse_store(&text)?;
        let volume = {
            let volumes = graph.subjects(None, TYPE, &Object::resource(VOLUME));
            match volumes.as_slice() {
                [one] => one.to_string(),
                [] => {
                    return Err(Aff4Error::MissingFact {
                        subject: config.metadata_segment.clone(),
                        predicate: TYPE.to_string(),
                    })
                }
                many => {
                    return Err(Aff4Error::Ambiguous {
                        subject: config.metadata_segment.clone(),
                        predicate: TYPE.to_string(),
                        count: many.len(),
                    })
                }
            }
        };
        info!("Opened volume {} ({} facts)", volume, graph.len());
        Ok(Self {
            store,
            config,
            volume,
            graph,
        })
    }

    /// URN of this volume; also the name of the graph holding stream facts.
    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &QuadStore {
        &self.graph
    }

    /// Direct access for facts outside the stream vocabulary.
    pub fn graph_mut(&mut self) -> &mut QuadStore {
        &mut self.graph
    }

    /// Image stream URNs, sorted. Includes the data streams backing maps.
    pub fn image_streams(&self) -> Vec<String> {
        self.typed_subjects(IMAGE_STREAM)
    }

    pub fn maps(&self) -> Vec<String> {
        self.typed_subjects(MAP)
    }

    pub(crate) fn typed_subjects(&self, class: &str) -> Vec<String> {
        self.graph
            .subjects(None, TYPE, &Object::resource(class))
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn stream_kind(&self, urn: &str) -> Result<StreamKind> {
        let types = self.graph.objects(None, urn, TYPE);
        if types.contains(&&Object::resource(MAP)) {
            Ok(StreamKind::Map)
        } else if types.contains(&&Object::resource(IMAGE_STREAM)) {
            Ok(StreamKind::Image)
        } else {
            Err(Aff4Error::UnknownStream(urn.to_string()))
        }
    }

    fn ensure_new(&self, urn: &str) -> Result<()> {
        if self.graph.query(None, Some(urn), Some(TYPE), None).is_empty() {
            Ok(())
        } else {
            Err(Aff4Error::Exists(urn.to_string()))
        }
    }

    // ---------------- Writers ----------------

    /// New image stream with a fresh URN and the container defaults.
    pub fn new_image_stream(&mut self) -> Result<ImageStreamWriter<'_, S>> {
        let params = self.config.stream_params();
        let digest = self.config.content_digest;
        self.new_image_stream_with(Self::new_urn(), params, digest)
    }

    pub fn new_image_stream_named(
        &mut self,
        urn: impl Into<String>,
    ) -> Result<ImageStreamWriter<'_, S>> {
        let params = self.config.stream_params();
        let digest = self.config.content_digest;
        self.new_image_stream_with(urn, params, digest)
    }

    /// New image stream with explicit parameters.
    pub fn new_image_stream_with(
        &mut self,
        urn: impl Into<String>,
        params: StreamParams,
        digest: DigestMethod,
    ) -> Result<ImageStreamWriter<'_, S>> {
        let urn = urn.into();
        self.ensure_new(&urn)?;
        debug!("Opening image stream {} for writing", urn);
        ImageStreamWriter::new(&self.store, &mut self.graph, &self.volume, urn, params, digest)
    }

    /// New map with a fresh URN. Its written bytes go to `{map}/data`.
    pub fn new_map(&mut self) -> Result<MapWriter<'_, S>> {
        self.new_map_named(Self::new_urn())
    }

    pub fn new_map_named(&mut self, urn: impl Into<String>) -> Result<MapWriter<'_, S>> {
        let urn = urn.into();
        let data_urn = format!("{urn}/data");
        self.ensure_new(&urn)?;
        self.ensure_new(&data_urn)?;
        let params = self.config.stream_params();
        let digest = self.config.content_digest;
        let volume = self.volume.clone();
        let data = ImageStreamWriter::new(
            &self.store,
            &mut self.graph,
            &self.volume,
            data_urn,
            params,
            digest,
        )?;
        debug!("Opening map {} for writing", urn);
        Ok(MapWriter::new(urn, volume, data))
    }

    // ---------------- Readers ----------------

    /// Parameters and digest recorded for image stream `urn`.
    pub fn image_stream_info(&self, urn: &str) -> Result<ImageStreamInfo> {
        let g = &self.graph;
        let narrow = |predicate: &str| -> Result<u32> {
            u32::try_from(g.require_u64(None, urn, predicate)?)
                .map_err(|_| Aff4Error::invalid_fact(urn, predicate, "value exceeds 32 bits"))
        };
        let size = g.require_u64(None, urn, SIZE)?;
        let chunk_size = narrow(CHUNK_SIZE)?;
        let chunks_per_segment = narrow(CHUNKS_IN_SEGMENT)?;
        let compression_uri = g.require_resource(None, urn, COMPRESSION_METHOD)?;
        let compression = Compression::from_uri(compression_uri).ok_or_else(|| {
            Aff4Error::invalid_fact(
                urn,
                COMPRESSION_METHOD,
                format!("unsupported compression {compression_uri}"),
            )
        })?;
        let hash = g
            .require(None, urn, HASH)?
            .as_literal()
            .ok_or_else(|| Aff4Error::invalid_fact(urn, HASH, "expected a literal"))?;
        let digest_method = hash
            .datatype
            .as_deref()
            .and_then(DigestMethod::from_uri)
            .ok_or_else(|| Aff4Error::invalid_fact(urn, HASH, "unknown digest method"))?;
        Ok(ImageStreamInfo {
            urn: urn.to_string(),
            size,
            params: StreamParams::new(chunk_size, chunks_per_segment, compression),
            digest_method,
            digest: hash.value.clone(),
        })
    }

    pub fn open_image_stream(&self, urn: &str) -> Result<ImageStreamReader<'_, S>> {
        let info = self.image_stream_info(urn)?;
        ImageStreamReader::new(&self.store, info)
    }

    pub fn open_map(&self, urn: &str) -> Result<MapReader<'_, S>> {
        MapReader::open(self, urn, 0)
    }

    /// Open any stream, image or map, for positioned reads.
    pub fn open_stream(&self, urn: &str) -> Result<Box<dyn RandomRead + '_>> {
        self.open_nested(urn, 0)
    }

    pub(crate) fn open_nested(&self, urn: &str, depth: usize) -> Result<Box<dyn RandomRead + '_>> {
        if depth > MAX_MAP_DEPTH {
            return Err(Aff4Error::map_invariant(
                urn,
                format!("maps nest deeper than {MAX_MAP_DEPTH} levels"),
            ));
        }
        match self.stream_kind(urn)? {
            StreamKind::Image => Ok(Box::new(self.open_image_stream(urn)?)),
            StreamKind::Map => Ok(Box::new(MapReader::open(self, urn, depth)?)),
        }
    }

    // ---------------- Persistence ----------------

    /// Write the metadata graph to its segment without closing.
    pub fn flush_metadata(&self) -> Result<()> {
        let text = text::serialize(self.graph.iter())?;
        self.store
            .put(&self.config.metadata_segment, text.as_bytes(), true)?;
        debug!(
            "Wrote {} facts to {}",
            self.graph.len(),
            self.config.metadata_segment
        );
        Ok(())
    }

    /// Persist the metadata graph and return the store.
    pub fn close(self) -> Result<S> {
        self.flush_metadata()?;
        info!("Closed volume {}", self.volume);
        Ok(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aff4_bevy::MemoryStore;

    #[test]
    fn open_requires_exactly_one_volume() {
        let store = MemoryStore::new();
        store.put("information.json", b"", true).unwrap();
        assert!(matches!(
            Container::open(store.clone()),
            Err(Aff4Error::MissingFact { .. })
        ));

        let a = Container::create_with_urn(store.clone(), ContainerConfig::default(), "aff4://a")
            .unwrap();
        let mut graph = a.graph().clone();
        graph.insert("aff4://b", "aff4://b", TYPE, Object::resource(VOLUME));
        let text = text::serialize(graph.iter()).unwrap();
        store.put("information.json", text.as_bytes(), true).unwrap();
        assert!(matches!(
            Container::open(store),
            Err(Aff4Error::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn missing_metadata_segment_is_reported() {
        let err = Container::open(MemoryStore::new()).unwrap_err();
        assert!(matches!(
            err,
            Aff4Error::Bevy(aff4_bevy::BevyError::MissingBlob(_))
        ));
    }

    #[test]
    fn duplicate_stream_urn_is_rejected() {
        let mut c = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
        c.new_image_stream_named("aff4://s").unwrap().close().unwrap();
        assert!(matches!(
            c.new_image_stream_named("aff4://s"),
            Err(Aff4Error::Exists(_))
        ));
        assert_eq!(c.stream_kind("aff4://s").unwrap(), StreamKind::Image);
        assert!(matches!(
            c.stream_kind("aff4://nope"),
            Err(Aff4Error::UnknownStream(_))
        ));
    }
}
