//! Maps: virtual streams stitched together from ranges of other streams.
//!
//! A map is a sorted list of points. Each point says that the map range
//! `[offset, offset + length)` is served by `target[target_offset ..]`, or
//! that its content is unknown. Points are stored in the graph as slice
//! resources: the map `contains` `map[offset:length]`, and that slice is
//! `sameAs` either `target[target_offset:length]` or `aff4:UnknownData`.
//!
//! Bytes written through a [`MapWriter`] land in a backing image stream
//! named `{map}/data`; seeking forward leaves an unknown gap behind.
//!
//! Basic example
//!
//! ```no_run
//! use aff4::{Container, ContainerConfig, RandomRead};
//! use aff4_bevy::MemoryStore;
//!
//! let mut c = Container::create(MemoryStore::new(), ContainerConfig::default()).unwrap();
//! let mut m = c.new_map().unwrap();
//! m.write(b"boot sector").unwrap();
//! m.seek(1 << 20).unwrap();
//! m.write(b"superblock").unwrap();
//! let info = m.close().unwrap();
//!
//! let mut r = c.open_map(&info.urn).unwrap();
//! assert_eq!(r.read_range(0, 4).unwrap(), b"boot");
//! assert!(r.read_range(4096, 1).is_err());
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use aff4_bevy::{BlobStore, ReadOutcome};
use log::{debug, info};

use crate::consts::{CONTAINS, DATA_STREAM, MAP, SAME_AS, SIZE, STORED, TYPE, UNKNOWN_DATA};
use crate::container::Container;
use crate::errors::Aff4Error;
use crate::quadstore::QuadStore;
use crate::stream::{ImageStreamWriter, RandomRead};
use crate::term::{Object, SliceResource};
use crate::Result;

/// Where a point's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTarget {
    Stream(String),
    UnknownData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPoint {
    pub offset: u64,
    pub length: u64,
    /// Offset into the target; zero for unknown data.
    pub target_offset: u64,
    pub target: MapTarget,
}

impl MapPoint {
    /// One past the last byte. Saturates for hand-built points that would
    /// overflow; loaded and written points never do.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn is_unknown(&self) -> bool {
        self.target == MapTarget::UnknownData
    }
}

/// What the graph records about a closed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub urn: String,
    pub size: u64,
    pub data_stream: String,
    pub points: Vec<MapPoint>,
}

// ---------------- Writer ----------------

pub struct MapWriter<'c, S: BlobStore + ?Sized> {
    urn: String,
    volume: String,
    data: ImageStreamWriter<'c, S>,
    points: Vec<MapPoint>,
    write_ptr: u64,
    /// The last point maps sequential writes and may still grow.
    open_point: bool,
}

impl<'c, S: BlobStore + ?Sized> MapWriter<'c, S> {
    pub(crate) fn new(urn: String, volume: String, data: ImageStreamWriter<'c, S>) -> Self {
        Self {
            urn,
            volume,
            data,
            points: Vec::new(),
            write_ptr: 0,
            open_point: false,
        }
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Current logical write position, also the map's size so far.
    pub fn position(&self) -> u64 {
        self.write_ptr
    }

    pub fn points(&self) -> &[MapPoint] {
        &self.points
    }

    /// Append `data` at the write position, storing it in the backing stream.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = data.len() as u64;
        let end = self.advance(len)?;
        let target_offset = self.data.size();
        self.data.write(data)?;
        match self.points.last_mut() {
            Some(point) if self.open_point => point.length += len,
            _ => {
                self.points.push(MapPoint {
                    offset: self.write_ptr,
                    length: len,
                    target_offset,
                    target: MapTarget::Stream(self.data.urn().to_string()),
                });
                self.open_point = true;
            }
        }
        self.write_ptr = end;
        Ok(data.len())
    }

    /// Write position after `length` more bytes.
    fn advance(&self, length: u64) -> Result<u64> {
        self.write_ptr.checked_add(length).ok_or_else(|| {
            Aff4Error::map_invariant(
                &self.urn,
                format!("{length} bytes at offset {} overflow the map", self.write_ptr),
            )
        })
    }

    /// Move the write position forward; the skipped range becomes unknown data.
    ///
    /// Seeking to the current position is a no-op and seeking backwards is
    /// an [`Aff4Error::InvalidSeek`].
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset < self.write_ptr {
            return Err(Aff4Error::InvalidSeek {
                write_ptr: self.write_ptr,
                requested: offset,
            });
        }
        if offset == self.write_ptr {
            return Ok(());
        }
        let gap = offset - self.write_ptr;
        match self.points.last_mut() {
            Some(point) if point.is_unknown() => point.length += gap,
            _ => self.points.push(MapPoint {
                offset: self.write_ptr,
                length: gap,
                target_offset: 0,
                target: MapTarget::UnknownData,
            }),
        }
        self.open_point = false;
        self.write_ptr = offset;
        Ok(())
    }

    /// Map the next `length` bytes to `target[target_offset..]` without copying.
    pub fn map_range(&mut self, length: u64, target: &str, target_offset: u64) -> Result<()> {
        if target == self.urn {
            return Err(Aff4Error::map_invariant(&self.urn, "a map cannot target itself"));
        }
        if length == 0 {
            return Ok(());
        }
        let end = self.advance(length)?;
        if target_offset.checked_add(length).is_none() {
            return Err(Aff4Error::map_invariant(
                &self.urn,
                format!("{target}[{target_offset}:{length}] overflows its target"),
            ));
        }
        self.points.push(MapPoint {
            offset: self.write_ptr,
            length,
            target_offset,
            target: MapTarget::Stream(target.to_string()),
        });
        self.open_point = false;
        self.write_ptr = end;
        Ok(())
    }

    /// Close the backing stream and record the map's points.
    pub fn close(self) -> Result<MapInfo> {
        let MapWriter {
            urn,
            volume,
            data,
            points,
            write_ptr,
            ..
        } = self;
        let (graph, data_info) = data.finish()?;
        record_map(graph, &volume, &urn, write_ptr, &data_info.urn, &points);
        info!(
            "Closed map {} ({} bytes, {} points)",
            urn,
            write_ptr,
            points.len()
        );
        Ok(MapInfo {
            urn,
            size: write_ptr,
            data_stream: data_info.urn,
            points,
        })
    }
}

fn record_map(
    graph: &mut QuadStore,
    volume: &str,
    urn: &str,
    size: u64,
    data_stream: &str,
    points: &[MapPoint],
) {
    graph.insert(volume, urn, TYPE, Object::resource(MAP));
    graph.insert(volume, urn, STORED, Object::resource(volume));
    graph.insert(volume, urn, SIZE, Object::long(size));
    graph.insert(volume, urn, DATA_STREAM, Object::resource(data_stream));
    graph.insert(volume, volume, CONTAINS, Object::resource(urn));
    for point in points {
        let slice = SliceResource::new(urn, point.offset, point.length).to_string();
        let target = match &point.target {
            MapTarget::Stream(t) => {
                Object::from(SliceResource::new(t.as_str(), point.target_offset, point.length))
            }
            MapTarget::UnknownData => Object::resource(UNKNOWN_DATA),
        };
        graph.insert(volume, urn, CONTAINS, Object::resource(slice.as_str()));
        graph.insert(volume, &slice, SAME_AS, target);
    }
}

/// Read the size and sorted points of map `urn` from the graph.
///
/// Overlapping points or points past the end are rejected here. Gaps are
/// not: they only fail when a read lands in them.
pub fn load_points(graph: &QuadStore, urn: &str) -> Result<(u64, Vec<MapPoint>)> {
    let size = graph.require_u64(None, urn, SIZE)?;
    let mut points = Vec::new();
    for obj in graph.objects(None, urn, CONTAINS) {
        let text = obj
            .as_resource()
            .ok_or_else(|| Aff4Error::map_invariant(urn, "contains a literal"))?;
        let slice = SliceResource::parse(text)?;
        if slice.base != urn {
            return Err(Aff4Error::map_invariant(
                urn,
                format!("{text} is not a slice of this map"),
            ));
        }
        if slice.length == 0 {
            continue;
        }
        let target = graph.require_resource(None, text, SAME_AS)?;
        let point = if target == UNKNOWN_DATA {
            MapPoint {
                offset: slice.offset,
                length: slice.length,
                target_offset: 0,
                target: MapTarget::UnknownData,
            }
        } else {
            let t = SliceResource::parse(target)?;
            if t.length != slice.length {
                return Err(Aff4Error::map_invariant(
                    urn,
                    format!("{text} is the same as {target}, which has a different length"),
                ));
            }
            MapPoint {
                offset: slice.offset,
                length: slice.length,
                target_offset: t.offset,
                target: MapTarget::Stream(t.base),
            }
        };
        points.push(point);
    }
    points.sort_by_key(|p| p.offset);
    for pair in points.windows(2) {
        if pair[0].offset.checked_add(pair[0].length).map_or(true, |end| end > pair[1].offset) {
            return Err(Aff4Error::map_invariant(
                urn,
                format!("points overlap at offset {}", pair[1].offset),
            ));
        }
    }
    if let Some(last) = points.last() {
        if last.offset.checked_add(last.length).map_or(true, |end| end > size) {
            return Err(Aff4Error::map_invariant(
                urn,
                format!("point at {} extends past the map size {size}", last.offset),
            ));
        }
    }
    Ok((size, points))
}

// ---------------- Reader ----------------

/// Reader resolving map offsets through its points.
///
/// Target streams are opened on first use and kept open.
pub struct MapReader<'c, S: BlobStore> {
    container: &'c Container<S>,
    urn: String,
    size: u64,
    points: Vec<MapPoint>,
    depth: usize,
    targets: HashMap<String, Box<dyn RandomRead + 'c>>,
}

impl<'c, S: BlobStore> MapReader<'c, S> {
    pub(crate) fn open(container: &'c Container<S>, urn: &str, depth: usize) -> Result<Self> {
        let (size, points) = load_points(container.graph(), urn)?;
        debug!("Opened map {} ({} points)", urn, points.len());
        Ok(Self {
            container,
            urn: urn.to_string(),
            size,
            points,
            depth,
            targets: HashMap::new(),
        })
    }

    pub fn points(&self) -> &[MapPoint] {
        &self.points
    }

    /// The point covering `offset`, if any.
    pub fn point_at(&self, offset: u64) -> Option<&MapPoint> {
        let idx = self.points.partition_point(|p| p.end() <= offset);
        self.points.get(idx).filter(|p| p.offset <= offset)
    }

    fn target(&mut self, urn: &str) -> Result<&mut Box<dyn RandomRead + 'c>> {
        let container = self.container;
        let depth = self.depth + 1;
        match self.targets.entry(urn.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => Ok(e.insert(container.open_nested(urn, depth)?)),
        }
    }
}

impl<S: BlobStore> RandomRead for MapReader<'_, S> {
    fn urn(&self) -> &str {
        &self.urn
    }

    fn size(&self) -> u64 {
        self.size
    }

    /// Fails with [`Aff4Error::AddressResolution`] if any requested byte is
    /// unknown data, and with [`Aff4Error::UncoveredAddress`] if no point
    /// covers it.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        if offset >= self.size {
            return Ok(ReadOutcome::EndOfStream);
        }
        let want = (buf.len() as u64).min(self.size - offset) as usize;
        let mut done = 0usize;
        while done < want {
            let pos = offset + done as u64;
            let point = self
                .point_at(pos)
                .cloned()
                .ok_or_else(|| Aff4Error::UncoveredAddress {
                    map: self.urn.clone(),
                    offset: pos,
                })?;
            let within = pos - point.offset;
            let n = (point.length - within).min((want - done) as u64) as usize;
            let target = match &point.target {
                MapTarget::Stream(t) => t,
                MapTarget::UnknownData => {
                    return Err(Aff4Error::AddressResolution {
                        map: self.urn.clone(),
                        offset: pos,
                    })
                }
            };
            let reader = self.target(target)?;
            match reader.read_at(point.target_offset + within, &mut buf[done..done + n])? {
                ReadOutcome::Data(m) if m == n => {}
                _ => {
                    return Err(Aff4Error::map_invariant(
                        &self.urn,
                        format!(
                            "{target} ends before offset {}",
                            point.target_offset + within + n as u64
                        ),
                    ))
                }
            }
            done += n;
        }
        Ok(ReadOutcome::Data(want))
    }
}
