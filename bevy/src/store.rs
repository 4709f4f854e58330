//! Named-blob store contract and two backends.
//!
//! The codec only needs three things from a container: create a named
//! output, open a named input, and list entry names. Names are opaque keys;
//! [`DirectoryStore`] percent-encodes them into file names.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use fs2::FileExt;
use log::{debug, info};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use walkdir::WalkDir;

use crate::error::BevyError;
use crate::Result;

/// Writable blob; bytes become visible under its name only after [`BlobSink::commit`].
pub trait BlobSink: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Readable, seekable blob of known length.
pub trait BlobSource: Read + Seek + Send {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A container used purely as a key/value store of named blobs.
pub trait BlobStore: Send + Sync {
    /// Start writing blob `name`. `compressed` and `size_hint` are advisory.
    fn create_output(&self, name: &str, compressed: bool, size_hint: u64)
        -> Result<Box<dyn BlobSink>>;

    /// Open blob `name` for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn BlobSource>>;

    /// All entry names, sorted.
    fn list_entries(&self) -> Result<Vec<String>>;

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.list_entries()?.iter().any(|n| n == name))
    }

    /// Write a whole blob in one go.
    fn put(&self, name: &str, data: &[u8], compressed: bool) -> Result<()> {
        let mut sink = self.create_output(name, compressed, data.len() as u64)?;
        sink.write_all(data)?;
        sink.commit()
    }

    /// Read a whole blob.
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let mut src = self.open_input(name)?;
        let mut out = Vec::with_capacity(src.len() as usize);
        src.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Read `len` bytes of blob `name` starting at `offset`.
    fn read_range(&self, name: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut src = self.open_input(name)?;
        src.seek(SeekFrom::Start(offset))?;
        let mut out = vec![0u8; len];
        src.read_exact(&mut out)?;
        Ok(out)
    }
}

// ---------------- In-memory store ----------------

type Entries = Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>;

/// Shared in-memory store. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Entries,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }
}

struct MemorySink {
    name: String,
    buf: Vec<u8>,
    entries: Entries,
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobSink for MemorySink {
    fn commit(self: Box<Self>) -> Result<()> {
        let MemorySink { name, buf, entries } = *self;
        entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(buf));
        Ok(())
    }
}

#[derive(Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl BlobSource for Cursor<SharedBytes> {
    fn len(&self) -> u64 {
        self.get_ref().0.len() as u64
    }
}

impl BlobStore for MemoryStore {
    fn create_output(
        &self,
        name: &str,
        _compressed: bool,
        size_hint: u64,
    ) -> Result<Box<dyn BlobSink>> {
        Ok(Box::new(MemorySink {
            name: name.to_string(),
            buf: Vec::with_capacity(size_hint.min(1 << 26) as usize),
            entries: Arc::clone(&self.entries),
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn BlobSource>> {
        let data = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BevyError::MissingBlob(name.to_string()))?;
        Ok(Box::new(Cursor::new(SharedBytes(data))))
    }

    fn list_entries(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name))
    }
}

// ---------------- Directory store ----------------

/// Characters kept verbatim in entry file names. `~` stays encoded so the
/// lock and temp files below can never collide with an entry.
const ENTRY_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');
const LOCK_FILE: &str = "~lock";
const TMP_PREFIX: &str = "~tmp-";

/// One file per entry under a root directory.
///
/// Opened with [`DirectoryStore::create`] the store holds an exclusive lock
/// for the lifetime of the value; [`DirectoryStore::open`] takes none.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    lock: Option<File>,
}

impl DirectoryStore {
    /// Open (creating if needed) `root` for writing.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| BevyError::Locked(root.display().to_string()))?;
        info!("Opened directory store for writing: {:?}", root);
        Ok(Self {
            root,
            lock: Some(lock),
        })
    }

    /// Open an existing `root` for reading.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(BevyError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }
        Ok(Self { root, lock: None })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True if this handle holds the writer lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(utf8_percent_encode(name, ENTRY_NAME).to_string())
    }
}

struct DirectorySink {
    file: BufWriter<File>,
    tmp: PathBuf,
    dest: PathBuf,
}

impl Write for DirectorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobSink for DirectorySink {
    fn commit(self: Box<Self>) -> Result<()> {
        let DirectorySink { file, tmp, dest } = *self;
        let file = file.into_inner().map_err(|e| BevyError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &dest)?;
        Ok(())
    }
}

struct DirectorySource {
    file: BufReader<File>,
    len: u64,
}

impl Read for DirectorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for DirectorySource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl BlobSource for DirectorySource {
    fn len(&self) -> u64 {
        self.len
    }
}

impl BlobStore for DirectoryStore {
    fn create_output(
        &self,
        name: &str,
        compressed: bool,
        size_hint: u64,
    ) -> Result<Box<dyn BlobSink>> {
        let dest = self.path_for(name);
        let encoded = utf8_percent_encode(name, ENTRY_NAME).to_string();
        let tmp = self.root.join(format!("{TMP_PREFIX}{encoded}"));
        debug!(
            "Creating entry {} (compressed={}, size_hint={})",
            name, compressed, size_hint
        );
        let file = File::create(&tmp)?;
        Ok(Box::new(DirectorySink {
            file: BufWriter::new(file),
            tmp,
            dest,
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn BlobSource>> {
        let path = self.path_for(name);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BevyError::MissingBlob(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        Ok(Box::new(DirectorySource {
            file: BufReader::new(file),
            len,
        }))
    }

    fn list_entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| BevyError::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            if file_name.starts_with('~') {
                continue;
            }
            match percent_decode_str(file_name).decode_utf8() {
                Ok(name) => names.push(name.into_owned()),
                Err(_) => debug!("Skipping undecodable entry {}", file_name),
            }
        }
        names.sort();
        Ok(names)
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.path_for(name).is_file())
    }
}
