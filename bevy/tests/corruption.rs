use aff4_bevy::{
    bevy_name, index_name, BevyError, BevyReader, BevyWriter, BlobStore, Compression,
    DigestMethod, MemoryStore, StreamParams,
};

fn written(params: StreamParams) -> (MemoryStore, u64) {
    let store = MemoryStore::new();
    let mut w = BevyWriter::new(&store, "aff4://c", params, DigestMethod::Md5).unwrap();
    w.write(&vec![42u8; 300]).unwrap();
    let s = w.close().unwrap();
    (store, s.size)
}

#[test]
fn index_without_sentinel_aborts_the_read() {
    let params = StreamParams::new(100, 4, Compression::Deflate);
    let (store, size) = written(params);
    let name = index_name("aff4://c", 0);
    let mut raw = store.get(&name).unwrap();
    raw.truncate(raw.len() - 4);
    store.put(&name, &raw, false).unwrap();

    let mut r = BevyReader::new(&store, "aff4://c", params, size).unwrap();
    let mut buf = [0u8; 10];
    let err = r.read_at(0, &mut buf).unwrap_err();
    assert!(matches!(err, BevyError::MissingSentinel(n) if n == name));
}

#[test]
fn chunk_larger_than_recorded_chunk_size_is_fatal() {
    let params = StreamParams::new(100, 4, Compression::Deflate);
    let (store, size) = written(params);
    // Claim a smaller chunk size than the data was written with.
    let lying = StreamParams::new(50, 4, Compression::Deflate);
    let mut r = BevyReader::new(&store, "aff4://c", lying, size).unwrap();
    let mut buf = [0u8; 10];
    let err = r.read_at(0, &mut buf).unwrap_err();
    assert!(matches!(err, BevyError::ChunkOverflow { chunk: 0, limit: 50 }));
}

#[test]
fn missing_bevy_blob_is_reported() {
    let params = StreamParams::new(100, 4, Compression::Stored);
    let (store, size) = written(params);
    assert!(store.remove(&bevy_name("aff4://c", 0)));
    let mut r = BevyReader::new(&store, "aff4://c", params, size).unwrap();
    let mut buf = [0u8; 10];
    assert!(matches!(
        r.read_at(0, &mut buf),
        Err(BevyError::MissingBlob(_))
    ));
}

#[test]
fn truncated_bevy_is_a_short_read() {
    let params = StreamParams::new(100, 4, Compression::Stored);
    let (store, size) = written(params);
    let name = bevy_name("aff4://c", 0);
    let mut raw = store.get(&name).unwrap();
    raw.truncate(150);
    store.put(&name, &raw, false).unwrap();
    let mut r = BevyReader::new(&store, "aff4://c", params, size).unwrap();
    let mut buf = [0u8; 10];
    assert!(r.read_at(0, &mut buf).is_ok());
    assert!(matches!(
        r.read_at(250, &mut buf),
        Err(BevyError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
    ));
}
