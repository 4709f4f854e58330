use aff4_bevy::{
    BevyReader, BevyWriter, Compression, DigestMethod, MemoryStore, ReadOutcome, StreamParams,
};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(31).wrapping_add(seed as u32) % 253) as u8)
        .collect()
}

fn write_stream(store: &MemoryStore, urn: &str, params: StreamParams, data: &[u8]) -> u64 {
    let mut w = BevyWriter::new(store, urn, params, DigestMethod::Md5).expect("writer");
    // Uneven write sizes so chunk boundaries never line up with calls.
    for part in data.chunks(10_007) {
        w.write(part).expect("write");
    }
    w.flush().expect("flush");
    let summary = w.close().expect("close");
    assert_eq!(summary.size, data.len() as u64);
    assert_eq!(summary.digest, DigestMethod::Md5.digest_hex(data));
    summary.size
}

#[test]
fn roundtrip_lengths_across_chunk_and_bevy_boundaries() {
    let cs = 32 * 1024;
    for compression in [Compression::Deflate, Compression::Stored] {
        let params = StreamParams::new(cs as u32, 2, compression);
        for len in [0, 17, cs, cs + 1, 2 * cs, 4 * cs + 17, 7 * cs - 3] {
            let store = MemoryStore::new();
            let urn = format!("aff4://rt/{len}");
            let data = pattern(len, 3);
            let size = write_stream(&store, &urn, params, &data);

            let mut r = BevyReader::new(&store, urn.as_str(), params, size).expect("reader");
            assert_eq!(r.read_all().expect("read all"), data, "len {len}");

            let expected_bevies = (len as u64).div_ceil(cs as u64).div_ceil(2);
            // one bevy blob plus one index blob per bevy
            assert_eq!(store.len() as u64, expected_bevies * 2, "len {len}");
        }
    }
}

#[test]
fn reads_back_in_chunk_sized_pieces() {
    let cs = 32 * 1024;
    let params = StreamParams::new(cs as u32, 2, Compression::Deflate);
    let store = MemoryStore::new();
    let data = pattern(4 * cs + 17, 9);
    let size = write_stream(&store, "aff4://pieces", params, &data);

    let mut r = BevyReader::new(&store, "aff4://pieces", params, size).unwrap();
    let mut buf = vec![0u8; cs];
    for i in 0..4 {
        assert_eq!(r.read(&mut buf).unwrap(), ReadOutcome::Data(cs));
        assert_eq!(&buf[..], &data[i * cs..(i + 1) * cs]);
    }
    assert_eq!(r.read(&mut buf).unwrap(), ReadOutcome::Data(17));
    assert_eq!(&buf[..17], &data[4 * cs..]);
    assert_eq!(r.read(&mut buf).unwrap(), ReadOutcome::EndOfStream);
}

#[test]
fn end_of_stream_is_distinct_from_short_read() {
    let params = StreamParams::new(16, 4, Compression::Stored);
    let store = MemoryStore::new();
    let data = pattern(40, 1);
    let size = write_stream(&store, "aff4://eos", params, &data);
    let mut r = BevyReader::new(&store, "aff4://eos", params, size).unwrap();

    let mut buf = [0u8; 32];
    assert_eq!(r.read_at(30, &mut buf).unwrap(), ReadOutcome::Data(10));
    assert_eq!(&buf[..10], &data[30..]);
    assert_eq!(r.read_at(40, &mut buf).unwrap(), ReadOutcome::EndOfStream);
    assert_eq!(r.read_at(1000, &mut buf).unwrap(), ReadOutcome::EndOfStream);
}

#[test]
fn final_short_chunk_is_indexed_like_any_other() {
    let params = StreamParams::new(10, 8, Compression::Stored);
    let store = MemoryStore::new();
    let data = pattern(25, 5);
    write_stream(&store, "aff4://short", params, &data);
    let raw = aff4_bevy::BlobStore::get(&store, &aff4_bevy::index_name("aff4://short", 0)).unwrap();
    let idx = aff4_bevy::BevyIndex::decode("idx", &raw).unwrap();
    assert_eq!(idx.len(), 3);
    assert_eq!(idx.chunk_range(2), Some((20, 25)));
}

#[test]
fn std_io_traits_work_for_copying() {
    use std::io::{Read, Seek, SeekFrom, Write};
    let params = StreamParams::new(64, 4, Compression::Deflate);
    let store = MemoryStore::new();
    let data = pattern(1000, 7);
    let mut w = BevyWriter::new(&store, "aff4://io", params, DigestMethod::Sha256).unwrap();
    std::io::copy(&mut &data[..], &mut w).unwrap();
    Write::flush(&mut w).unwrap();
    let summary = w.close().unwrap();
    assert_eq!(summary.digest_method, DigestMethod::Sha256);

    let mut r = BevyReader::new(&store, "aff4://io", params, summary.size).unwrap();
    r.seek(SeekFrom::End(-100)).unwrap();
    let mut tail = Vec::new();
    Read::read_to_end(&mut r, &mut tail).unwrap();
    assert_eq!(tail, &data[900..]);
}
