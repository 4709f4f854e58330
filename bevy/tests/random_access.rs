use aff4_bevy::{BevyReader, BevyWriter, Compression, DigestMethod, MemoryStore, StreamParams};

fn build(store: &MemoryStore, params: StreamParams, chunks: usize) -> Vec<u8> {
    let cs = params.chunk_size as usize;
    let mut w = BevyWriter::new(store, "aff4://ra", params, DigestMethod::Md5).unwrap();
    let mut all = Vec::with_capacity(cs * chunks);
    for k in 0..chunks {
        let chunk: Vec<u8> = (0..cs).map(|i| ((k * 7 + i) % 241) as u8).collect();
        w.write(&chunk).unwrap();
        all.extend_from_slice(&chunk);
    }
    w.close().unwrap();
    all
}

#[test]
fn seeking_to_a_mid_stream_chunk_inflates_only_that_chunk() {
    let params = StreamParams::new(4096, 4, Compression::Deflate);
    let store = MemoryStore::new();
    let data = build(&store, params, 13);

    let mut r = BevyReader::new(&store, "aff4://ra", params, data.len() as u64).unwrap();
    let k = 9u64;
    let chunk = r.read_chunk(k).unwrap();
    assert_eq!(chunk, &data[k as usize * 4096..(k as usize + 1) * 4096]);
    let stats = r.stats();
    assert_eq!(stats.chunks_decompressed, 1);
    assert_eq!(stats.index_fetches, 1);
}

#[test]
fn index_is_fetched_once_per_bevy() {
    let params = StreamParams::new(1024, 4, Compression::Deflate);
    let store = MemoryStore::new();
    let data = build(&store, params, 12);
    let mut r = BevyReader::new(&store, "aff4://ra", params, data.len() as u64).unwrap();

    // Three chunks of bevy 1, then bevy 2, then back to bevy 1.
    for k in [4u64, 5, 7, 9, 6] {
        let got = r.read_chunk(k).unwrap();
        assert_eq!(got, &data[k as usize * 1024..(k as usize + 1) * 1024]);
    }
    assert_eq!(r.stats().index_fetches, 3);
    assert_eq!(r.stats().chunks_decompressed, 5);
}

#[test]
fn unaligned_read_straddling_chunks() {
    let params = StreamParams::new(1000, 3, Compression::Deflate);
    let store = MemoryStore::new();
    let data = build(&store, params, 10);
    let mut r = BevyReader::new(&store, "aff4://ra", params, data.len() as u64).unwrap();
    let mut buf = vec![0u8; 2500];
    r.read_at(2750, &mut buf).unwrap();
    assert_eq!(buf, &data[2750..5250]);
    // chunks 2,3,4,5 span two bevies
    assert_eq!(r.stats().chunks_decompressed, 4);
    assert_eq!(r.stats().index_fetches, 2);
}
