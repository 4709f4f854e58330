use aff4_bevy::{
    BevyReader, BevyWriter, Compression, DigestMethod, MemoryStore, StreamParams,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Half-compressible data: runs of a repeated byte interleaved with noise.
fn generate_image(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491_u32;
    (0..len)
        .map(|i| {
            if (i / 4096) % 2 == 0 {
                (i / 4096) as u8
            } else {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            }
        })
        .collect()
}

fn write_image(store: &MemoryStore, data: &[u8], compression: Compression) -> u64 {
    let params = StreamParams::new(32768, 64, compression);
    let mut w = BevyWriter::new(store, "aff4://bench", params, DigestMethod::Md5).unwrap();
    w.write(data).unwrap();
    w.close().unwrap().size
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    for mib in [1usize, 8] {
        let data = generate_image(mib << 20);
        group.throughput(Throughput::Bytes(data.len() as u64));
        for compression in [Compression::Deflate, Compression::Stored] {
            group.bench_with_input(
                BenchmarkId::new(format!("{compression:?}"), mib),
                &data,
                |b, data| {
                    b.iter(|| {
                        let store = MemoryStore::new();
                        write_image(&store, data, compression)
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_random_read(c: &mut Criterion) {
    let data = generate_image(8 << 20);
    let store = MemoryStore::new();
    let size = write_image(&store, &data, Compression::Deflate);
    let params = StreamParams::new(32768, 64, Compression::Deflate);
    let mut group = c.benchmark_group("random_read");
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("4KiB", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            let mut r = BevyReader::new(&store, "aff4://bench", params, size).unwrap();
            let mut buf = [0u8; 4096];
            offset = (offset + 7_340_033) % (size - 4096);
            r.read_at(offset, &mut buf).unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_write, bench_random_read);
criterion_main!(benches);
