//! Criterion benchmarks for hot paths in the Collaboration Hub.
//!
//! Run with:
//!   cargo bench
//!
//! Covers:
//!   - CRDT document apply/encode (§4.5, the per-keystroke path)
//!   - Wire frame encode/decode (§6.5, every real-time message)
//!   - Hierarchy derivation (§4.3, a pure function recomputed per request)

use collabhub::file_store::hierarchy::build_hierarchy;
use collabhub::rooms::document::CrdtDocument;
use collabhub::transport::wire::Frame;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_crdt_document(c: &mut Criterion) {
    c.bench_function("crdt_seed_1kb", |b| {
        let content = "x".repeat(1024);
        b.iter(|| {
            let doc = CrdtDocument::seeded(black_box(&content));
            black_box(doc.to_text());
        });
    });

    c.bench_function("crdt_apply_sequential_inserts", |b| {
        b.iter(|| {
            let mut doc = CrdtDocument::new();
            for i in 0..100u32 {
                let update = {
                    let peer = CrdtDocument::seeded(&"a".repeat(i as usize));
                    peer.encode_full()
                };
                doc.apply(black_box(&update)).unwrap();
            }
            black_box(doc.to_text());
        });
    });

    c.bench_function("crdt_state_vector_and_diff", |b| {
        let doc = CrdtDocument::seeded(&"line\n".repeat(200));
        b.iter(|| {
            let sv = doc.state_vector();
            let diff = doc.encode_diff(black_box(&sv)).unwrap();
            black_box(diff);
        });
    });
}

fn bench_wire_frames(c: &mut Criterion) {
    c.bench_function("wire_encode_decode_doc_update", |b| {
        let payload = vec![7u8; 2048];
        b.iter(|| {
            let frame = Frame::DocUpdate(black_box(payload.clone()));
            let encoded = frame.encode();
            black_box(Frame::decode(&encoded).unwrap());
        });
    });

    c.bench_function("wire_encode_decode_ping", |b| {
        b.iter(|| {
            let encoded = Frame::Ping.encode();
            black_box(Frame::decode(black_box(&encoded)).unwrap());
        });
    });
}

fn bench_hierarchy(c: &mut Criterion) {
    let paths: Vec<String> = (0..500)
        .map(|i| format!("src/module{}/file{}.js", i % 20, i))
        .collect();

    c.bench_function("build_hierarchy_500_files", |b| {
        b.iter(|| {
            black_box(build_hierarchy(black_box(&paths)));
        });
    });
}

criterion_group!(benches, bench_crdt_document, bench_wire_frames, bench_hierarchy);
criterion_main!(benches);
