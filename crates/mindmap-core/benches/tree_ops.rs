use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mindmap_core::MindMap;
use mindmap_core::model::{DocumentId, NewDocument, NodeFields, NodeId};
use mindmap_core::tree::EditContext;

/// (name, children per node, levels below the root)
const TIERS: [(&str, usize, usize); 3] = [("small", 4, 3), ("medium", 8, 3), ("wide", 40, 2)];

struct Seeded {
    mm: MindMap,
    doc: DocumentId,
    root: NodeId,
    nodes: Vec<NodeId>,
}

fn seed(fanout: usize, levels: usize) -> Seeded {
    let mm = MindMap::in_memory().expect("open");
    let ctx = EditContext::user(1);
    let (doc, root) = mm
        .create_document(&ctx, &NewDocument::titled("bench"))
        .expect("document");
    let mut nodes = vec![root.id];
    let mut level = vec![root.id];
    for _ in 0..levels {
        let mut next = Vec::with_capacity(level.len() * fanout);
        for &parent in &level {
            for i in 0..fanout {
                let node = mm
                    .tree()
                    .create_node(
                        &ctx,
                        doc.id,
                        Some(parent),
                        &NodeFields::with_content(format!("node {i}")),
                    )
                    .expect("create");
                next.push(node.id);
            }
        }
        nodes.extend(&next);
        level = next;
    }
    Seeded {
        mm,
        doc: doc.id,
        root: root.id,
        nodes,
    }
}

fn bench_chunks(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunks");

    for (name, fanout, levels) in TIERS {
        let seeded = seed(fanout, levels);
        group.throughput(Throughput::Elements(seeded.nodes.len() as u64));

        group.bench_with_input(BenchmarkId::new("root_cold", name), &seeded, |b, s| {
            b.iter(|| {
                s.mm.cache().clear_cache(s.doc);
                black_box(s.mm.chunks().get_root_chunk(s.doc).expect("chunk"))
            });
        });

        group.bench_with_input(BenchmarkId::new("root_cached", name), &seeded, |b, s| {
            b.iter(|| black_box(s.mm.chunks().get_root_chunk(s.doc).expect("chunk")));
        });

        group.bench_with_input(BenchmarkId::new("by_level", name), &seeded, |b, s| {
            b.iter(|| black_box(s.mm.chunks().load_nodes_by_level(s.doc, 1, 2).expect("level")));
        });
    }

    group.finish();
}

fn bench_moves(c: &mut Criterion) {
    let mut group = c.benchmark_group("moves");
    let ctx = EditContext::user(1);

    for (name, fanout, levels) in TIERS {
        let seeded = seed(fanout, levels);
        // First child of the root carries the biggest subtree.
        let subtree = seeded.nodes[1];
        let targets = [seeded.nodes[2], seeded.root];

        group.bench_with_input(BenchmarkId::new("subtree", name), &seeded, |b, s| {
            let mut flip = 0;
            b.iter(|| {
                flip ^= 1;
                black_box(
                    s.mm.tree()
                        .move_node(&ctx, subtree, Some(targets[flip]), None)
                        .expect("move"),
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("check", name), &seeded, |b, s| {
            b.iter(|| black_box(s.mm.tree().check_integrity(s.doc).expect("check")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunks, bench_moves);
criterion_main!(benches);
