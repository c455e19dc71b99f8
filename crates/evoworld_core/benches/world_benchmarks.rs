use criterion::{black_box, criterion_group, criterion_main, Criterion};
use evoworld_core::archive::MemoryArchive;
use evoworld_core::facets::{EnvironmentManager, SystematicsManager};
use evoworld_core::{Archive, Context, Facet, FacetId, FacetPtr, Update, World};
use std::sync::Arc;

/// Facet that only declares ordering.
struct Chain {
    after: FacetId,
}

impl Facet for Chain {
    fn facet_type(&self) -> &str {
        "bench.chain"
    }

    fn update_after(&self) -> FacetId {
        self.after.clone()
    }

    fn serialize(&self, archive: &mut dyn Archive) -> evoworld_core::Result<()> {
        archive.put("after", self.after.as_str())
    }
}

fn chained_world(n: usize) -> World {
    let mut world = World::new();
    for i in 0..n {
        let after = if i == 0 {
            FacetId::empty()
        } else {
            FacetId::from(format!("f{}", i - 1))
        };
        let facet: FacetPtr = Arc::new(Chain { after });
        let _ = world.attach_facet(format!("f{i}"), facet);
    }
    world
}

/// Benchmark attaching a 64-facet dependency chain.
fn bench_attach_chain(c: &mut Criterion) {
    c.bench_function("attach_chain_64", |b| {
        b.iter(|| black_box(chained_world(black_box(64))))
    });
}

/// Benchmark one update across a chain of no-op facets.
fn bench_perform_update(c: &mut Criterion) {
    let world = chained_world(64);
    let mut ctx = Context::new(42);
    let mut update = Update::ZERO;
    c.bench_function("perform_update_64", |b| {
        b.iter(|| {
            world.perform_update(&mut ctx, update);
            update = update.next();
        })
    });
}

/// Benchmark serializing a world with populated reference facets.
fn bench_serialize(c: &mut Criterion) {
    let mut world = World::new();
    let env = Arc::new(EnvironmentManager::new());
    for i in 0..16 {
        env.define_resource(&format!("r{i}"), 100.0, 1.0, 0.01);
    }
    let sys = Arc::new(SystematicsManager::default());
    for i in 0..256 {
        sys.classify(&format!("genome{}", i % 64), None);
    }
    let _ = world.attach_facet("environment", env);
    let _ = world.attach_facet("systematics", sys);

    c.bench_function("serialize_world", |b| {
        b.iter(|| {
            let mut archive = MemoryArchive::new("world");
            let report = world.serialize(&mut archive);
            black_box((archive, report.is_ok()))
        })
    });
}

criterion_group!(
    benches,
    bench_attach_chain,
    bench_perform_update,
    bench_serialize
);
criterion_main!(benches);
