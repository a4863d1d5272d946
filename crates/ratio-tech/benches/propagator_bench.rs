//! Criterion benchmarks for science-cost propagation.
//!
//! - `layered_500`: 500 technologies in 25 layers, each requiring three
//!   technologies from the previous layer.
//! - `sample`: the five-technology sample database.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ratio_core::database::{Database, DatabaseBuilder, GoodsAmount, GoodsKind, TechnologyDef};
use ratio_core::id::TechId;
use ratio_core::test_utils::sample_database;
use ratio_tech::TechnologyScience;

fn layered(layers: usize, width: usize) -> Database {
    let mut b = DatabaseBuilder::new();
    let packs: Vec<_> = (0..6)
        .map(|i| b.register_goods(&format!("pack_{i}"), GoodsKind::Item))
        .collect();
    for layer in 0..layers {
        for slot in 0..width {
            let prerequisites = if layer == 0 {
                Vec::new()
            } else {
                let base = (layer - 1) * width;
                (0..3)
                    .map(|k| TechId((base + (slot + k * 7) % width) as u32))
                    .collect()
            };
            let tier = (layer * packs.len() / layers).max(1);
            let ingredients = packs[..tier]
                .iter()
                .map(|&p| GoodsAmount::new(p, 1.0))
                .collect();
            b.register_technology(TechnologyDef {
                name: format!("tech_{layer}_{slot}"),
                prerequisites,
                ingredients,
                count: 50.0 * (layer + 1) as f64,
            });
        }
    }
    b.build().unwrap()
}

fn bench_layered(c: &mut Criterion) {
    let db = layered(25, 20);
    c.bench_function("layered_500", |b| {
        b.iter(|| TechnologyScience::compute(black_box(&db)))
    });
}

fn bench_sample(c: &mut Criterion) {
    let db = sample_database();
    c.bench_function("sample", |b| {
        b.iter(|| TechnologyScience::compute(black_box(&db)))
    });
}

criterion_group!(benches, bench_layered, bench_sample);
criterion_main!(benches);
