// These mirror the workloads the structure is built for: an operation
// mix at a given read ratio over a bounded population of keys, compared
// against the obvious RwLock<HashMap> alternative. The key space and the
// write edge are chosen so that a roll of [0, 10000) gives 99.99%,
// 99.9% or 99% reads. The map is cleared whenever it outgrows MAX_ITEM,
// which keeps the copy cost of the writes bounded and comparable across
// iterations.

extern crate cowmap;
extern crate criterion;
extern crate rand;

use cowmap::CowMap;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;

const KEY_SPACE: u64 = 10_000;
const MAX_ITEM: usize = 1_000;
const INSERT_BATCH: u64 = 1_000;

fn benchmark_cowmap(c: &mut Criterion, name: &str, write_edge: u64) {
    let map: CowMap<u64, u64> = CowMap::new();
    let mut rng = rand::rng();
    c.bench_function(name, |b| {
        b.iter(|| {
            let roll = rng.random_range(0..KEY_SPACE);
            let k = rng.random_range(0..KEY_SPACE);
            if roll >= write_edge {
                map.insert(k, k);
            } else {
                black_box(map.get(&k));
            }
            if map.len() > MAX_ITEM {
                map.clear();
            }
        })
    });
}

fn benchmark_rwlock(c: &mut Criterion, name: &str, write_edge: u64) {
    let map: RwLock<HashMap<u64, u64>> = RwLock::new(HashMap::new());
    let mut rng = rand::rng();
    c.bench_function(name, |b| {
        b.iter(|| {
            let roll = rng.random_range(0..KEY_SPACE);
            let k = rng.random_range(0..KEY_SPACE);
            if roll >= write_edge {
                map.write().unwrap().insert(k, k);
            } else {
                black_box(map.read().unwrap().get(&k).copied());
            }
            let len = map.read().unwrap().len();
            if len > MAX_ITEM {
                map.write().unwrap().clear();
            }
        })
    });
}

pub fn read_heavy_cowmap(c: &mut Criterion) {
    benchmark_cowmap(c, "cowmap 99.99% read", 9_999);
    benchmark_cowmap(c, "cowmap 99.9% read", 9_990);
    benchmark_cowmap(c, "cowmap 99% read", 9_900);
}

pub fn read_heavy_rwlock(c: &mut Criterion) {
    benchmark_rwlock(c, "rwlock 99.99% read", 9_999);
    benchmark_rwlock(c, "rwlock 99.9% read", 9_990);
    benchmark_rwlock(c, "rwlock 99% read", 9_900);
}

pub fn insert_sequential(c: &mut Criterion) {
    c.bench_function("insert_sequential", |b| {
        b.iter_batched(
            || CowMap::<u64, u64>::new(),
            |map| {
                for i in 0..INSERT_BATCH {
                    map.insert(i, i);
                }
                map
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn get_prefilled(c: &mut Criterion) {
    c.bench_function("get_prefilled", |b| {
        b.iter_batched(
            || {
                let map: CowMap<u64, u64> = (0..INSERT_BATCH).map(|i| (i, i)).collect();
                map
            },
            |map| {
                for i in 0..INSERT_BATCH {
                    black_box(map.get(&i));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    read_heavy_cowmap,
    read_heavy_rwlock,
    insert_sequential,
    get_prefilled
);
criterion_main!(benches);
