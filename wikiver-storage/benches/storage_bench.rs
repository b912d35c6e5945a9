// Copyright 2025 Wikiver Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use wikiver_core::{ArticleId, EngineConfig, SystemClock};
use wikiver_storage::{CompressionEngine, DiffEngine, VersionStore};

fn article(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("Line {i}: wetlands filter runoff and store carbon in peat."))
        .collect::<Vec<_>>()
        .join("\n")
}

fn edited(text: &str) -> String {
    text.replace("Line 3:", "Line three:")
        .replace("Line 40:", "Line forty:")
}

fn bench_diff(c: &mut Criterion) {
    let engine = DiffEngine::new();
    let mut group = c.benchmark_group("diff");

    for lines in [50usize, 500, 5000].iter() {
        let old = article(*lines);
        let new = edited(&old);
        group.throughput(Throughput::Bytes(old.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| engine.diff(black_box(&old), black_box(&new)));
        });
    }

    group.finish();
}

fn bench_compress_best(c: &mut Criterion) {
    let engine = CompressionEngine::new();
    let mut group = c.benchmark_group("compress_best");

    for lines in [50usize, 500, 5000].iter() {
        let text = article(*lines);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| engine.compress_best(black_box(&text)).unwrap());
        });
    }

    group.finish();
}

fn bench_chain_read(c: &mut Criterion) {
    let config = EngineConfig::default().without_cache();
    let store = VersionStore::new(config, Arc::new(SystemClock));
    let id = ArticleId(1);

    let mut text = article(200);
    store.create_version(id, &text, "bench").unwrap();
    for i in 0..10 {
        text = format!("{text}\nAppended paragraph {i}.");
        store.create_version(id, &text, "bench").unwrap();
    }

    c.bench_function("read_end_of_chain", |b| {
        b.iter(|| store.get_version_content(id, black_box(11)).unwrap());
    });
}

criterion_group!(benches, bench_diff, bench_compress_best, bench_chain_read);
criterion_main!(benches);
