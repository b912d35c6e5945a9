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

//! Concurrency checks: writers serialised per article, readers isolated

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use wikiver_core::{ArticleId, EngineConfig, SystemClock};
use wikiver_storage::VersionStore;

fn shared_store() -> Arc<VersionStore> {
    Arc::new(VersionStore::new(EngineConfig::default(), Arc::new(SystemClock)))
}

fn body(writer: usize, edit: usize) -> String {
    let mut lines: Vec<String> = (0..30)
        .map(|i| format!("Shared paragraph {i} about river restoration."))
        .collect();
    lines.push(format!("Writer {writer} edit {edit}"));
    lines.join("\n")
}

/// Concurrent writers on one article get gapless, unique version numbers
#[test]
fn test_same_article_writers_are_serialised() {
    let store = shared_store();
    let article = ArticleId(1);
    let writers = 8;
    let edits = 15;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..edits)
                    .map(|e| store.create_version(article, &body(w, e), "writer").unwrap())
                    .map(|v| v.version_number)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        for number in handle.join().unwrap() {
            assert!(numbers.insert(number), "version number {number} assigned twice");
        }
    }

    let total = (writers * edits) as u32;
    assert_eq!(numbers, (1..=total).collect::<HashSet<_>>());
    assert_eq!(store.get_version_stats(article).total_versions, total as u64);

    // Every version reconstructs to some writer's text
    let expected: HashSet<String> = (0..writers)
        .flat_map(|w| (0..edits).map(move |e| body(w, e)))
        .collect();
    for n in 1..=total {
        let text = store.get_version_content(article, n).unwrap();
        assert!(expected.contains(&text));
    }
}

#[test]
fn test_independent_articles_in_parallel() {
    let store = shared_store();

    let handles: Vec<_> = (0..6u64)
        .map(|a| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for e in 0..10 {
                    store
                        .create_version(ArticleId(a), &body(a as usize, e), "w")
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for a in 0..6u64 {
        let stats = store.get_version_stats(ArticleId(a));
        assert_eq!(stats.total_versions, 10);
        assert_eq!(
            store.get_latest_version_content(ArticleId(a)).unwrap(),
            body(a as usize, 9)
        );
    }
    assert_eq!(store.table().version_count(), 60);
}

/// Readers racing writers and an optimization sweep only see complete states
#[test]
fn test_reads_during_writes_and_sweeps() {
    let config = EngineConfig {
        optimization_threshold: 3,
        ..EngineConfig::default()
    };
    let store = Arc::new(VersionStore::new(config, Arc::new(SystemClock)));
    let article = ArticleId(42);
    store.create_version(article, &body(0, 0), "w").unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for e in 1..40 {
                store.create_version(article, &body(0, e), "w").unwrap();
                if e % 10 == 0 {
                    store.run_optimization_sweep();
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let valid: HashSet<String> = (0..40).map(|e| body(0, e)).collect();
                for _ in 0..200 {
                    let text = store.get_latest_version_content(article).unwrap();
                    assert!(valid.contains(&text));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(
        store.get_latest_version_content(article).unwrap(),
        body(0, 39)
    );
}
