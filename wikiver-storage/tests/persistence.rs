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

//! Snapshot persistence and archival over simulated time

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use wikiver_core::{ArticleId, EngineConfig, ManualClock, SystemClock};
use wikiver_storage::{TableError, VersionError, VersionStore};

fn chapter(n: usize) -> String {
    (0..n)
        .map(|i| format!("Chapter line {i}: mangroves shelter juvenile fish."))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_persist_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wikiver.db");
    let article = ArticleId(11);
    let base = chapter(50);

    let store = VersionStore::new(EngineConfig::default(), Arc::new(SystemClock));
    let v1 = store.create_version(article, &base, "alice").unwrap();
    let v2 = store
        .create_version(article, &format!("{base}\nappendix"), "bob")
        .unwrap();
    store.get_latest_version_content(article).unwrap();
    store.persist(&path).unwrap();
    let stats_before = store.get_version_stats(article);

    let reopened =
        VersionStore::open(&path, EngineConfig::default(), Arc::new(SystemClock)).unwrap();
    assert_eq!(reopened.get_version(article, 1).unwrap(), v1);
    assert_eq!(reopened.get_version(article, 2).unwrap(), v2);
    assert_eq!(reopened.get_version_stats(article), stats_before);
    assert_eq!(
        reopened.get_version_content(article, 2).unwrap(),
        format!("{base}\nappendix")
    );

    // New ids never collide with persisted ones
    let v3 = reopened
        .create_version(article, &format!("{base}\nappendix\nmore"), "carol")
        .unwrap();
    assert_eq!(v3.version_number, 3);
    assert!(v3.version_id > v2.version_id);
}

#[test]
fn test_open_missing_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let store = VersionStore::open(
        dir.path().join("absent.db"),
        EngineConfig::default(),
        Arc::new(SystemClock),
    )
    .unwrap();
    assert_eq!(store.table().version_count(), 0);
}

#[test]
fn test_open_corrupt_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wikiver.db");
    std::fs::write(&path, b"garbage that is long enough to have a header").unwrap();

    let err = VersionStore::open(&path, EngineConfig::default(), Arc::new(SystemClock)).unwrap_err();
    assert!(matches!(
        err,
        VersionError::Table(TableError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_archival_sweep_over_time() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = VersionStore::new(EngineConfig::default(), clock.clone());

    let cold = ArticleId(1);
    let hot = ArticleId(2);
    let text = chapter(120);
    store.create_version(cold, &text, "a").unwrap();
    store
        .create_version(cold, &format!("{text}\nlate edit"), "a")
        .unwrap();
    store.create_version(hot, &text, "a").unwrap();

    clock.advance(Duration::days(100));
    store.get_latest_version_content(hot).unwrap();

    let report = store.run_archival_sweep();
    assert_eq!(report.articles_visited, 1);
    assert_eq!(report.versions_archived, 2);
    assert_eq!(report.failures, 0);

    assert!(store.get_version(cold, 1).unwrap().is_archived);
    assert!(store.get_version(cold, 2).unwrap().is_archived);
    assert!(!store.get_version(hot, 1).unwrap().is_archived);
    assert_eq!(store.get_version_stats(cold).archived_versions_count, 2);

    // Content is unchanged by archival, including diffs resolved through archived rows
    let fresh = VersionStore::with_table(
        {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("snap.db");
            store.persist(&path).unwrap();
            wikiver_storage::VersionTable::load_from_file(&path).unwrap()
        },
        EngineConfig::default().without_cache(),
        clock.clone(),
    );
    assert_eq!(fresh.get_version_content(cold, 1).unwrap(), text);
    assert_eq!(
        fresh.get_version_content(cold, 2).unwrap(),
        format!("{text}\nlate edit")
    );
}
