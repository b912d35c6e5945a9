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

//! Atomic Version Statistics
//!
//! Live per-article stats row. Counters are plain atomics so the write path,
//! reads and both sweeps can update one article's row without a lock and
//! without losing updates; queries take a [`VersionStats`] snapshot.
//!
//! Timestamps are stored as microseconds since the epoch, with `i64::MIN`
//! meaning "never".

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use wikiver_core::{ArticleId, StorageKind, VersionStats};

const NEVER: i64 = i64::MIN;

/// Lock-free stats row for one article
#[derive(Debug)]
pub struct AtomicVersionStats {
    article_id: ArticleId,

    // === Counters ===
    total_versions: AtomicU64,
    base_versions_count: AtomicU64,
    diff_versions_count: AtomicU64,
    archived_versions_count: AtomicU64,
    total_storage_size: AtomicU64,
    compressed_storage_size: AtomicU64,
    access_frequency: AtomicU64,

    // === Timestamps (micros) ===
    last_accessed_at: AtomicI64,
    last_optimized_at: AtomicI64,

    optimization_needed: AtomicBool,
}

impl AtomicVersionStats {
    pub fn new(article_id: ArticleId) -> Self {
        Self::from_snapshot(&VersionStats::empty(article_id))
    }

    /// Rebuild a live row from a persisted snapshot
    pub fn from_snapshot(stats: &VersionStats) -> Self {
        Self {
            article_id: stats.article_id,
            total_versions: AtomicU64::new(stats.total_versions),
            base_versions_count: AtomicU64::new(stats.base_versions_count),
            diff_versions_count: AtomicU64::new(stats.diff_versions_count),
            archived_versions_count: AtomicU64::new(stats.archived_versions_count),
            total_storage_size: AtomicU64::new(stats.total_storage_size),
            compressed_storage_size: AtomicU64::new(stats.compressed_storage_size),
            access_frequency: AtomicU64::new(stats.access_frequency),
            last_accessed_at: AtomicI64::new(to_micros(stats.last_accessed_at)),
            last_optimized_at: AtomicI64::new(to_micros(stats.last_optimized_at)),
            optimization_needed: AtomicBool::new(stats.optimization_needed),
        }
    }

    pub fn article_id(&self) -> ArticleId {
        self.article_id
    }

    /// Account for a newly inserted version row
    pub fn record_insert(&self, storage: &StorageKind, original: u64, compressed: u64) {
        self.total_versions.fetch_add(1, Ordering::Relaxed);
        if storage.is_full() {
            self.base_versions_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.diff_versions_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_storage_size.fetch_add(original, Ordering::Relaxed);
        self.compressed_storage_size
            .fetch_add(compressed, Ordering::Relaxed);
    }

    /// Account for a deleted version row
    pub fn record_removal(
        &self,
        storage: &StorageKind,
        archived: bool,
        original: u64,
        compressed: u64,
    ) {
        saturating_sub(&self.total_versions, 1);
        if storage.is_full() {
            saturating_sub(&self.base_versions_count, 1);
        } else {
            saturating_sub(&self.diff_versions_count, 1);
        }
        if archived {
            saturating_sub(&self.archived_versions_count, 1);
        }
        saturating_sub(&self.total_storage_size, original);
        saturating_sub(&self.compressed_storage_size, compressed);
    }

    /// Account for a version marked archived, possibly with a smaller payload
    pub fn record_archived(&self, old_compressed: u64, new_compressed: u64) {
        self.archived_versions_count.fetch_add(1, Ordering::Relaxed);
        if new_compressed < old_compressed {
            saturating_sub(&self.compressed_storage_size, old_compressed - new_compressed);
        } else {
            self.compressed_storage_size
                .fetch_add(new_compressed - old_compressed, Ordering::Relaxed);
        }
    }

    /// Count one content read
    pub fn record_access(&self, now: DateTime<Utc>) {
        self.access_frequency.fetch_add(1, Ordering::Relaxed);
        self.last_accessed_at
            .fetch_max(now.timestamp_micros(), Ordering::Relaxed);
    }

    pub fn mark_optimized(&self, now: DateTime<Utc>) {
        self.last_optimized_at
            .fetch_max(now.timestamp_micros(), Ordering::Relaxed);
        self.optimization_needed.store(false, Ordering::Relaxed);
    }

    pub fn set_optimization_needed(&self, needed: bool) {
        self.optimization_needed.store(needed, Ordering::Relaxed);
    }

    pub fn optimization_needed(&self) -> bool {
        self.optimization_needed.load(Ordering::Relaxed)
    }

    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        from_micros(self.last_accessed_at.load(Ordering::Relaxed))
    }

    pub fn last_optimized_at(&self) -> Option<DateTime<Utc>> {
        from_micros(self.last_optimized_at.load(Ordering::Relaxed))
    }

    /// Point-in-time copy for queries and persistence
    pub fn snapshot(&self) -> VersionStats {
        VersionStats {
            article_id: self.article_id,
            total_versions: self.total_versions.load(Ordering::Relaxed),
            base_versions_count: self.base_versions_count.load(Ordering::Relaxed),
            diff_versions_count: self.diff_versions_count.load(Ordering::Relaxed),
            archived_versions_count: self.archived_versions_count.load(Ordering::Relaxed),
            total_storage_size: self.total_storage_size.load(Ordering::Relaxed),
            compressed_storage_size: self.compressed_storage_size.load(Ordering::Relaxed),
            access_frequency: self.access_frequency.load(Ordering::Relaxed),
            last_accessed_at: self.last_accessed_at(),
            last_optimized_at: self.last_optimized_at(),
            optimization_needed: self.optimization_needed(),
        }
    }
}

/// Subtract without wrapping below zero
#[inline]
fn saturating_sub(counter: &AtomicU64, value: u64) {
    let mut current = counter.load(Ordering::Relaxed);
    loop {
        match counter.compare_exchange_weak(
            current,
            current.saturating_sub(value),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(c) => current = c,
        }
    }
}

fn to_micros(at: Option<DateTime<Utc>>) -> i64 {
    at.map_or(NEVER, |t| t.timestamp_micros())
}

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    if micros == NEVER {
        return None;
    }
    Utc.timestamp_micros(micros).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;
    use wikiver_core::VersionId;

    #[test]
    fn test_insert_and_remove_counters() {
        let stats = AtomicVersionStats::new(ArticleId(1));
        let diff = StorageKind::DiffFromBase {
            base_version_id: VersionId(1),
        };

        stats.record_insert(&StorageKind::FullContent, 100, 40);
        stats.record_insert(&diff, 30, 20);
        let snap = stats.snapshot();
        assert_eq!(snap.total_versions, 2);
        assert_eq!(snap.base_versions_count, 1);
        assert_eq!(snap.diff_versions_count, 1);
        assert_eq!(snap.total_storage_size, 130);
        assert_eq!(snap.compressed_storage_size, 60);

        stats.record_removal(&diff, false, 30, 20);
        let snap = stats.snapshot();
        assert_eq!(snap.total_versions, 1);
        assert_eq!(snap.diff_versions_count, 0);
        assert_eq!(snap.compressed_storage_size, 40);

        // Never wraps
        stats.record_removal(&diff, true, 1000, 1000);
        let snap = stats.snapshot();
        assert_eq!(snap.diff_versions_count, 0);
        assert_eq!(snap.archived_versions_count, 0);
        assert_eq!(snap.total_storage_size, 0);
    }

    #[test]
    fn test_archived_adjusts_compressed_size() {
        let stats = AtomicVersionStats::new(ArticleId(1));
        stats.record_insert(&StorageKind::FullContent, 100, 60);
        stats.record_archived(60, 45);

        let snap = stats.snapshot();
        assert_eq!(snap.archived_versions_count, 1);
        assert_eq!(snap.compressed_storage_size, 45);
    }

    #[test]
    fn test_timestamps_roundtrip_through_snapshot() {
        let stats = AtomicVersionStats::new(ArticleId(2));
        assert_eq!(stats.last_accessed_at(), None);

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        stats.record_access(now);
        stats.record_access(now - Duration::days(1));
        stats.mark_optimized(now);

        let snap = stats.snapshot();
        assert_eq!(snap.access_frequency, 2);
        assert_eq!(snap.last_accessed_at, Some(now));
        assert_eq!(snap.last_optimized_at, Some(now));
        assert!(!snap.optimization_needed);

        let restored = AtomicVersionStats::from_snapshot(&snap);
        assert_eq!(restored.snapshot(), snap);
    }

    #[test]
    fn test_concurrent_access_counting() {
        let stats = Arc::new(AtomicVersionStats::new(ArticleId(3)));
        let now = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_access(now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().access_frequency, 8000);
    }
}
