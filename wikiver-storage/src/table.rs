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

//! Version Table - In-Memory Realisation of the Version Schema
//!
//! Two logical tables: `versions`, keyed by [`VersionId`] with a unique
//! `(article, version_number)` index, and `version_stats`, one row per
//! article.
//!
//! ## Layout
//! ```text
//! VersionTable
//! ├── articles: DashMap<ArticleId, Arc<ArticleSlot>>
//! │   └── ArticleSlot
//! │       ├── write_lock   (serialises writers of this article)
//! │       ├── history      RwLock<ArticleHistory>  (BTreeMap by number)
//! │       └── stats        AtomicVersionStats
//! ├── locations: DashMap<VersionId, (ArticleId, u32)>
//! └── next_version_id: AtomicU64   (never reused)
//! ```
//!
//! Readers clone rows out under the history read lock, so they see either
//! the state before or after a write, never a partial one. Multi-row changes
//! (chain consolidation) happen under a single write guard.
//!
//! ## Snapshot format
//! ```text
//! "WKVR" | format u32 LE | crc32(body) u32 LE | body_len u64 LE | bincode body
//! ```

use crate::compression::CompressedPayload;
use crate::stats::AtomicVersionStats;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use wikiver_core::{ArticleId, Version, VersionId, VersionStats};

const MAGIC: &[u8; 4] = b"WKVR";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Table errors
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Version number {version_number} already exists for article {article_id}")]
    DuplicateVersionNumber {
        article_id: ArticleId,
        version_number: u32,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot checksum mismatch (expected {expected:08x}, got {actual:08x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Unsupported snapshot format: {0}")]
    UnsupportedFormat(String),
}

// ============================================================================
// Article history
// ============================================================================

/// All version rows of one article, ordered by version number
#[derive(Debug, Clone, Default)]
pub struct ArticleHistory {
    versions: BTreeMap<u32, Version>,
    by_id: HashMap<VersionId, u32>,
    by_hash: HashMap<String, Vec<u32>>,
}

impl ArticleHistory {
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, version_number: u32) -> Option<&Version> {
        self.versions.get(&version_number)
    }

    pub fn get_by_id(&self, version_id: VersionId) -> Option<&Version> {
        self.by_id
            .get(&version_id)
            .and_then(|number| self.versions.get(number))
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions.values().next_back()
    }

    /// Most recent full snapshot
    pub fn latest_full(&self) -> Option<&Version> {
        self.versions.values().rev().find(|v| v.is_base())
    }

    /// Nearest full snapshot strictly before `version_number`
    pub fn full_before(&self, version_number: u32) -> Option<&Version> {
        self.versions
            .range(..version_number)
            .rev()
            .map(|(_, v)| v)
            .find(|v| v.is_base())
    }

    /// Lowest-numbered version with the given content hash
    pub fn find_by_hash(&self, hash: &str) -> Option<&Version> {
        self.by_hash
            .get(hash)
            .and_then(|numbers| numbers.iter().min())
            .and_then(|number| self.versions.get(number))
    }

    /// Full snapshot with the given content hash, if any
    pub fn full_with_hash(&self, hash: &str) -> Option<&Version> {
        self.by_hash.get(hash).and_then(|numbers| {
            numbers
                .iter()
                .filter_map(|number| self.versions.get(number))
                .find(|v| v.is_base())
        })
    }

    /// Rows ordered by version number
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Version> {
        self.versions.values()
    }

    pub fn range<R: RangeBounds<u32>>(&self, range: R) -> impl DoubleEndedIterator<Item = &Version> {
        self.versions.range(range).map(|(_, v)| v)
    }

    /// Diff rows whose chain starts at `base`: everything after it up to the
    /// next full snapshot
    pub fn dependents_of(&self, base: &Version) -> Vec<&Version> {
        self.range(base.version_number + 1..)
            .take_while(|v| !v.is_base())
            .collect()
    }

    fn insert(&mut self, version: Version) -> Result<(), TableError> {
        let number = version.version_number;
        if self.versions.contains_key(&number) {
            return Err(TableError::DuplicateVersionNumber {
                article_id: version.article_id,
                version_number: number,
            });
        }
        self.by_id.insert(version.version_id, number);
        self.by_hash
            .entry(version.content_hash.clone())
            .or_default()
            .push(number);
        self.versions.insert(number, version);
        Ok(())
    }

    fn remove(&mut self, version_number: u32) -> Option<Version> {
        let version = self.versions.remove(&version_number)?;
        self.by_id.remove(&version.version_id);
        if let Some(numbers) = self.by_hash.get_mut(&version.content_hash) {
            numbers.retain(|n| *n != version_number);
            if numbers.is_empty() {
                self.by_hash.remove(&version.content_hash);
            }
        }
        Some(version)
    }
}

// ============================================================================
// Article slot
// ============================================================================

/// Per-article lock, history and stats row
#[derive(Debug)]
pub struct ArticleSlot {
    write_lock: Mutex<()>,
    history: RwLock<ArticleHistory>,
    stats: AtomicVersionStats,
}

impl ArticleSlot {
    fn new(article_id: ArticleId) -> Self {
        Self {
            write_lock: Mutex::new(()),
            history: RwLock::new(ArticleHistory::default()),
            stats: AtomicVersionStats::new(article_id),
        }
    }

    /// Serialise writers of this article. Held across read-latest-then-insert.
    pub fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ArticleHistory> {
        self.history.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, ArticleHistory> {
        self.history.write()
    }

    pub fn stats(&self) -> &AtomicVersionStats {
        &self.stats
    }
}

// ============================================================================
// Version table
// ============================================================================

#[derive(Serialize, Deserialize)]
struct TableSnapshot {
    next_version_id: u64,
    versions: Vec<Version>,
    stats: Vec<VersionStats>,
}

/// Store-wide version rows and stats rows
#[derive(Debug)]
pub struct VersionTable {
    articles: DashMap<ArticleId, Arc<ArticleSlot>>,
    locations: DashMap<VersionId, (ArticleId, u32)>,
    next_version_id: AtomicU64,
}

impl VersionTable {
    pub fn new() -> Self {
        Self {
            articles: DashMap::new(),
            locations: DashMap::new(),
            next_version_id: AtomicU64::new(1),
        }
    }

    pub fn slot(&self, article_id: ArticleId) -> Option<Arc<ArticleSlot>> {
        self.articles.get(&article_id).map(|s| Arc::clone(s.value()))
    }

    pub fn slot_or_create(&self, article_id: ArticleId) -> Arc<ArticleSlot> {
        let slot = self
            .articles
            .entry(article_id)
            .or_insert_with(|| Arc::new(ArticleSlot::new(article_id)));
        Arc::clone(slot.value())
    }

    /// Known article ids in ascending order
    pub fn article_ids(&self) -> Vec<ArticleId> {
        let mut ids: Vec<ArticleId> = self.articles.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn allocate_version_id(&self) -> VersionId {
        VersionId(self.next_version_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Resolve a version id to its `(article, number)` key
    pub fn locate(&self, version_id: VersionId) -> Option<(ArticleId, u32)> {
        self.locations.get(&version_id).map(|e| *e.value())
    }

    pub fn version_count(&self) -> usize {
        self.locations.len()
    }

    /// Insert a new row, enforcing the unique `(article, number)` index
    pub fn insert(&self, slot: &ArticleSlot, version: Version) -> Result<(), TableError> {
        let key = (version.article_id, version.version_number);
        let id = version.version_id;
        let storage = version.storage;
        let original = version.original_size.unwrap_or(0);
        let compressed = version.compressed_size.unwrap_or(0);

        slot.write().insert(version)?;
        self.locations.insert(id, key);
        slot.stats.record_insert(&storage, original, compressed);
        Ok(())
    }

    /// Atomically delete `removed` rows and insert `replacement`.
    ///
    /// `replacement` may reuse the number of one of the removed rows. Either
    /// every change is applied or none is.
    pub fn replace_rows(
        &self,
        slot: &ArticleSlot,
        removed: &[u32],
        replacement: Version,
    ) -> Result<Vec<Version>, TableError> {
        let mut history = slot.write();

        let number = replacement.version_number;
        if history.versions.contains_key(&number) && !removed.contains(&number) {
            return Err(TableError::DuplicateVersionNumber {
                article_id: replacement.article_id,
                version_number: number,
            });
        }

        let taken: Vec<Version> = removed
            .iter()
            .filter_map(|n| history.remove(*n))
            .collect();

        let key = (replacement.article_id, number);
        let id = replacement.version_id;
        let storage = replacement.storage;
        let original = replacement.original_size.unwrap_or(0);
        let compressed = replacement.compressed_size.unwrap_or(0);
        history.insert(replacement)?;
        drop(history);

        for old in &taken {
            self.locations.remove(&old.version_id);
            slot.stats.record_removal(
                &old.storage,
                old.is_archived,
                old.original_size.unwrap_or(0),
                old.compressed_size.unwrap_or(0),
            );
        }
        self.locations.insert(id, key);
        slot.stats.record_insert(&storage, original, compressed);

        Ok(taken)
    }

    /// Mark a row archived, swapping in a smaller payload when given.
    ///
    /// Returns the old and new compressed sizes, or `None` when the row is
    /// gone or already archived.
    pub fn mark_archived(
        &self,
        slot: &ArticleSlot,
        version_number: u32,
        payload: Option<CompressedPayload>,
    ) -> Option<(u64, u64)> {
        let mut history = slot.write();
        let version = history.versions.get_mut(&version_number)?;
        if version.is_archived {
            return None;
        }

        let old_size = version.compressed_size.unwrap_or(version.content.len() as u64);
        let mut new_size = old_size;
        if let Some(payload) = payload {
            new_size = payload.compressed_size;
            version.content = payload.data;
            version.compression = payload.algorithm;
            version.compressed_size = Some(payload.compressed_size);
            version.is_compressed = payload.algorithm != wikiver_core::CompressionAlgorithm::None;
        }
        version.is_archived = true;
        drop(history);

        slot.stats.record_archived(old_size, new_size);
        Some((old_size, new_size))
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save all rows to a checksummed snapshot file
    pub fn save_to_file(&self, path: &Path) -> Result<(), TableError> {
        let mut versions = Vec::with_capacity(self.version_count());
        let mut stats = Vec::with_capacity(self.articles.len());
        for article_id in self.article_ids() {
            if let Some(slot) = self.slot(article_id) {
                let history = slot.read();
                versions.extend(history.iter().cloned());
                stats.push(slot.stats.snapshot());
            }
        }

        let snapshot = TableSnapshot {
            next_version_id: self.next_version_id.load(Ordering::Relaxed),
            versions,
            stats,
        };
        let body =
            bincode::serialize(&snapshot).map_err(|e| TableError::Serialization(e.to_string()))?;

        let mut data = Vec::with_capacity(HEADER_LEN + body.len());
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        data.extend_from_slice(&(body.len() as u64).to_le_bytes());
        data.extend_from_slice(&body);

        let tmp = temp_path(path);
        if let Err(e) = write_synced(&tmp, &data).and_then(|()| std::fs::rename(&tmp, path)) {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                tracing::debug!(path = %tmp.display(), error = %cleanup, "Temp snapshot not removed");
            }
            return Err(e.into());
        }

        tracing::debug!(
            path = %path.display(),
            versions = snapshot.versions.len(),
            bytes = data.len(),
            "Saved version table snapshot"
        );
        Ok(())
    }

    /// Load a table from a snapshot file
    pub fn load_from_file(path: &Path) -> Result<Self, TableError> {
        let data = std::fs::read(path)?;
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return Err(TableError::UnsupportedFormat(
                "missing snapshot header".to_string(),
            ));
        }

        let format = u32::from_le_bytes(read_array(&data[4..8]));
        if format != FORMAT_VERSION {
            return Err(TableError::UnsupportedFormat(format!(
                "format version {format}, expected {FORMAT_VERSION}"
            )));
        }
        let expected = u32::from_le_bytes(read_array(&data[8..12]));
        let body_len = u64::from_le_bytes(read_array(&data[12..20]));
        let body = &data[HEADER_LEN..];
        if body.len() as u64 != body_len {
            return Err(TableError::UnsupportedFormat(format!(
                "body length {} does not match header {body_len}",
                body.len()
            )));
        }

        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(TableError::ChecksumMismatch { expected, actual });
        }

        let snapshot: TableSnapshot =
            bincode::deserialize(body).map_err(|e| TableError::Serialization(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    fn from_snapshot(snapshot: TableSnapshot) -> Result<Self, TableError> {
        let table = Self::new();
        let mut max_id = 0u64;

        for stats in &snapshot.stats {
            table.articles.insert(
                stats.article_id,
                Arc::new(ArticleSlot {
                    write_lock: Mutex::new(()),
                    history: RwLock::new(ArticleHistory::default()),
                    stats: AtomicVersionStats::from_snapshot(stats),
                }),
            );
        }

        for version in snapshot.versions {
            max_id = max_id.max(version.version_id.0);
            let slot = table.slot_or_create(version.article_id);
            table
                .locations
                .insert(version.version_id, (version.article_id, version.version_number));
            slot.write().insert(version)?;
        }

        table
            .next_version_id
            .store(snapshot.next_version_id.max(max_id + 1), Ordering::Relaxed);

        tracing::debug!(
            articles = table.articles.len(),
            versions = table.version_count(),
            "Loaded version table snapshot"
        );
        Ok(table)
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
