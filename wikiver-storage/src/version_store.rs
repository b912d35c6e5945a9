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

//! Version Store - Article Version History Engine
//!
//! Records every content change of an article as an immutable version row,
//! storing either a full compressed snapshot or a compressed line diff, and
//! reconstructs any historical version on demand.
//!
//! ## Write path
//! ```text
//! create_version(article, text)
//!   ├── hash matches an existing row?  ──► return it (dedup)
//!   ├── no full snapshot yet?          ──► FullContent
//!   ├── diff(latest, text).ratio > t?  ──► FullContent
//!   └── otherwise                      ──► DiffFromBase / DiffFromPrev
//! ```
//!
//! ## Read path
//! A diff row is resolved from its base snapshot by applying every row in
//! `(base, target]` in version-number order. The result is checked against
//! the row's content hash before it is returned.
//!
//! Writers of one article are serialised by the article's write lock; reads
//! never take it.

use crate::compression::{content_hash, CompressionEngine};
use crate::diff::{DiffConfig, DiffEngine};
use crate::error::{Result, VersionError};
use crate::table::{ArticleHistory, ArticleSlot, VersionTable};
use moka::sync::Cache;
use std::path::Path;
use std::sync::Arc;
use wikiver_core::{
    ArticleId, Clock, DiffAnchor, EngineConfig, StorageKind, SystemClock, Version, VersionPage,
    VersionStats,
};

/// Article version engine
pub struct VersionStore {
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) table: VersionTable,
    pub(crate) diff_engine: DiffEngine,
    pub(crate) compression: CompressionEngine,
    /// Reconstructed text keyed by `(article, version_number)`
    pub(crate) cache: Option<Cache<(ArticleId, u32), Arc<str>>>,
}

impl VersionStore {
    /// Create an empty store
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_table(VersionTable::new(), config, clock)
    }

    /// Empty store with default thresholds and the wall clock
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Arc::new(SystemClock))
    }

    /// Wrap an existing table
    pub fn with_table(table: VersionTable, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let diff_engine = DiffEngine::with_config(DiffConfig {
            lookahead_window: config.lookahead_window,
        });
        let cache = (config.content_cache_capacity > 0)
            .then(|| Cache::new(config.content_cache_capacity));

        Self {
            config,
            clock,
            table,
            diff_engine,
            compression: CompressionEngine::new(),
            cache,
        }
    }

    /// Load a store from a snapshot file, or start empty if it does not exist
    pub fn open(path: impl AsRef<Path>, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        let table = if path.exists() {
            VersionTable::load_from_file(path)?
        } else {
            tracing::info!(path = %path.display(), "No snapshot found, starting empty");
            VersionTable::new()
        };
        Ok(Self::with_table(table, config, clock))
    }

    /// Write a durable snapshot of every row
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        self.table.save_to_file(path.as_ref())?;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &VersionTable {
        &self.table
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Record `content` as the article's newest version.
    ///
    /// If any existing version of the article has identical content, that
    /// version is returned and nothing is written.
    pub fn create_version(&self, article_id: ArticleId, content: &str, author: &str) -> Result<Version> {
        let slot = self.table.slot_or_create(article_id);
        let _writer = slot.lock_writes();

        let hash = content_hash(content);
        if let Some(existing) = slot.read().find_by_hash(&hash).cloned() {
            tracing::debug!(
                %article_id,
                version_number = existing.version_number,
                "Content unchanged, returning existing version"
            );
            return Ok(existing);
        }

        self.append_version(&slot, article_id, content, hash, author, None, false)
    }

    /// Create a new head version carrying the text of `version_number`.
    ///
    /// History is never rewritten; restoring to the current content fails
    /// with [`VersionError::NothingToRestore`].
    pub fn restore_to_version(&self, article_id: ArticleId, version_number: u32, author: &str) -> Result<Version> {
        let slot = self.table.slot(article_id).ok_or(VersionError::VersionNotFound {
            article_id,
            version_number,
        })?;
        let _writer = slot.lock_writes();

        let (restored, latest) = {
            let history = slot.read();
            let target = history.get(version_number).ok_or(VersionError::VersionNotFound {
                article_id,
                version_number,
            })?;
            let latest = history.latest().ok_or(VersionError::EmptyHistory(article_id))?;
            (
                self.content_of(&history, target)?,
                self.content_of(&history, latest)?,
            )
        };
        slot.stats().record_access(self.clock.now());

        if restored == latest {
            return Err(VersionError::NothingToRestore {
                article_id,
                version_number,
            });
        }

        let hash = content_hash(&restored);
        let version = self.append_version(
            &slot,
            article_id,
            &restored,
            hash,
            author,
            Some(format!("restored to version {version_number}")),
            true,
        )?;

        tracing::info!(
            %article_id,
            from = version_number,
            to = version.version_number,
            "Restored article version"
        );
        Ok(version)
    }

    /// Decide the storage form, compress and insert. Caller holds the write lock.
    #[allow(clippy::too_many_arguments)]
    fn append_version(
        &self,
        slot: &ArticleSlot,
        article_id: ArticleId,
        content: &str,
        hash: String,
        author: &str,
        change_summary: Option<String>,
        avoid_duplicate_snapshot: bool,
    ) -> Result<Version> {
        let (version_number, storage, encoded_diff) = {
            let history = slot.read();
            let version_number = history.latest().map_or(1, |v| v.version_number + 1);

            match (history.latest(), history.latest_full()) {
                (Some(latest), Some(base)) => {
                    let latest_text = self.content_of(&history, latest)?;
                    let diff = self.diff_engine.diff(&latest_text, content);
                    let snapshot_exists =
                        avoid_duplicate_snapshot && history.full_with_hash(&hash).is_some();

                    if diff.is_large_change(self.config.diff_threshold) && !snapshot_exists {
                        tracing::debug!(
                            %article_id,
                            version_number,
                            change_ratio = diff.change_ratio,
                            "Large change, storing full snapshot"
                        );
                        (version_number, StorageKind::FullContent, None)
                    } else {
                        let storage = match self.config.diff_anchor {
                            DiffAnchor::Base => StorageKind::DiffFromBase {
                                base_version_id: base.version_id,
                            },
                            DiffAnchor::Previous => StorageKind::DiffFromPrev,
                        };
                        tracing::debug!(
                            %article_id,
                            version_number,
                            change_ratio = diff.change_ratio,
                            storage = storage.name(),
                            "Storing diff"
                        );
                        (version_number, storage, Some(self.diff_engine.encode(&diff.lines)))
                    }
                }
                _ => (version_number, StorageKind::FullContent, None),
            }
        };

        let payload = self
            .compression
            .compress_best(encoded_diff.as_deref().unwrap_or(content))?;

        let version = Version {
            version_id: self.table.allocate_version_id(),
            article_id,
            version_number,
            author: author.to_string(),
            created_at: self.clock.now(),
            storage,
            is_compressed: payload.algorithm != wikiver_core::CompressionAlgorithm::None,
            compression: payload.algorithm,
            original_size: Some(payload.original_size),
            compressed_size: Some(payload.compressed_size),
            content: payload.data,
            content_hash: hash,
            is_archived: false,
            change_summary,
        };

        self.table.insert(slot, version.clone())?;
        self.refresh_optimization_flag(slot);
        if let Some(cache) = &self.cache {
            cache.insert((article_id, version_number), Arc::from(content));
        }

        tracing::debug!(
            %article_id,
            version_number,
            version_id = %version.version_id,
            algorithm = %version.compression,
            compressed_size = payload.compressed_size,
            "Created version"
        );
        Ok(version)
    }

    fn refresh_optimization_flag(&self, slot: &ArticleSlot) {
        let history = slot.read();
        let chain_len = history
            .latest_full()
            .map_or(0, |base| history.dependents_of(base).len());
        if chain_len > self.config.optimization_threshold {
            slot.stats().set_optimization_needed(true);
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Text of one historical version
    pub fn get_version_content(&self, article_id: ArticleId, version_number: u32) -> Result<String> {
        let not_found = VersionError::VersionNotFound {
            article_id,
            version_number,
        };
        let slot = self.table.slot(article_id).ok_or(not_found)?;

        let text = {
            let history = slot.read();
            let target = history.get(version_number).ok_or(VersionError::VersionNotFound {
                article_id,
                version_number,
            })?;
            self.content_of(&history, target)?
        };

        slot.stats().record_access(self.clock.now());
        Ok(text)
    }

    /// Text of the newest version
    pub fn get_latest_version_content(&self, article_id: ArticleId) -> Result<String> {
        let slot = self
            .table
            .slot(article_id)
            .ok_or(VersionError::EmptyHistory(article_id))?;

        let text = {
            let history = slot.read();
            let latest = history.latest().ok_or(VersionError::EmptyHistory(article_id))?;
            self.content_of(&history, latest)?
        };

        slot.stats().record_access(self.clock.now());
        Ok(text)
    }

    /// Row metadata without reconstructing content
    pub fn get_version(&self, article_id: ArticleId, version_number: u32) -> Result<Version> {
        self.table
            .slot(article_id)
            .and_then(|slot| {
                let history = slot.read();
                history.get(version_number).cloned()
            })
            .ok_or(VersionError::VersionNotFound {
                article_id,
                version_number,
            })
    }

    /// One page of history, newest first. `page` is zero-based.
    pub fn get_version_history(&self, article_id: ArticleId, page: usize, size: usize) -> VersionPage {
        let size = size.max(1);
        let (total, versions) = match self.table.slot(article_id) {
            Some(slot) => {
                let history = slot.read();
                let versions = history
                    .iter()
                    .rev()
                    .skip(page.saturating_mul(size))
                    .take(size)
                    .map(Version::summary)
                    .collect();
                (history.len() as u64, versions)
            }
            None => (0, Vec::new()),
        };

        VersionPage {
            versions,
            total_elements: total,
            total_pages: total.div_ceil(size as u64),
            page,
            size,
        }
    }

    /// Stats snapshot; an unknown article has empty stats
    pub fn get_version_stats(&self, article_id: ArticleId) -> VersionStats {
        self.table
            .slot(article_id)
            .map(|slot| slot.stats().snapshot())
            .unwrap_or_else(|| VersionStats::empty(article_id))
    }

    /// Reconstruct the text of `target` from rows in `history`
    pub(crate) fn content_of(&self, history: &ArticleHistory, target: &Version) -> Result<String> {
        let key = (target.article_id, target.version_number);
        if let Some(text) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok(text.to_string());
        }

        let text = self.reconstruct(history, target)?;

        let actual = content_hash(&text);
        if actual != target.content_hash {
            tracing::warn!(
                article_id = %target.article_id,
                version_number = target.version_number,
                "Reconstructed content does not match stored hash"
            );
            return Err(VersionError::IntegrityMismatch {
                version_id: target.version_id,
                expected: target.content_hash.clone(),
                actual,
            });
        }

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::from(text.as_str()));
        }
        Ok(text)
    }

    fn reconstruct(&self, history: &ArticleHistory, target: &Version) -> Result<String> {
        if target.is_base() {
            return self.payload_text(target);
        }

        let base = match target.storage {
            StorageKind::DiffFromBase { base_version_id } => history
                .get_by_id(base_version_id)
                .filter(|b| b.is_base() && b.version_number < target.version_number),
            _ => history.full_before(target.version_number),
        };
        let base = base.ok_or_else(|| {
            tracing::error!(
                article_id = %target.article_id,
                version_number = target.version_number,
                storage = target.storage.name(),
                "Base version missing for diff"
            );
            VersionError::BaseVersionMissing {
                version_id: target.version_id,
                base_version_id: target.storage.base_version_id(),
            }
        })?;

        let mut text = self.payload_text(base)?;
        for row in history.range(base.version_number + 1..=target.version_number) {
            if row.is_base() {
                text = self.payload_text(row)?;
                continue;
            }
            let script = self.payload_text(row)?;
            let lines = if self.config.strict_diff_decode {
                self.diff_engine
                    .decode_strict(&script)
                    .map_err(|source| VersionError::CorruptDiff {
                        version_id: row.version_id,
                        source,
                    })?
            } else {
                self.diff_engine.decode(&script)
            };
            text = self.diff_engine.apply_diff(&text, &lines);
        }
        Ok(text)
    }

    /// Decompressed payload of one row
    pub(crate) fn payload_text(&self, version: &Version) -> Result<String> {
        self.compression
            .decompress_with(&version.content, version.compression)
            .map_err(|e| VersionError::decompression(version.version_id, e))
    }

    pub(crate) fn invalidate_cached(&self, article_id: ArticleId, version_number: u32) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&(article_id, version_number));
        }
    }
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("config", &self.config)
            .field("versions", &self.table.version_count())
            .finish()
    }
}
