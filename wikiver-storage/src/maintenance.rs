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

//! Maintenance Sweeps
//!
//! Idempotent passes invoked by an external scheduler. The engine owns no
//! timers; every cutoff is computed from the injected clock.
//!
//! - **Optimization**: a full snapshot with more than
//!   `optimization_threshold` dependent diffs has its chain consolidated.
//!   The chain's last diff is rewritten as a full snapshot under the same
//!   version number and the other diffs of the chain are deleted, all under
//!   one history write guard.
//! - **Archival**: rows older than `archive_after_days` of articles not read
//!   within `cold_after_days` are recompressed at archival strength (kept
//!   only if smaller) and marked archived.
//!
//! One article's failure is logged and counted; the sweep moves on.

use crate::error::Result;
use crate::table::ArticleSlot;
use crate::version_store::VersionStore;
use serde::{Deserialize, Serialize};
use wikiver_core::{days_before, ArticleId, CompressionAlgorithm, StorageKind, Version};

/// Outcome of one optimization sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub articles_visited: usize,
    pub chains_consolidated: usize,
    pub versions_removed: usize,
    /// Chains left alone because their text already exists as a snapshot
    pub chains_skipped: usize,
    pub failures: usize,
}

/// Outcome of one archival sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalReport {
    pub articles_visited: usize,
    pub versions_archived: usize,
    /// Compressed bytes reclaimed by recompression
    pub bytes_saved: u64,
    pub failures: usize,
}

#[derive(Default)]
struct ArticleOptimization {
    consolidated: usize,
    removed: usize,
    skipped: usize,
}

impl VersionStore {
    /// Consolidate long diff chains of every article that is flagged or due
    pub fn run_optimization_sweep(&self) -> OptimizationReport {
        let now = self.clock.now();
        let mut report = OptimizationReport::default();

        for article_id in self.table.article_ids() {
            let Some(slot) = self.table.slot(article_id) else {
                continue;
            };
            let stats = slot.stats();
            let current = stats.snapshot();
            let due = current.optimization_needed
                || current.needs_reoptimization(now, self.config.reoptimize_after_days);
            if !due {
                continue;
            }

            report.articles_visited += 1;
            match self.optimize_article(&slot, article_id) {
                Ok(outcome) => {
                    report.chains_consolidated += outcome.consolidated;
                    report.versions_removed += outcome.removed;
                    report.chains_skipped += outcome.skipped;
                    stats.mark_optimized(now);
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(%article_id, error = %e, "Optimization failed for article");
                }
            }
        }

        tracing::info!(
            articles = report.articles_visited,
            consolidated = report.chains_consolidated,
            removed = report.versions_removed,
            skipped = report.chains_skipped,
            failures = report.failures,
            "Optimization sweep finished"
        );
        report
    }

    fn optimize_article(&self, slot: &ArticleSlot, article_id: ArticleId) -> Result<ArticleOptimization> {
        let _writer = slot.lock_writes();
        let mut outcome = ArticleOptimization::default();

        let bases: Vec<Version> = slot.read().iter().filter(|v| v.is_base()).cloned().collect();
        for base in bases {
            let (chain, last, text) = {
                let history = slot.read();
                let chain = history.dependents_of(&base);
                if chain.len() <= self.config.optimization_threshold {
                    continue;
                }
                let Some(last) = chain.last() else {
                    continue;
                };
                if history.full_with_hash(&last.content_hash).is_some() {
                    tracing::warn!(
                        %article_id,
                        version_number = last.version_number,
                        "Chain text already stored as a snapshot, skipping consolidation"
                    );
                    outcome.skipped += 1;
                    continue;
                }
                let text = self.content_of(&history, last)?;
                let numbers: Vec<u32> = chain.iter().map(|v| v.version_number).collect();
                (numbers, (*last).clone(), text)
            };

            let payload = self.compression.compress_best(&text)?;
            let snapshot = Version {
                version_id: self.table.allocate_version_id(),
                storage: StorageKind::FullContent,
                is_compressed: payload.algorithm != CompressionAlgorithm::None,
                compression: payload.algorithm,
                original_size: Some(payload.original_size),
                compressed_size: Some(payload.compressed_size),
                content: payload.data,
                is_archived: false,
                ..last
            };
            let snapshot_number = snapshot.version_number;

            let removed = self.table.replace_rows(slot, &chain, snapshot)?;
            for row in &removed {
                if row.version_number != snapshot_number {
                    self.invalidate_cached(article_id, row.version_number);
                }
            }

            tracing::debug!(
                %article_id,
                base = base.version_number,
                snapshot = snapshot_number,
                removed = removed.len().saturating_sub(1),
                "Consolidated diff chain"
            );
            outcome.consolidated += 1;
            outcome.removed += removed.len().saturating_sub(1);
        }

        Ok(outcome)
    }

    /// Recompress and mark old versions of cold articles
    pub fn run_archival_sweep(&self) -> ArchivalReport {
        let now = self.clock.now();
        let mut report = ArchivalReport::default();
        let Some(age_cutoff) = days_before(now, self.config.archive_after_days) else {
            tracing::debug!(
                archive_after_days = self.config.archive_after_days,
                "Archive age cutoff predates the calendar, nothing to archive"
            );
            return report;
        };

        for article_id in self.table.article_ids() {
            let Some(slot) = self.table.slot(article_id) else {
                continue;
            };
            if !slot.stats().snapshot().is_cold(now, self.config.cold_after_days) {
                continue;
            }

            let _writer = slot.lock_writes();
            let candidates: Vec<(u32, Vec<u8>, CompressionAlgorithm)> = slot
                .read()
                .iter()
                .filter(|v| !v.is_archived && v.created_at < age_cutoff)
                .map(|v| (v.version_number, v.content.clone(), v.compression))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            report.articles_visited += 1;

            for (version_number, data, algorithm) in candidates {
                match self.compression.recompress_for_archive(&data, algorithm) {
                    Ok(payload) => {
                        if let Some(payload) = &payload {
                            tracing::debug!(
                                %article_id,
                                version_number,
                                algorithm = %payload.algorithm,
                                compressed_size = payload.compressed_size,
                                "Recompressed for archive"
                            );
                        }
                        if let Some((old, new)) = self.table.mark_archived(&slot, version_number, payload) {
                            report.versions_archived += 1;
                            report.bytes_saved += old.saturating_sub(new);
                        }
                    }
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!(
                            %article_id,
                            version_number,
                            error = %e,
                            "Archival recompression failed"
                        );
                    }
                }
            }
        }

        tracing::info!(
            articles = report.articles_visited,
            archived = report.versions_archived,
            bytes_saved = report.bytes_saved,
            failures = report.failures,
            "Archival sweep finished"
        );
        report
    }
}
