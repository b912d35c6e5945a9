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

//! Per-article version statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::days_before;
use crate::version::ArticleId;

/// Aggregate counters for one article's history.
///
/// This is a point-in-time snapshot; the live row is updated atomically by
/// the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionStats {
    pub article_id: ArticleId,
    pub total_versions: u64,
    pub base_versions_count: u64,
    pub diff_versions_count: u64,
    pub archived_versions_count: u64,
    /// Sum of uncompressed payload sizes
    pub total_storage_size: u64,
    /// Sum of compressed payload sizes
    pub compressed_storage_size: u64,
    /// Incremented on every content read
    pub access_frequency: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub last_optimized_at: Option<DateTime<Utc>>,
    pub optimization_needed: bool,
}

impl VersionStats {
    /// Empty stats for an article that has never been written
    pub fn empty(article_id: ArticleId) -> Self {
        Self {
            article_id,
            total_versions: 0,
            base_versions_count: 0,
            diff_versions_count: 0,
            archived_versions_count: 0,
            total_storage_size: 0,
            compressed_storage_size: 0,
            access_frequency: 0,
            last_accessed_at: None,
            last_optimized_at: None,
            optimization_needed: false,
        }
    }

    /// compressed / total, 0.0 when nothing is stored
    pub fn compression_ratio(&self) -> f64 {
        if self.total_storage_size == 0 {
            return 0.0;
        }
        self.compressed_storage_size as f64 / self.total_storage_size as f64
    }

    /// True when the article was never optimized or not within `days`
    pub fn needs_reoptimization(&self, now: DateTime<Utc>, days: i64) -> bool {
        match self.last_optimized_at {
            None => true,
            Some(at) => days_before(now, days).is_some_and(|cutoff| at < cutoff),
        }
    }

    /// True when the article has not been read within `days`
    pub fn is_cold(&self, now: DateTime<Utc>, days: i64) -> bool {
        match self.last_accessed_at {
            None => true,
            Some(at) => days_before(now, days).is_some_and(|cutoff| at <= cutoff),
        }
    }
}
