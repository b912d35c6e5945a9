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

//! Version Rows
//!
//! One immutable historical record of an article's content, plus the
//! identifiers and summaries built from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Article identifier, owned by the article record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleId(pub u64);

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ArticleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Version row identifier, unique and monotonic across the whole store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How a version's payload relates to the article text.
///
/// The base reference only exists on `DiffFromBase`, so a full snapshot
/// pointing at a base cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Payload is the complete article text
    FullContent,
    /// Payload is a diff script; the chain starts at `base_version_id`
    DiffFromBase { base_version_id: VersionId },
    /// Payload is a diff script; the chain starts at the nearest earlier full snapshot
    DiffFromPrev,
}

impl StorageKind {
    pub fn is_full(&self) -> bool {
        matches!(self, StorageKind::FullContent)
    }

    pub fn is_diff(&self) -> bool {
        !self.is_full()
    }

    pub fn base_version_id(&self) -> Option<VersionId> {
        match self {
            StorageKind::DiffFromBase { base_version_id } => Some(*base_version_id),
            _ => None,
        }
    }

    /// Stable name used in summaries and logs
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::FullContent => "FULL_CONTENT",
            StorageKind::DiffFromBase { .. } => "DIFF_FROM_BASE",
            StorageKind::DiffFromPrev => "DIFF_FROM_PREV",
        }
    }
}

/// Compression algorithm tag stored next to every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Identity passthrough
    None,
    /// zlib-framed DEFLATE
    Deflate,
    /// GZIP container
    Gzip,
    /// Zstandard frame
    Zstd,
}

impl CompressionAlgorithm {
    /// Candidates tried by best-of compression, in tie-break order
    pub const CANDIDATES: [CompressionAlgorithm; 3] = [
        CompressionAlgorithm::Deflate,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Zstd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithm name that no codec understands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported compression algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for CompressionAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionAlgorithm::None),
            "deflate" => Ok(CompressionAlgorithm::Deflate),
            "gzip" => Ok(CompressionAlgorithm::Gzip),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// A persisted version row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: VersionId,
    pub article_id: ArticleId,
    /// Gapless per article until an optimization sweep truncates a chain
    pub version_number: u32,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub storage: StorageKind,
    /// Compressed payload: full text or encoded diff script
    pub content: Vec<u8>,
    /// SHA-256 hex of the reconstructed, uncompressed text
    pub content_hash: String,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub compression: CompressionAlgorithm,
    pub is_compressed: bool,
    pub is_archived: bool,
    pub change_summary: Option<String>,
}

impl Version {
    /// Whether this row is a base (full snapshot) version
    pub fn is_base(&self) -> bool {
        self.storage.is_full()
    }

    /// compressed / original, 0.0 when either size is unknown
    pub fn compression_ratio(&self) -> f64 {
        match (self.original_size, self.compressed_size) {
            (Some(original), Some(compressed)) if original > 0 => {
                compressed as f64 / original as f64
            }
            _ => 0.0,
        }
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version_id: self.version_id,
            version_number: self.version_number,
            author: self.author.clone(),
            created_at: self.created_at,
            storage: self.storage,
            is_archived: self.is_archived,
            change_summary: self.change_summary.clone(),
            original_size: self.original_size,
            compressed_size: self.compressed_size,
            compression_ratio: self.compression_ratio(),
        }
    }
}

/// Version metadata without the payload, used for history listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: VersionId,
    pub version_number: u32,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub storage: StorageKind,
    pub is_archived: bool,
    pub change_summary: Option<String>,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub compression_ratio: f64,
}

/// One page of history, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPage {
    pub versions: Vec<VersionSummary>,
    pub total_elements: u64,
    pub total_pages: u64,
    /// Zero-based page index
    pub page: usize,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(storage: StorageKind) -> Version {
        Version {
            version_id: VersionId(7),
            article_id: ArticleId(42),
            version_number: 3,
            author: "alice".to_string(),
            created_at: Utc::now(),
            storage,
            content: vec![1, 2, 3],
            content_hash: "00".repeat(32),
            original_size: Some(200),
            compressed_size: Some(50),
            compression: CompressionAlgorithm::Zstd,
            is_compressed: true,
            is_archived: false,
            change_summary: None,
        }
    }

    #[test]
    fn test_storage_kind_base_reference() {
        let diff = StorageKind::DiffFromBase {
            base_version_id: VersionId(1),
        };
        assert_eq!(diff.base_version_id(), Some(VersionId(1)));
        assert!(diff.is_diff());
        assert_eq!(StorageKind::FullContent.base_version_id(), None);
        assert_eq!(StorageKind::DiffFromPrev.base_version_id(), None);
        assert!(StorageKind::FullContent.is_full());
    }

    #[test]
    fn test_algorithm_names_parse() {
        for algo in CompressionAlgorithm::CANDIDATES {
            assert_eq!(algo.as_str().parse::<CompressionAlgorithm>().unwrap(), algo);
        }
        assert_eq!("NONE".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::None);
        let err = "brotli".parse::<CompressionAlgorithm>().unwrap_err();
        assert_eq!(err, UnknownAlgorithm("brotli".to_string()));
    }

    #[test]
    fn test_compression_ratio() {
        let mut version = sample(StorageKind::FullContent);
        assert!((version.compression_ratio() - 0.25).abs() < f64::EPSILON);

        version.original_size = None;
        assert_eq!(version.compression_ratio(), 0.0);
    }

    #[test]
    fn test_summary_carries_metadata() {
        let version = sample(StorageKind::DiffFromPrev);
        let summary = version.summary();
        assert_eq!(summary.version_number, 3);
        assert_eq!(summary.storage, StorageKind::DiffFromPrev);
        assert_eq!(summary.author, "alice");
    }

    #[test]
    fn test_storage_kind_serde() {
        let kind = StorageKind::DiffFromBase {
            base_version_id: VersionId(9),
        };
        let json = serde_json::to_string(&kind).unwrap();
        let back: StorageKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
