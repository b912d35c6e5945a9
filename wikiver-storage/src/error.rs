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

//! Error types for the version engine

use crate::compression::CompressionError;
use crate::diff::DiffError;
use crate::table::TableError;
use thiserror::Error;
use wikiver_core::{ArticleId, VersionId};

/// Errors surfaced by [`crate::VersionStore`] operations
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Version {version_number} not found for article {article_id}")]
    VersionNotFound {
        article_id: ArticleId,
        version_number: u32,
    },

    #[error("Article {0} has no versions")]
    EmptyHistory(ArticleId),

    /// `base_version_id` is `None` for `DiffFromPrev` rows with no earlier snapshot
    #[error("Base version {} missing or not a full snapshot (needed by {version_id})", display_base(.base_version_id))]
    BaseVersionMissing {
        version_id: VersionId,
        base_version_id: Option<VersionId>,
    },

    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Decompression failed for {version_id}: {reason}")]
    DecompressionFailed { version_id: VersionId, reason: String },

    #[error("Version {version_number} already matches the latest content of article {article_id}")]
    NothingToRestore {
        article_id: ArticleId,
        version_number: u32,
    },

    #[error("Version number {version_number} already exists for article {article_id}")]
    DuplicateVersionNumber {
        article_id: ArticleId,
        version_number: u32,
    },

    #[error("Corrupt diff payload in {version_id}: {source}")]
    CorruptDiff {
        version_id: VersionId,
        #[source]
        source: DiffError,
    },

    #[error("Reconstructed content of {version_id} does not match its hash (expected {expected}, got {actual})")]
    IntegrityMismatch {
        version_id: VersionId,
        expected: String,
        actual: String,
    },

    #[error("Compression error: {0}")]
    Compression(CompressionError),

    #[error("Table error: {0}")]
    Table(TableError),
}

fn display_base(base: &Option<VersionId>) -> String {
    match base {
        Some(id) => id.to_string(),
        None => "<none>".to_string(),
    }
}

impl VersionError {
    /// Only a lost insert race is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, VersionError::DuplicateVersionNumber { .. })
    }

    /// Stored data is damaged or inconsistent
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            VersionError::BaseVersionMissing { .. }
                | VersionError::DecompressionFailed { .. }
                | VersionError::CorruptDiff { .. }
                | VersionError::IntegrityMismatch { .. }
                | VersionError::UnsupportedAlgorithm(_)
        )
    }

    pub(crate) fn decompression(version_id: VersionId, err: CompressionError) -> Self {
        match err {
            CompressionError::UnsupportedAlgorithm(name) => VersionError::UnsupportedAlgorithm(name),
            CompressionError::DecompressionFailed { reason, .. } => {
                VersionError::DecompressionFailed { version_id, reason }
            }
            other => VersionError::Compression(other),
        }
    }
}

impl From<CompressionError> for VersionError {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::UnsupportedAlgorithm(name) => VersionError::UnsupportedAlgorithm(name),
            other => VersionError::Compression(other),
        }
    }
}

impl From<TableError> for VersionError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::DuplicateVersionNumber {
                article_id,
                version_number,
            } => VersionError::DuplicateVersionNumber {
                article_id,
                version_number,
            },
            other => VersionError::Table(other),
        }
    }
}

/// Result alias for version engine operations
pub type Result<T> = std::result::Result<T, VersionError>;
