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

//! Wikiver Storage Layer
//!
//! Version history engine for wiki articles: every content change becomes an
//! immutable version row stored as a compressed full snapshot or a compressed
//! line diff against the latest snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VersionStore                        │
//! │   create / read / restore      optimization / archival   │
//! ├───────────────┬───────────────────┬──────────────────────┤
//! │  DiffEngine   │ CompressionEngine │   content cache      │
//! │ (line diffs)  │ (best-of codecs)  │   (moka)             │
//! ├───────────────┴───────────────────┴──────────────────────┤
//! │  VersionTable: per-article history + atomic stats rows   │
//! │  bincode snapshot file (magic, format, crc32)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wikiver_core::ArticleId;
//! use wikiver_storage::VersionStore;
//!
//! let store = VersionStore::with_defaults();
//! let v1 = store.create_version(ArticleId(1), "Hello world", "alice")?;
//! let text = store.get_version_content(ArticleId(1), v1.version_number)?;
//! ```

pub mod compression;
pub mod diff;
pub mod error;
pub mod maintenance;
pub mod stats;
pub mod table;
pub mod version_store;

pub use compression::{
    content_hash, CompressedPayload, CompressionEngine, CompressionError, CompressionLevel,
};
pub use diff::{DiffConfig, DiffEngine, DiffError, DiffLine, DiffResult, LineChange};
pub use error::{Result, VersionError};
pub use maintenance::{ArchivalReport, OptimizationReport};
pub use stats::AtomicVersionStats;
pub use table::{ArticleHistory, ArticleSlot, TableError, VersionTable};
pub use version_store::VersionStore;
