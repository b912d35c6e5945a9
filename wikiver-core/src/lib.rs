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

//! Wikiver Core
//!
//! Domain types shared by the article version engine: version rows, storage
//! kinds, per-article statistics, engine configuration and the clock seam.

pub mod clock;
pub mod config;
pub mod stats;
pub mod version;

pub use clock::{days_before, Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DiffAnchor, EngineConfig};
pub use stats::VersionStats;
pub use version::{
    ArticleId, CompressionAlgorithm, StorageKind, UnknownAlgorithm, Version, VersionId,
    VersionPage, VersionSummary,
};
