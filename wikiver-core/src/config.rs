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

//! Configuration for the version engine
//!
//! Thresholds that drive storage decisions and the maintenance sweeps.
//! Passed explicitly into the engine so tests can pin boundary values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default change ratio above which a full snapshot is stored
pub const DEFAULT_DIFF_THRESHOLD: f64 = 0.7;

/// Default number of dependent diffs that triggers chain consolidation
pub const DEFAULT_OPTIMIZATION_THRESHOLD: usize = 10;

/// Default lookahead window of the line differ
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 10;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which ancestor newly created diff versions are anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAnchor {
    /// `DiffFromBase` referencing the latest full snapshot
    #[default]
    Base,
    /// `DiffFromPrev`, resolved through the nearest earlier full snapshot
    Previous,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Change ratio above which an edit is stored as a full snapshot
    pub diff_threshold: f64,

    /// Dependent diff count above which a chain is consolidated
    pub optimization_threshold: usize,

    /// Articles not optimized within this many days are swept regardless
    /// of their `optimization_needed` flag
    pub reoptimize_after_days: i64,

    /// Articles not read within this many days are cold
    pub cold_after_days: i64,

    /// Minimum version age, in days, before archival
    pub archive_after_days: i64,

    /// Bounded lookahead of the line differ
    pub lookahead_window: usize,

    /// Anchor for newly created diff versions
    pub diff_anchor: DiffAnchor,

    /// Fail reads on malformed diff script lines instead of skipping them
    pub strict_diff_decode: bool,

    /// Reconstructed-content cache entries (0 disables the cache)
    pub content_cache_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            optimization_threshold: DEFAULT_OPTIMIZATION_THRESHOLD,
            reoptimize_after_days: 30,
            cold_after_days: 30,
            archive_after_days: 90,
            lookahead_window: DEFAULT_LOOKAHEAD_WINDOW,
            diff_anchor: DiffAnchor::Base,
            strict_diff_decode: true,
            content_cache_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = parse_toml(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: EngineConfig = read_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.diff_threshold.is_finite() || self.diff_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "diff_threshold must be a finite non-negative number, got {}",
                self.diff_threshold
            )));
        }
        if self.lookahead_window == 0 {
            return Err(ConfigError::Invalid(
                "lookahead_window must be at least 1".to_string(),
            ));
        }
        for (name, days) in [
            ("reoptimize_after_days", self.reoptimize_after_days),
            ("cold_after_days", self.cold_after_days),
            ("archive_after_days", self.archive_after_days),
        ] {
            if days < 0 {
                return Err(ConfigError::Invalid(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }

    /// Disable the content cache (useful in tests that inspect raw reads)
    pub fn without_cache(mut self) -> Self {
        self.content_cache_capacity = 0;
        self
    }
}

/// Parse a TOML document into any config shape
pub fn parse_toml<T: DeserializeOwned>(s: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(s)?)
}

/// Read and parse a TOML file. Callers validate what they embed.
pub fn read_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    parse_toml(&data)
}
