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

//! Diff Engine - Bounded Lookahead Line Alignment
//!
//! Computes line-level edit scripts between two texts, replays them onto a
//! base text, and serialises them in a compact line format.
//!
//! The aligner walks both line arrays in parallel. On a mismatch it looks a
//! bounded window ahead in each array for the other side's current line and
//! emits a run of removals or additions toward the nearer match; with no
//! match in either window the pair is treated as a substitution. This is
//! not a minimal diff, but it is linear and fits localized prose edits.
//!
//! ## Line anchoring
//!
//! Every base line gets exactly one `Unchanged` or `Removed` entry carrying
//! its own index. `Added` lines carry the index of the base line they follow,
//! so replaying each index group as "base line (unless removed), then its
//! additions" reproduces the new text.
//!
//! ```text
//!   base: [a, b]       new: [a, x, b, y]
//!   script: " 0:a"  "+0:x"  " 1:b"  "+1:y"
//! ```
//!
//! ## Wire format
//!
//! One entry per line, `<symbol><index>:<content>\n`, with `+`, `-` and a
//! space for Added, Removed and Unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Diff decoding errors (strict mode only)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("Malformed diff entry at script line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Type of change for a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineChange {
    /// Line only exists in the new text
    Added,
    /// Line only exists in the base text
    Removed,
    /// Line exists in both
    Unchanged,
}

impl LineChange {
    pub fn symbol(&self) -> char {
        match self {
            LineChange::Added => '+',
            LineChange::Removed => '-',
            LineChange::Unchanged => ' ',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(LineChange::Added),
            '-' => Some(LineChange::Removed),
            ' ' => Some(LineChange::Unchanged),
            _ => None,
        }
    }
}

/// A single entry of an edit script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub change: LineChange,
    /// 0-based base line index this entry is grouped under
    pub line_number: usize,
    /// Line content without the `\n` terminator
    pub content: String,
}

impl DiffLine {
    pub fn new(change: LineChange, line_number: usize, content: impl Into<String>) -> Self {
        Self {
            change,
            line_number,
            content: content.into(),
        }
    }
}

/// Result of diffing two texts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub lines: Vec<DiffLine>,
    /// (added + removed chars) / max(1, base length in chars)
    pub change_ratio: f64,
    pub added_chars: usize,
    pub removed_chars: usize,
}

impl DiffResult {
    /// Whether the edit is large enough to be stored as a full snapshot
    pub fn is_large_change(&self, threshold: f64) -> bool {
        self.change_ratio > threshold
    }

    /// True when the script changes nothing
    pub fn is_unchanged(&self) -> bool {
        self.lines.iter().all(|l| l.change == LineChange::Unchanged)
    }
}

/// Configuration for diff engine
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// How many lines ahead the aligner searches for a resynchronisation point
    pub lookahead_window: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            lookahead_window: wikiver_core::config::DEFAULT_LOOKAHEAD_WINDOW,
        }
    }
}

/// Line differ with bounded lookahead
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    /// Create a new diff engine with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Diff two texts
    pub fn diff(&self, old_text: &str, new_text: &str) -> DiffResult {
        let old_lines = split_lines(old_text);
        let new_lines = split_lines(new_text);
        let lines = self.align(&old_lines, &new_lines);

        let mut added_chars = 0usize;
        let mut removed_chars = 0usize;
        for line in &lines {
            match line.change {
                LineChange::Added => added_chars += line.content.chars().count(),
                LineChange::Removed => removed_chars += line.content.chars().count(),
                LineChange::Unchanged => {}
            }
        }

        let base_len = old_text.chars().count().max(1);
        DiffResult {
            lines,
            change_ratio: (added_chars + removed_chars) as f64 / base_len as f64,
            added_chars,
            removed_chars,
        }
    }

    fn align(&self, old: &[&str], new: &[&str]) -> Vec<DiffLine> {
        let mut out = Vec::with_capacity(old.len().max(new.len()));
        let mut oi = 0usize;
        let mut ni = 0usize;

        while oi < old.len() || ni < new.len() {
            if oi >= old.len() {
                // Trailing additions follow the last base line
                out.push(DiffLine::new(LineChange::Added, oi.saturating_sub(1), new[ni]));
                ni += 1;
            } else if ni >= new.len() {
                out.push(DiffLine::new(LineChange::Removed, oi, old[oi]));
                oi += 1;
            } else if old[oi] == new[ni] {
                out.push(DiffLine::new(LineChange::Unchanged, oi, old[oi]));
                oi += 1;
                ni += 1;
            } else {
                let next_old = self.find_next(old, oi, new[ni]);
                let next_new = self.find_next(new, ni, old[oi]);

                match (next_old, next_new) {
                    (Some(o), n) if n.map_or(true, |n| o - oi <= n - ni) => {
                        while oi < o {
                            out.push(DiffLine::new(LineChange::Removed, oi, old[oi]));
                            oi += 1;
                        }
                    }
                    (_, Some(n)) if oi == 0 => {
                        // Nothing precedes the insertion point: rewrite base
                        // line 0 as part of the inserted run.
                        out.push(DiffLine::new(LineChange::Removed, 0, old[0]));
                        for line in &new[ni..=n] {
                            out.push(DiffLine::new(LineChange::Added, 0, *line));
                        }
                        oi = 1;
                        ni = n + 1;
                    }
                    (_, Some(n)) => {
                        for line in &new[ni..n] {
                            out.push(DiffLine::new(LineChange::Added, oi - 1, *line));
                        }
                        ni = n;
                    }
                    _ => {
                        out.push(DiffLine::new(LineChange::Removed, oi, old[oi]));
                        out.push(DiffLine::new(LineChange::Added, oi, new[ni]));
                        oi += 1;
                        ni += 1;
                    }
                }
            }
        }

        out
    }

    /// Index of the first reappearance of `target` within the window after `start`
    fn find_next(&self, lines: &[&str], start: usize, target: &str) -> Option<usize> {
        let end = lines
            .len()
            .min(start.saturating_add(self.config.lookahead_window).saturating_add(1));
        (start + 1..end).find(|&i| lines[i] == target)
    }

    /// Replay an edit script onto `base_text`.
    ///
    /// Entries are grouped by line index. For each index the base line is
    /// kept unless the group removes it, then the group's added lines follow
    /// in emission order. Base lines without any entry are copied through.
    pub fn apply_diff(&self, base_text: &str, lines: &[DiffLine]) -> String {
        let base = split_lines(base_text);

        let mut groups: BTreeMap<usize, Vec<&DiffLine>> = BTreeMap::new();
        for line in lines {
            groups.entry(line.line_number).or_default().push(line);
        }

        let last_index = groups.keys().next_back().copied();
        let end = match last_index {
            Some(index) => base.len().max(index + 1),
            None => base.len(),
        };

        let mut result: Vec<&str> = Vec::with_capacity(end);
        for index in 0..end {
            match groups.get(&index) {
                None => {
                    if let Some(line) = base.get(index) {
                        result.push(*line);
                    }
                }
                Some(group) => {
                    let removed = group.iter().any(|l| l.change == LineChange::Removed);
                    if !removed {
                        if let Some(line) = base.get(index) {
                            result.push(*line);
                        }
                    }
                    result.extend(
                        group
                            .iter()
                            .filter(|l| l.change == LineChange::Added)
                            .map(|l| l.content.as_str()),
                    );
                }
            }
        }

        result.join("\n")
    }

    /// Serialise a script to the line format
    pub fn encode(&self, lines: &[DiffLine]) -> String {
        let capacity = lines.iter().map(|l| l.content.len() + 8).sum();
        let mut out = String::with_capacity(capacity);
        for line in lines {
            out.push(line.change.symbol());
            out.push_str(&line.line_number.to_string());
            out.push(':');
            out.push_str(&line.content);
            out.push('\n');
        }
        out
    }

    /// Parse a script, skipping malformed entries.
    ///
    /// Skipped entries are logged; use [`DiffEngine::decode_strict`] where a
    /// damaged script must not be replayed.
    pub fn decode(&self, encoded: &str) -> Vec<DiffLine> {
        let mut lines = Vec::new();
        let mut skipped = 0usize;
        for (index, raw) in script_lines(encoded) {
            match parse_entry(raw) {
                Ok(line) => lines.push(line),
                Err(reason) => {
                    skipped += 1;
                    tracing::debug!(line = index + 1, reason, "Skipping malformed diff entry");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, kept = lines.len(), "Diff script had malformed entries");
        }
        lines
    }

    /// Parse a script, failing on the first malformed entry
    pub fn decode_strict(&self, encoded: &str) -> Result<Vec<DiffLine>, DiffError> {
        script_lines(encoded)
            .map(|(index, raw)| {
                parse_entry(raw).map_err(|reason| DiffError::Malformed {
                    line: index + 1,
                    reason: reason.to_string(),
                })
            })
            .collect()
    }
}

/// Split on `\n`; a trailing `\r` stays with its line so CRLF text round-trips
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Script lines paired with their index, minus the terminator's empty tail
fn script_lines(encoded: &str) -> impl Iterator<Item = (usize, &str)> {
    let body = encoded.strip_suffix('\n').unwrap_or(encoded);
    let empty = encoded.is_empty();
    body.split('\n').enumerate().filter(move |_| !empty)
}

fn parse_entry(raw: &str) -> Result<DiffLine, &'static str> {
    let mut chars = raw.chars();
    let symbol = chars.next().ok_or("empty entry")?;
    let change = LineChange::from_symbol(symbol).ok_or("unknown change symbol")?;
    let rest = chars.as_str();
    let colon = rest.find(':').ok_or("missing ':' separator")?;
    let line_number = rest[..colon]
        .parse::<usize>()
        .map_err(|_| "line index is not a number")?;
    Ok(DiffLine {
        change,
        line_number,
        content: rest[colon + 1..].to_string(),
    })
}
