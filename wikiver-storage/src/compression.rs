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

//! Compression Engine
//!
//! Best-of compression over several general-purpose codecs. Every payload is
//! tagged with the algorithm that produced it so reads pick the exact inverse.
//!
//! ```text
//!   text ──► deflate ─┐
//!        ──► gzip    ─┼──► smallest wins ──► (bytes, algorithm, sizes)
//!        ──► zstd    ─┘
//! ```
//!
//! Empty input, and input that no codec can shrink, is stored as `none`.

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use thiserror::Error;
use wikiver_core::CompressionAlgorithm;

/// zstd level used for regular writes
const ZSTD_DEFAULT_LEVEL: i32 = 3;

/// zstd level used when archiving cold data
const ZSTD_ARCHIVE_LEVEL: i32 = 19;

/// Compression errors
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Decompression failed ({algorithm}): {reason}")]
    DecompressionFailed {
        algorithm: CompressionAlgorithm,
        reason: String,
    },

    #[error("Compression failed ({algorithm}): {source}")]
    CompressionFailed {
        algorithm: CompressionAlgorithm,
        source: std::io::Error,
    },
}

/// Effort level for a compression pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Regular write path
    Standard,
    /// Cold-data archival, slower and tighter
    Archive,
}

/// Output of a compression pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    pub data: Vec<u8>,
    pub algorithm: CompressionAlgorithm,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressedPayload {
    fn passthrough(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            algorithm: CompressionAlgorithm::None,
            original_size: data.len() as u64,
            compressed_size: data.len() as u64,
        }
    }

    /// compressed / original, 0.0 for empty payloads
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }
}

/// Stateless best-of compressor and content hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionEngine;

impl CompressionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compress text with every candidate codec and keep the smallest result
    pub fn compress_best(&self, text: &str) -> Result<CompressedPayload, CompressionError> {
        self.compress_best_bytes(text.as_bytes(), CompressionLevel::Standard)
    }

    /// Best-of compression over raw bytes
    pub fn compress_best_bytes(
        &self,
        data: &[u8],
        level: CompressionLevel,
    ) -> Result<CompressedPayload, CompressionError> {
        if data.is_empty() {
            return Ok(CompressedPayload::passthrough(data));
        }

        let mut best: Option<(CompressionAlgorithm, Vec<u8>)> = None;
        for algorithm in CompressionAlgorithm::CANDIDATES {
            let compressed = self.compress_with(algorithm, data, level)?;
            let smaller = match &best {
                Some((_, current)) => compressed.len() < current.len(),
                None => true,
            };
            if smaller {
                best = Some((algorithm, compressed));
            }
        }

        match best {
            Some((algorithm, compressed)) if compressed.len() < data.len() => {
                tracing::trace!(
                    algorithm = %algorithm,
                    original = data.len(),
                    compressed = compressed.len(),
                    "Selected compression algorithm"
                );
                Ok(CompressedPayload {
                    original_size: data.len() as u64,
                    compressed_size: compressed.len() as u64,
                    data: compressed,
                    algorithm,
                })
            }
            _ => Ok(CompressedPayload::passthrough(data)),
        }
    }

    /// Compress with one specific codec
    pub fn compress_with(
        &self,
        algorithm: CompressionAlgorithm,
        data: &[u8],
        level: CompressionLevel,
    ) -> Result<Vec<u8>, CompressionError> {
        let failed = |source| CompressionError::CompressionFailed { algorithm, source };
        match algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(data).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
            CompressionAlgorithm::Gzip => {
                let gzip_level = match level {
                    CompressionLevel::Standard => Compression::default(),
                    CompressionLevel::Archive => Compression::best(),
                };
                let mut encoder = GzEncoder::new(Vec::new(), gzip_level);
                encoder.write_all(data).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
            CompressionAlgorithm::Zstd => {
                let zstd_level = match level {
                    CompressionLevel::Standard => ZSTD_DEFAULT_LEVEL,
                    CompressionLevel::Archive => ZSTD_ARCHIVE_LEVEL,
                };
                zstd::stream::encode_all(data, zstd_level).map_err(failed)
            }
        }
    }

    /// Decompress a payload tagged with an algorithm name
    pub fn decompress(&self, data: &[u8], algorithm: &str) -> Result<String, CompressionError> {
        let algorithm: CompressionAlgorithm = algorithm
            .parse()
            .map_err(|e: wikiver_core::UnknownAlgorithm| {
                CompressionError::UnsupportedAlgorithm(e.0)
            })?;
        self.decompress_with(data, algorithm)
    }

    /// Decompress a payload into UTF-8 text
    pub fn decompress_with(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<String, CompressionError> {
        let bytes = self.decompress_bytes(data, algorithm)?;
        String::from_utf8(bytes).map_err(|_| CompressionError::DecompressionFailed {
            algorithm,
            reason: "payload is not valid UTF-8".to_string(),
        })
    }

    /// Decompress a payload into raw bytes
    pub fn decompress_bytes(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<Vec<u8>, CompressionError> {
        let failed = |reason: String| CompressionError::DecompressionFailed { algorithm, reason };
        match algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Deflate => inflate_zlib(data).map_err(failed),
            CompressionAlgorithm::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 4);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(out)
            }
            CompressionAlgorithm::Zstd => {
                zstd::stream::decode_all(data).map_err(|e| failed(e.to_string()))
            }
        }
    }

    /// Recompress an existing payload at archival strength.
    ///
    /// Returns `None` when the archival pass does not beat the current size.
    pub fn recompress_for_archive(
        &self,
        data: &[u8],
        algorithm: CompressionAlgorithm,
    ) -> Result<Option<CompressedPayload>, CompressionError> {
        let raw = self.decompress_bytes(data, algorithm)?;
        let candidate = self.compress_best_bytes(&raw, CompressionLevel::Archive)?;
        if candidate.compressed_size < data.len() as u64 {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }

    /// SHA-256 hex digest of the UTF-8 bytes of `text`
    pub fn hash(&self, text: &str) -> String {
        content_hash(text)
    }
}

/// SHA-256 hex digest used for content deduplication
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Inflate a zlib stream, failing unless the stream end marker is reached
fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut inflater = Decompress::new(true);
    let mut out: Vec<u8> = Vec::with_capacity(data.len().saturating_mul(4).max(64));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(1024));
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| e.to_string())?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed
                    && inflater.total_out() == produced;
                if stalled && out.len() < out.capacity() {
                    return Err("truncated deflate stream".to_string());
                }
            }
        }
    }
}
