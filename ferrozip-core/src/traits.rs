//! Core traits and tuning types shared across the stack.

use crate::error::Result;

/// A whole-buffer compressor (encoder).
pub trait Compressor {
    /// Compress `input` and return the encoded bytes.
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Reset internal state so the instance can be reused.
    fn reset(&mut self);
}

/// A whole-buffer decompressor (decoder).
pub trait Decompressor {
    /// Decompress `input` and return the decoded bytes.
    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Reset internal state so the instance can be reused.
    fn reset(&mut self);
}

/// Compression level, clamped to 0-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (stored blocks only).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Balanced default.
    pub const DEFAULT: Self = Self(6);
    /// Best compression (slowest).
    pub const BEST: Self = Self(9);

    /// Create a level, clamping to 0-9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// The raw level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_level_clamping() {
        assert_eq!(CompressionLevel::NONE.level(), 0);
        assert_eq!(CompressionLevel::DEFAULT.level(), 6);
        assert_eq!(CompressionLevel::BEST.level(), 9);
        assert_eq!(CompressionLevel::new(200).level(), 9);
        assert_eq!(CompressionLevel::from(3).level(), 3);
    }
}
