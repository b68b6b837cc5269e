//! # Ferrozip Core
//!
//! Core components for the ferrozip compression library.
//!
//! This crate provides the building blocks the codec and container layers
//! are assembled from:
//!
//! - [`bitstream`]: LSB-first bit-level I/O for variable-length codes
//! - [`window`]: the 32 KiB output sliding window for LZ77 back-references
//! - [`checksum`]: CRC-32 and Adler-32, plus streaming decorators
//! - [`error`]: the error type shared by every layer
//! - [`traits`]: compressor/decompressor seams and the compression level
//!
//! ## Architecture
//!
//! Ferrozip is a layered stack:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ L4: fzip CLI                                 │
//! ├──────────────────────────────────────────────┤
//! │ L3: Container (ferrozip-archive)             │
//! │     ZIP local/central headers, EOCD, compact │
//! ├──────────────────────────────────────────────┤
//! │ L2: Codec (ferrozip-deflate)                 │
//! │     DEFLATE encode/decode, Huffman, zlib     │
//! ├──────────────────────────────────────────────┤
//! │ L1: This crate                               │
//! │     BitReader/BitWriter, window, checksums   │
//! └──────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod checksum;
pub mod error;
pub mod traits;
pub mod window;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use checksum::{Adler32, Crc32, CrcReader, CrcWriter};
pub use error::{ChecksumKind, FerrozipError, Result};
pub use traits::{CompressionLevel, Compressor, Decompressor};
pub use window::{OutputWindow, WINDOW_SIZE};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::{BitReader, BitWriter};
    pub use crate::checksum::{Adler32, Crc32};
    pub use crate::error::{FerrozipError, Result};
    pub use crate::traits::{CompressionLevel, Compressor, Decompressor};
    pub use crate::window::OutputWindow;
}
