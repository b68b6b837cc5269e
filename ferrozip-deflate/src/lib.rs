//! # Ferrozip Deflate
//!
//! Pure Rust implementation of the DEFLATE compressed data format
//! (RFC 1951) and the zlib wrapper around it (RFC 1950).
//!
//! ## Example
//!
//! ```rust
//! use ferrozip_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Compression levels
//!
//! - Level 0: stored blocks only
//! - Levels 1-3: greedy matching, short hash chains
//! - Levels 4-9: lazy matching with progressively deeper searches
//!   (6 is the balanced default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod tables;
pub mod zlib;

// Re-exports
pub use deflate::{deflate, Deflater, Token};
pub use huffman::DecodeTable;
pub use inflate::{inflate, inflate_to_writer, Inflater};
pub use zlib::{zlib_compress, zlib_decompress};
