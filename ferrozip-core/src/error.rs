//! Error types for ferrozip operations.
//!
//! A single error enum covers the whole stack: I/O failures from the
//! underlying reader/writer, format violations found while decoding DEFLATE
//! or ZIP structures, and constraint violations raised while building
//! archives. Errors propagate to the top-level `compress`/`decompress`/
//! `save`/`extract` call; there is no in-band recovery.

use std::io;
use thiserror::Error;

/// Which checksum detected a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-32 (ISO 3309), used by ZIP members.
    Crc32,
    /// Adler-32 (RFC 1950), used by the zlib trailer.
    Adler32,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crc32 => write!(f, "CRC-32"),
            Self::Adler32 => write!(f, "Adler-32"),
        }
    }
}

/// The main error type for ferrozip operations.
#[derive(Debug, Error)]
pub enum FerrozipError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input ended before a read could be satisfied.
    #[error("unexpected end of input: expected {expected} more byte(s)")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// A DEFLATE block header carried the reserved block type 3.
    #[error("reserved block type 3 in deflate stream")]
    UnknownBlockType,

    /// A stored block's LEN and one's-complement NLEN fields disagree.
    #[error("stored block length check failed: LEN={len:#06x}, NLEN={nlen:#06x}")]
    StoredLenMismatch {
        /// The LEN field as read.
        len: u16,
        /// The NLEN field as read.
        nlen: u16,
    },

    /// A Huffman code-length set does not describe a usable code.
    #[error("malformed Huffman tree: code space sums to {code_space}, expected 65536")]
    MalformedTree {
        /// Occupied code space in 16-bit fixed-point units.
        code_space: u32,
    },

    /// The bit stream selected a code with no assigned symbol.
    #[error("invalid Huffman code at bit position {bit_position}")]
    DecodeTree {
        /// Bit position where decoding failed.
        bit_position: u64,
    },

    /// An LZ77 back-reference pointed before the start of the output.
    #[error("invalid back-reference distance {distance}: only {available} byte(s) of history")]
    InvalidDistance {
        /// The offending distance.
        distance: usize,
        /// Bytes of history actually available.
        available: usize,
    },

    /// The two-byte zlib header failed validation.
    #[error("invalid zlib header: {reason}")]
    ZlibHeader {
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A stored checksum does not match the recomputed one.
    #[error("{kind} mismatch: stored {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Which checksum failed.
        kind: ChecksumKind,
        /// Value carried by the stream.
        expected: u32,
        /// Value computed from the data.
        computed: u32,
    },

    /// A fixed-position signature did not match.
    #[error("bad signature: expected {expected:#010x}, found {found:#010x}")]
    SignatureMismatch {
        /// Expected signature value.
        expected: u32,
        /// Signature actually found.
        found: u32,
    },

    /// No end-of-central-directory record was found, or its counts are
    /// inconsistent.
    #[error("ZIP central directory not found or inconsistent")]
    NoCentralDirectory,

    /// The end-of-central-directory record reports a zero-sized directory.
    #[error("ZIP central directory is empty")]
    EmptyCentralDirectory,

    /// The archive spans multiple disks.
    #[error("multi-disk ZIP archives are not supported")]
    MultiDiskUnsupported,

    /// A member does not fit the 32-bit size fields.
    #[error("file too large for a 32-bit archive field: {size} bytes")]
    FileTooLarge {
        /// The offending size.
        size: u64,
    },

    /// An entry with the same name already exists in the archive.
    #[error("duplicate archive entry: {name}")]
    DuplicateEntry {
        /// The duplicated name.
        name: String,
    },

    /// An entry name is absolute, carries a drive letter, escapes the
    /// archive root, or cannot be encoded for the wire.
    #[error("invalid archive path: {name}")]
    InvalidArchivePath {
        /// The offending name.
        name: String,
    },

    /// No entry with the requested name exists.
    #[error("entry not found: {name}")]
    EntryNotFound {
        /// The requested name.
        name: String,
    },

    /// A member uses a compression method other than stored or deflate.
    #[error("unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The method id from the header.
        method: u16,
    },
}

/// Result type alias for ferrozip operations.
pub type Result<T> = std::result::Result<T, FerrozipError>;

impl FerrozipError {
    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an invalid-code error at the given bit position.
    pub fn decode_tree(bit_position: u64) -> Self {
        Self::DecodeTree { bit_position }
    }

    /// Create a malformed-tree error.
    pub fn malformed_tree(code_space: u32) -> Self {
        Self::MalformedTree { code_space }
    }

    /// Create an invalid-distance error.
    pub fn invalid_distance(distance: usize, available: usize) -> Self {
        Self::InvalidDistance {
            distance,
            available,
        }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(kind: ChecksumKind, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            kind,
            expected,
            computed,
        }
    }

    /// Create a signature mismatch error.
    pub fn signature_mismatch(expected: u32, found: u32) -> Self {
        Self::SignatureMismatch { expected, found }
    }

    /// Create a duplicate-entry error.
    pub fn duplicate_entry(name: impl Into<String>) -> Self {
        Self::DuplicateEntry { name: name.into() }
    }

    /// Create an invalid-path error.
    pub fn invalid_path(name: impl Into<String>) -> Self {
        Self::InvalidArchivePath { name: name.into() }
    }

    /// Create an entry-not-found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FerrozipError::checksum_mismatch(ChecksumKind::Crc32, 0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC-32 mismatch"));

        let err = FerrozipError::StoredLenMismatch {
            len: 0x0005,
            nlen: 0x1234,
        };
        assert!(err.to_string().contains("LEN=0x0005"));

        let err = FerrozipError::duplicate_entry("a.txt");
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: FerrozipError = io_err.into();
        assert!(matches!(err, FerrozipError::Io(_)));
    }
}
