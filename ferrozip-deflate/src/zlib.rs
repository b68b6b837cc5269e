//! zlib stream wrapper (RFC 1950).
//!
//! A zlib stream is a two-byte header, a raw DEFLATE stream, and a
//! big-endian Adler-32 of the uncompressed data:
//!
//! ```text
//! +---+---+============+---+---+---+---+
//! |CMF|FLG| compressed |    ADLER32    |
//! +---+---+============+---+---+---+---+
//! ```
//!
//! CMF is 0x78 for deflate with a 32 KiB window, or 0x70 for a stored
//! stream. FLG carries the compression-level hint in bits 6-7 and a 5-bit
//! check value chosen so the 16-bit header is a multiple of 31.

use crate::deflate::deflate;
use crate::inflate::inflate;
use ferrozip_core::checksum::Adler32;
use ferrozip_core::error::{ChecksumKind, FerrozipError, Result};

/// CMF byte for deflate with a 32 KiB window (CINFO=7, CM=8).
const CMF_DEFLATE: u8 = 0x78;

/// CMF byte for a stored stream.
const CMF_STORED: u8 = 0x70;

/// Map a compression level (0-9) to the 2-bit FLEVEL hint.
fn flevel(level: u8) -> u8 {
    match level {
        0..=2 => 0,
        3..=5 => 1,
        6 => 2,
        _ => 3,
    }
}

/// Compress `input` into a zlib stream at the given level (0-9).
pub fn zlib_compress(input: &[u8], level: u8) -> Result<Vec<u8>> {
    let level = level.min(9);
    let body = deflate(input, level)?;

    let cmf = if level == 0 { CMF_STORED } else { CMF_DEFLATE };
    let mut flg = flevel(level) << 6;
    let rem = (u16::from(cmf) * 256 + u16::from(flg)) % 31;
    if rem != 0 {
        flg |= (31 - rem) as u8;
    }

    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(cmf);
    out.push(flg);
    out.extend_from_slice(&body);
    out.extend_from_slice(&Adler32::checksum(input).to_be_bytes());
    Ok(out)
}

/// Decompress a zlib stream, verifying the header and the Adler-32 trailer.
pub fn zlib_decompress(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < 6 {
        return Err(FerrozipError::ZlibHeader {
            reason: "stream shorter than header and trailer",
        });
    }

    let cmf = input[0];
    let flg = input[1];
    if cmf != CMF_DEFLATE && cmf != CMF_STORED {
        return Err(FerrozipError::ZlibHeader {
            reason: "unsupported method or window size",
        });
    }
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(FerrozipError::ZlibHeader {
            reason: "check bits do not validate",
        });
    }
    if flg & 0x20 != 0 {
        return Err(FerrozipError::ZlibHeader {
            reason: "preset dictionaries are not supported",
        });
    }

    let body = &input[2..input.len() - 4];
    let data = inflate(body)?;

    let stored = u32::from_be_bytes(input[input.len() - 4..].try_into().unwrap());
    let computed = Adler32::checksum(&data);
    if stored != computed {
        return Err(FerrozipError::checksum_mismatch(
            ChecksumKind::Adler32,
            stored,
            computed,
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_multiple_of_31() {
        for level in 0..=9u8 {
            let out = zlib_compress(b"test", level).unwrap();
            let header = u16::from(out[0]) * 256 + u16::from(out[1]);
            assert_eq!(header % 31, 0, "level {level}");
        }
    }

    #[test]
    fn test_header_bytes() {
        assert_eq!(zlib_compress(b"test", 6).unwrap()[0], 0x78);
        assert_eq!(zlib_compress(b"test", 0).unwrap()[0], 0x70);
    }

    #[test]
    fn test_roundtrip() {
        let data = b"Hello, World! Hello, World! Hello, World!";
        for level in 0..=9u8 {
            let compressed = zlib_compress(data, level).unwrap();
            assert_eq!(zlib_decompress(&compressed).unwrap(), data, "level {level}");
        }
    }

    #[test]
    fn test_roundtrip_empty() {
        let compressed = zlib_compress(b"", 6).unwrap();
        assert!(zlib_decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_trailer_detected() {
        let mut compressed = zlib_compress(b"payload for checksumming", 6).unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;
        assert!(matches!(
            zlib_decompress(&compressed),
            Err(FerrozipError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_header_rejected() {
        // CM != 8
        assert!(matches!(
            zlib_decompress(&[0x08, 0x1D, 0x00, 0x00, 0x00, 0x01]),
            Err(FerrozipError::ZlibHeader { .. })
        ));
        // Too short
        assert!(matches!(
            zlib_decompress(&[0x78, 0x9C]),
            Err(FerrozipError::ZlibHeader { .. })
        ));
        // Bad check bits
        assert!(matches!(
            zlib_decompress(&[0x78, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]),
            Err(FerrozipError::ZlibHeader { .. })
        ));
    }

    #[test]
    fn test_fdict_rejected() {
        // Valid check bits with FDICT set: 0x78 0x20 -> add check bits.
        let cmf = 0x78u8;
        let mut flg = 0x20u8;
        let rem = (u16::from(cmf) * 256 + u16::from(flg)) % 31;
        if rem != 0 {
            flg |= (31 - rem) as u8;
        }
        let stream = [cmf, flg, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            zlib_decompress(&stream),
            Err(FerrozipError::ZlibHeader { .. })
        ));
    }
}
