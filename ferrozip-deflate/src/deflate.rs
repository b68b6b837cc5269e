//! DEFLATE compression (RFC 1951).
//!
//! The encoder runs a hash-chained LZ77 match finder over the input,
//! batching the resulting literal/match tokens into blocks of up to 16 384
//! symbols. At each block boundary it prices the block as stored, as static
//! Huffman and as dynamic Huffman, and emits the cheapest form. If the whole
//! compressed stream still ends up larger than a plain stored stream, the
//! output is rewound and the input re-emitted as stored blocks, which bounds
//! expansion at 5 bytes per 64 KiB plus change.

use crate::huffman::{
    assign_codes, build_code_lengths, rle_encode_lengths, MAX_CODELEN_BITS, MAX_CODE_BITS,
};
use crate::tables::{
    dist_to_code, fixed_litlen_lengths, hash3, length_to_code, CODE_LENGTH_ORDER,
};
use ferrozip_core::error::Result;
use ferrozip_core::traits::Compressor;
use ferrozip_core::BitWriter;
use std::io::Write;

/// Minimum match length.
pub const MIN_MATCH: usize = 3;

/// Maximum match length.
pub const MAX_MATCH: usize = 258;

/// LZ77 window size: matches reach at most this far back.
pub const WINDOW_SIZE: usize = 32768;

/// Hash chain head count (16-bit hash).
const HASH_SIZE: usize = 65536;

/// Symbol block buffer capacity.
const BLOCK_TOKENS: usize = 16384;

/// Length-3 matches farther back than this cost more bits than literals.
const TOO_FAR: usize = 4096;

/// Maximum stored-block payload.
const MAX_STORED: usize = 65535;

/// One LZ77 output symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to earlier output.
    Match {
        /// Bytes to copy (3-258).
        length: u16,
        /// Distance back (1-32768).
        distance: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Stored,
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy)]
struct LevelParams {
    strategy: Strategy,
    good_len: usize,
    max_lazy: usize,
    nice_len: usize,
    max_chain: usize,
}

const fn lp(
    strategy: Strategy,
    good_len: usize,
    max_lazy: usize,
    nice_len: usize,
    max_chain: usize,
) -> LevelParams {
    LevelParams {
        strategy,
        good_len,
        max_lazy,
        nice_len,
        max_chain,
    }
}

/// Tuning constants per compression level.
const LEVELS: [LevelParams; 10] = [
    lp(Strategy::Stored, 0, 0, 0, 0),
    lp(Strategy::Fast, 4, 4, 8, 4),
    lp(Strategy::Fast, 4, 5, 16, 8),
    lp(Strategy::Fast, 4, 6, 32, 32),
    lp(Strategy::Slow, 4, 4, 16, 16),
    lp(Strategy::Slow, 8, 16, 32, 32),
    lp(Strategy::Slow, 8, 16, 128, 128),
    lp(Strategy::Slow, 8, 32, 128, 256),
    lp(Strategy::Slow, 32, 128, 258, 1024),
    lp(Strategy::Slow, 32, 258, 258, 4096),
];

/// DEFLATE compressor.
///
/// The hash table maps each 3-byte-prefix hash to the most recent position
/// where it occurred; `prev`, indexed by `position & 0x7FFF`, chains back to
/// older occurrences. Positions are absolute input offsets, so a chain walk
/// stops as soon as it steps outside the 32 KiB window.
#[derive(Debug)]
pub struct Deflater {
    level: u8,
    head: Vec<i64>,
    prev: Vec<i64>,
}

impl Deflater {
    /// Create a compressor for the given level (0-9, clamped).
    pub fn new(level: u8) -> Self {
        Self {
            level: level.min(9),
            head: vec![-1; HASH_SIZE],
            prev: vec![-1; WINDOW_SIZE],
        }
    }

    /// Clear the match-finder state for a fresh stream.
    pub fn reset(&mut self) {
        self.head.fill(-1);
        self.prev.fill(-1);
    }

    /// Change the compression level for subsequent streams.
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(9);
    }

    /// The current compression level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Compress `data` into a fresh vector.
    pub fn compress_to_vec(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        self.compress_into(data, &mut out)?;
        Ok(out)
    }

    /// Compress `data`, appending the DEFLATE stream to `out`.
    pub fn compress_into(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let params = LEVELS[usize::from(self.level)];

        // Tiny inputs can never win: a match needs 3 bytes and the tree
        // overhead dwarfs anything shorter than 8.
        if params.strategy == Strategy::Stored || (1..8).contains(&data.len()) {
            return write_stored_stream(data, out);
        }

        let start = out.len();
        self.reset();
        self.emit_compressed(data, out, params)?;

        // Rewind path: matching lost, so truncate and re-emit stored.
        if out.len() - start > stored_stream_len(data.len()) {
            out.truncate(start);
            return write_stored_stream(data, out);
        }
        Ok(())
    }

    fn emit_compressed(
        &mut self,
        data: &[u8],
        out: &mut Vec<u8>,
        params: LevelParams,
    ) -> Result<()> {
        let mut writer = BitWriter::new(out);
        let mut block = BlockBuffer::new();
        let lazy = params.strategy == Strategy::Slow;
        let n = data.len();
        let mut block_start = 0usize;
        let mut pos = 0usize;

        while pos < n {
            let found = self.longest_match(data, pos, &params);
            self.insert(data, pos);

            let accepted = match found {
                Some((len, dist)) => {
                    // Lazy evaluation: if the next position hides a strictly
                    // longer match, emit this byte as a literal and let the
                    // next iteration take that match instead.
                    let defer = lazy
                        && pos + 1 < n
                        && matches!(
                            self.longest_match(data, pos + 1, &params),
                            Some((len2, _)) if len2 > len
                        );
                    if defer {
                        None
                    } else {
                        Some((len, dist))
                    }
                }
                None => None,
            };

            match accepted {
                Some((len, dist)) => {
                    block.push_match(len as u16, dist as u16);
                    if len <= params.max_lazy {
                        for i in pos + 1..pos + len {
                            self.insert(data, i);
                        }
                    }
                    pos += len;
                }
                None => {
                    block.push_literal(data[pos]);
                    pos += 1;
                }
            }

            if block.is_full() {
                write_block(&mut writer, &block, &data[block_start..pos], false)?;
                block.clear();
                block_start = pos;
            }
        }

        write_block(&mut writer, &block, &data[block_start..n], true)?;
        writer.flush()
    }

    /// Walk the hash chain at `pos` looking for the longest prior match.
    fn longest_match(&self, data: &[u8], pos: usize, params: &LevelParams) -> Option<(usize, usize)> {
        let n = data.len();
        if pos + MIN_MATCH > n {
            return None;
        }
        let max_len = (n - pos).min(MAX_MATCH);
        let floor = pos.saturating_sub(WINDOW_SIZE);

        let mut cand = self.head[hash3(data[pos], data[pos + 1], data[pos + 2])];
        let mut best_len = MIN_MATCH - 1;
        let mut best_dist = 0usize;
        let mut steps = 0usize;

        while cand >= 0 {
            let c = cand as usize;
            if c < floor || c >= pos {
                break;
            }
            // Quick reject: a candidate can only improve on the best match if
            // it agrees at the byte just past the current best length.
            if data[c + best_len] == data[pos + best_len] && data[c] == data[pos] {
                let mut len = 0;
                while len < max_len && data[c + len] == data[pos + len] {
                    len += 1;
                }
                if len > best_len {
                    best_len = len;
                    best_dist = pos - c;
                    if len >= params.nice_len || len >= max_len {
                        break;
                    }
                }
            }

            steps += 1;
            let limit = if best_len >= params.good_len {
                (params.max_chain / 4).max(1)
            } else {
                params.max_chain
            };
            if steps >= limit {
                break;
            }
            let next = self.prev[c & (WINDOW_SIZE - 1)];
            // A slot reused by a newer position means the chain left the
            // window; stop rather than walk forward.
            if next < 0 || next as usize >= c {
                break;
            }
            cand = next;
        }

        if best_len < MIN_MATCH {
            return None;
        }
        if best_len == MIN_MATCH && best_dist > TOO_FAR {
            return None;
        }
        Some((best_len, best_dist))
    }

    #[inline]
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let h = hash3(data[pos], data[pos + 1], data[pos + 2]);
        self.prev[pos & (WINDOW_SIZE - 1)] = self.head[h];
        self.head[h] = pos as i64;
    }
}

impl Compressor for Deflater {
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.compress_to_vec(input)
    }

    fn reset(&mut self) {
        Deflater::reset(self);
    }
}

/// Symbol block buffer: tokens plus running frequency and extra-bit tallies.
#[derive(Debug)]
struct BlockBuffer {
    tokens: Vec<Token>,
    lit_freq: [u32; 286],
    dist_freq: [u32; 30],
    extra_bits: u64,
}

impl BlockBuffer {
    fn new() -> Self {
        Self {
            tokens: Vec::with_capacity(BLOCK_TOKENS),
            lit_freq: [0; 286],
            dist_freq: [0; 30],
            extra_bits: 0,
        }
    }

    fn push_literal(&mut self, byte: u8) {
        self.tokens.push(Token::Literal(byte));
        self.lit_freq[usize::from(byte)] += 1;
    }

    fn push_match(&mut self, length: u16, distance: u16) {
        self.tokens.push(Token::Match { length, distance });
        let (lcode, lbits, _) = length_to_code(length);
        let (dcode, dbits, _) = dist_to_code(distance);
        self.lit_freq[lcode as usize] += 1;
        self.dist_freq[dcode as usize] += 1;
        self.extra_bits += u64::from(lbits) + u64::from(dbits);
    }

    fn is_full(&self) -> bool {
        self.tokens.len() >= BLOCK_TOKENS
    }

    fn clear(&mut self) {
        self.tokens.clear();
        self.lit_freq = [0; 286];
        self.dist_freq = [0; 30];
        self.extra_bits = 0;
    }
}

/// Total cost in bits of coding each symbol with the given lengths.
fn sym_cost(freqs: &[u32], lengths: &[u8]) -> u64 {
    freqs
        .iter()
        .zip(lengths)
        .map(|(&f, &l)| u64::from(f) * u64::from(l))
        .sum()
}

fn last_nonzero(lengths: &[u8]) -> usize {
    lengths
        .iter()
        .rposition(|&l| l > 0)
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// HCLEN: code-length code count in transmission order, minimum 4.
fn find_hclen(cl_lengths: &[u8]) -> usize {
    let mut hclen = 4;
    for (i, &slot) in CODE_LENGTH_ORDER.iter().enumerate() {
        if cl_lengths[slot] != 0 {
            hclen = i + 1;
        }
    }
    hclen.max(4)
}

/// Emit one block, choosing the cheapest of stored, static and dynamic.
fn write_block<W: Write>(
    writer: &mut BitWriter<W>,
    block: &BlockBuffer,
    raw: &[u8],
    is_final: bool,
) -> Result<()> {
    // The end-of-block symbol is implicit in the buffer but priced and
    // emitted like any other.
    let mut lit_freq = block.lit_freq;
    lit_freq[256] += 1;

    let lit_lengths = build_code_lengths(&lit_freq, MAX_CODE_BITS);
    let dist_lengths = build_code_lengths(&block.dist_freq, MAX_CODE_BITS);

    let hlit = last_nonzero(&lit_lengths).max(257);
    let hdist = last_nonzero(&dist_lengths).max(1);

    let mut combined = Vec::with_capacity(hlit + hdist);
    combined.extend_from_slice(&lit_lengths[..hlit]);
    combined.extend_from_slice(&dist_lengths[..hdist]);
    let (rle_ops, rle_freq) = rle_encode_lengths(&combined);
    let cl_lengths = build_code_lengths(&rle_freq, MAX_CODELEN_BITS);
    let hclen = find_hclen(&cl_lengths);

    let dynamic_bits = 3
        + 5
        + 5
        + 4
        + 3 * hclen as u64
        + rle_ops
            .iter()
            .map(|op| u64::from(cl_lengths[op.sym as usize]) + u64::from(op.extra_bits))
            .sum::<u64>()
        + sym_cost(&lit_freq, &lit_lengths)
        + sym_cost(&block.dist_freq, &dist_lengths)
        + block.extra_bits;

    let fixed_lit = fixed_litlen_lengths();
    let static_bits = 3
        + sym_cost(&lit_freq, &fixed_lit)
        + u64::from(block.dist_freq.iter().sum::<u32>()) * 5
        + block.extra_bits;

    let compressed_bits = static_bits.min(dynamic_bits);
    let compressed_bytes = compressed_bits.div_ceil(8) as usize;
    let stored_bytes = raw.len() + 5 * raw.len().div_ceil(MAX_STORED).max(1);

    // Stored must be strictly smaller; static wins ties with dynamic.
    if stored_bytes < compressed_bytes {
        return write_stored_chunks(writer, raw, is_final);
    }

    writer.write_bits(u32::from(is_final), 1)?;
    if static_bits <= dynamic_bits {
        writer.write_bits(0b01, 2)?;
        let lit_codes = assign_codes(&fixed_lit)?;
        // All 32 five-bit distance codes participate in the fixed code
        // construction even though 30 and 31 never occur in a stream.
        let fixed_dist = [5u8; 32];
        let dist_codes = assign_codes(&fixed_dist)?;
        write_tokens(writer, block, &lit_codes, &fixed_lit, &dist_codes, &fixed_dist)
    } else {
        writer.write_bits(0b10, 2)?;
        writer.write_bits((hlit - 257) as u32, 5)?;
        writer.write_bits((hdist - 1) as u32, 5)?;
        writer.write_bits((hclen - 4) as u32, 4)?;
        for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
            writer.write_bits(u32::from(cl_lengths[slot]), 3)?;
        }
        let cl_codes = assign_codes(&cl_lengths)?;
        for op in &rle_ops {
            writer.write_bits(
                u32::from(cl_codes[op.sym as usize]),
                cl_lengths[op.sym as usize],
            )?;
            if op.extra_bits > 0 {
                writer.write_bits(u32::from(op.extra), op.extra_bits)?;
            }
        }
        let lit_codes = assign_codes(&lit_lengths)?;
        let dist_codes = assign_codes(&dist_lengths)?;
        write_tokens(writer, block, &lit_codes, &lit_lengths, &dist_codes, &dist_lengths)
    }
}

/// Emit the block body: every token, then end-of-block.
fn write_tokens<W: Write>(
    writer: &mut BitWriter<W>,
    block: &BlockBuffer,
    lit_codes: &[u16],
    lit_lengths: &[u8],
    dist_codes: &[u16],
    dist_lengths: &[u8],
) -> Result<()> {
    for token in &block.tokens {
        match *token {
            Token::Literal(byte) => {
                let s = usize::from(byte);
                writer.write_bits(u32::from(lit_codes[s]), lit_lengths[s])?;
            }
            Token::Match { length, distance } => {
                let (lcode, lbits, lextra) = length_to_code(length);
                let s = lcode as usize;
                writer.write_bits(u32::from(lit_codes[s]), lit_lengths[s])?;
                if lbits > 0 {
                    writer.write_bits(u32::from(lextra), lbits)?;
                }
                let (dcode, dbits, dextra) = dist_to_code(distance);
                let d = dcode as usize;
                writer.write_bits(u32::from(dist_codes[d]), dist_lengths[d])?;
                if dbits > 0 {
                    writer.write_bits(u32::from(dextra), dbits)?;
                }
            }
        }
    }
    writer.write_bits(u32::from(lit_codes[256]), lit_lengths[256])?;
    Ok(())
}

/// Emit `raw` as one or more stored blocks.
fn write_stored_chunks<W: Write>(
    writer: &mut BitWriter<W>,
    raw: &[u8],
    is_final: bool,
) -> Result<()> {
    if raw.is_empty() {
        writer.write_bits(u32::from(is_final), 1)?;
        writer.write_bits(0b00, 2)?;
        writer.align_to_byte()?;
        writer.write_bits(0, 16)?;
        writer.write_bits(0xFFFF, 16)?;
        return Ok(());
    }
    let count = raw.len().div_ceil(MAX_STORED);
    for (i, chunk) in raw.chunks(MAX_STORED).enumerate() {
        let last = i + 1 == count;
        writer.write_bits(u32::from(is_final && last), 1)?;
        writer.write_bits(0b00, 2)?;
        writer.align_to_byte()?;
        writer.write_bits(chunk.len() as u32, 16)?;
        writer.write_bits(u32::from(!(chunk.len() as u16)), 16)?;
        writer.write_bytes(chunk)?;
    }
    Ok(())
}

/// Whole-stream stored output: header + raw bytes, in chunks of 65 535.
fn write_stored_stream(data: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut writer = BitWriter::new(out);
    write_stored_chunks(&mut writer, data, true)?;
    writer.flush()
}

/// Size in bytes of a fully stored stream for `len` input bytes.
fn stored_stream_len(len: usize) -> usize {
    if len == 0 {
        5
    } else {
        len + 5 * len.div_ceil(MAX_STORED)
    }
}

/// Compress `data` at the given level (0-9).
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    Deflater::new(level).compress_to_vec(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::inflate;

    fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                (seed >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_empty_input_static_block() {
        // Final static block holding only the end-of-block symbol: 10 bits.
        let out = deflate(b"", 6).unwrap();
        assert_eq!(out, vec![0x03, 0x00]);
        assert!(inflate(&out).unwrap().is_empty());
    }

    #[test]
    fn test_single_byte_is_stored() {
        // 3 header bits, align, LEN=1, NLEN=!1, payload: 6 bytes total.
        let out = deflate(&[0x41], 6).unwrap();
        assert_eq!(out, vec![0x01, 0x01, 0x00, 0xFE, 0xFF, 0x41]);
        assert_eq!(inflate(&out).unwrap(), [0x41]);
    }

    #[test]
    fn test_short_inputs_stored_all_levels() {
        for len in 1..8usize {
            let data = vec![0x41u8; len];
            for level in 0..=9 {
                let out = deflate(&data, level).unwrap();
                assert_eq!(out.len(), len + 5, "len {len} level {level}");
                assert_eq!(inflate(&out).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_repetitive_input_compresses_hard() {
        let data = vec![b'A'; 1000];
        let out = deflate(&data, 6).unwrap();
        assert!(out.len() < 30, "got {} bytes", out.len());
        assert_eq!(inflate(&out).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_all_levels() {
        let samples: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"a".to_vec(),
            b"The quick brown fox jumps over the lazy dog".to_vec(),
            b"abcabcabcabcabcabcabcabcabcabc".to_vec(),
            vec![0u8; 70000],
            (0u32..40000).map(|i| (i % 253) as u8).collect(),
            pseudo_random(50000, 0xC0FFEE),
        ];

        for data in &samples {
            for level in 0..=9u8 {
                let out = deflate(data, level).unwrap();
                assert_eq!(
                    &inflate(&out).unwrap(),
                    data,
                    "roundtrip failed: level {level}, {} bytes",
                    data.len()
                );
            }
        }
    }

    #[test]
    fn test_stored_fallback_bound() {
        // Incompressible input must stay within the stored-stream bound.
        for len in [1usize, 100, 65535, 65536, 200000] {
            let data = pseudo_random(len, 0xDEAD);
            for level in 0..=9u8 {
                let out = deflate(&data, level).unwrap();
                let bound = len + 5 * len.div_ceil(65535) + 6;
                assert!(
                    out.len() <= bound,
                    "len {len} level {level}: {} > {bound}",
                    out.len()
                );
                assert_eq!(inflate(&out).unwrap(), data);
            }
        }
    }

    #[test]
    fn test_text_uses_matches() {
        let data = b"Hello, Hello, Hello, Hello, Hello!".repeat(20);
        let out = deflate(&data, 9).unwrap();
        assert!(out.len() < data.len() / 4);
        assert_eq!(inflate(&out).unwrap(), data);
    }

    #[test]
    fn test_higher_levels_do_not_regress_much() {
        let data: Vec<u8> = (0..60000u32)
            .map(|i| ((i * 7) % 80 + 32) as u8)
            .collect();
        let fast = deflate(&data, 1).unwrap();
        let best = deflate(&data, 9).unwrap();
        assert!(best.len() <= fast.len());
        assert_eq!(inflate(&fast).unwrap(), data);
        assert_eq!(inflate(&best).unwrap(), data);
    }

    #[test]
    fn test_multi_block_stream() {
        // Enough distinct tokens to roll the 16384-entry block buffer over.
        let data = pseudo_random(120000, 42);
        let out = deflate(&data, 5).unwrap();
        assert_eq!(inflate(&out).unwrap(), data);
    }

    #[test]
    fn test_level_0_stores_in_chunks() {
        let data = vec![0xABu8; 70000];
        let out = deflate(&data, 0).unwrap();
        // Two stored blocks: 65535 + 4465 bytes, 5 bytes overhead each.
        assert_eq!(out.len(), 70000 + 10);
        assert_eq!(inflate(&out).unwrap(), data);
    }

    #[test]
    fn test_window_limits_match_distance() {
        // A repeat 40000 bytes apart is outside the 32 KiB window; the
        // stream must still roundtrip without referencing it.
        let mut data = pseudo_random(1000, 7);
        let gap = pseudo_random(40000, 8);
        data.extend_from_slice(&gap);
        let head = pseudo_random(1000, 7);
        data.extend_from_slice(&head);
        let out = deflate(&data, 9).unwrap();
        assert_eq!(inflate(&out).unwrap(), data);
    }
}
