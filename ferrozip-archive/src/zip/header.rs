//! ZIP header records (PKWARE APPNOTE 2.0 subset).
//!
//! Three record types make up an archive: a local file header in front of
//! each member's data, one central directory entry per member at the end of
//! the file, and the end-of-central-directory record anchoring the whole
//! structure. Files additionally carry an NTFS extra field on the local
//! header with full-precision timestamps.

use super::time::{filetime_from_system, system_from_dos_datetime, system_from_filetime};
use ferrozip_core::error::{FerrozipError, Result};
use std::io::{Read, Write};
use std::time::SystemTime;

/// Local file header signature ("PK\x03\x04").
pub const LOCAL_HEADER_SIG: u32 = 0x04034B50;

/// Central directory entry signature ("PK\x01\x02").
pub const CENTRAL_HEADER_SIG: u32 = 0x02014B50;

/// End-of-central-directory signature ("PK\x05\x06").
pub const EOCD_SIG: u32 = 0x06054B50;

/// Version needed to extract (2.0: deflate support).
pub const VERSION_NEEDED: u16 = 20;

/// Fixed size of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;

/// Fixed size of a central directory entry.
pub const CENTRAL_HEADER_LEN: usize = 46;

/// Fixed size of the end-of-central-directory record.
pub const EOCD_LEN: usize = 22;

/// NTFS extra field header id.
const NTFS_EXTRA_ID: u16 = 0x000A;

/// Attribute tag carrying the three file times inside the NTFS field.
const NTFS_TIME_TAG: u16 = 0x0001;

/// On-disk size of the NTFS extra field we write.
pub const NTFS_EXTRA_LEN: usize = 36;

/// Full-precision file times from the NTFS extra field, as FILETIMEs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimes {
    /// Last write time.
    pub mtime: u64,
    /// Last access time.
    pub atime: u64,
    /// Creation time.
    pub ctime: u64,
}

impl NtfsTimes {
    /// Times with all three fields set to `t`.
    pub fn all(t: SystemTime) -> Self {
        let ft = filetime_from_system(t);
        Self {
            mtime: ft,
            atime: ft,
            ctime: ft,
        }
    }
}

/// One archive member as tracked by the central directory.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Member name, `/`-separated; directories end in `/`.
    pub name: String,
    /// Whether this entry is a directory path.
    pub is_dir: bool,
    /// Packed DOS modification time.
    pub dos_time: u16,
    /// Packed DOS modification date.
    pub dos_date: u16,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the stored member body.
    pub compressed_size: u32,
    /// Size of the original data.
    pub uncompressed_size: u32,
    /// Compression method: 0 stored, 8 deflate.
    pub method: u16,
    /// General-purpose bit flags.
    pub flags: u16,
    /// Version-made-by field; high byte is the source filesystem (0 = FAT).
    pub version_made_by: u16,
    /// External file attributes (FAT bits in the low byte).
    pub attributes: u32,
    /// Offset of the local header in the archive.
    pub header_offset: u64,
    /// On-disk length of the local header (fixed part + name + extra).
    pub local_header_len: u32,
    /// Full-precision times, when the local header carried them.
    pub ntfs: Option<NtfsTimes>,
}

impl FileHeader {
    /// Modification time: NTFS precision when present, DOS otherwise.
    pub fn modified(&self) -> SystemTime {
        match &self.ntfs {
            Some(t) => system_from_filetime(t.mtime),
            None => system_from_dos_datetime(self.dos_time, self.dos_date),
        }
    }

    /// Bytes this member occupies in the archive: local header plus body.
    pub(crate) fn stored_span(&self) -> u64 {
        u64::from(self.local_header_len) + u64::from(self.compressed_size)
    }
}

/// Serialize the NTFS extra field: header id, size, reserved word, then one
/// attribute (tag 1, 24 bytes) holding mtime/atime/ctime FILETIMEs.
pub(crate) fn build_ntfs_extra(times: &NtfsTimes) -> [u8; NTFS_EXTRA_LEN] {
    let mut out = [0u8; NTFS_EXTRA_LEN];
    out[0..2].copy_from_slice(&NTFS_EXTRA_ID.to_le_bytes());
    out[2..4].copy_from_slice(&32u16.to_le_bytes()); // field data size
    // bytes 4..8: reserved, zero
    out[8..10].copy_from_slice(&NTFS_TIME_TAG.to_le_bytes());
    out[10..12].copy_from_slice(&24u16.to_le_bytes());
    out[12..20].copy_from_slice(&times.mtime.to_le_bytes());
    out[20..28].copy_from_slice(&times.atime.to_le_bytes());
    out[28..36].copy_from_slice(&times.ctime.to_le_bytes());
    out
}

/// Scan an extra-field blob for NTFS times.
pub(crate) fn parse_ntfs_extra(extra: &[u8]) -> Option<NtfsTimes> {
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[offset], extra[offset + 1]]);
        let size = usize::from(u16::from_le_bytes([extra[offset + 2], extra[offset + 3]]));
        offset += 4;
        if offset + size > extra.len() {
            return None;
        }
        if id == NTFS_EXTRA_ID && size >= 4 {
            // Skip the reserved word, then walk attribute tags.
            let field = &extra[offset + 4..offset + size];
            let mut a = 0;
            while a + 4 <= field.len() {
                let tag = u16::from_le_bytes([field[a], field[a + 1]]);
                let len = usize::from(u16::from_le_bytes([field[a + 2], field[a + 3]]));
                a += 4;
                if a + len > field.len() {
                    return None;
                }
                if tag == NTFS_TIME_TAG && len >= 24 {
                    let read_u64 = |s: &[u8]| u64::from_le_bytes(s[..8].try_into().unwrap());
                    return Some(NtfsTimes {
                        mtime: read_u64(&field[a..]),
                        atime: read_u64(&field[a + 8..]),
                        ctime: read_u64(&field[a + 16..]),
                    });
                }
                a += len;
            }
        }
        offset += size;
    }
    None
}

/// Write a local file header. `name_bytes` is the CP437-encoded name.
pub(crate) fn write_local_header<W: Write>(
    w: &mut W,
    h: &FileHeader,
    name_bytes: &[u8],
    extra: &[u8],
) -> Result<()> {
    w.write_all(&LOCAL_HEADER_SIG.to_le_bytes())?;
    w.write_all(&VERSION_NEEDED.to_le_bytes())?;
    w.write_all(&h.flags.to_le_bytes())?;
    w.write_all(&h.method.to_le_bytes())?;
    w.write_all(&h.dos_time.to_le_bytes())?;
    w.write_all(&h.dos_date.to_le_bytes())?;
    w.write_all(&h.crc32.to_le_bytes())?;
    w.write_all(&h.compressed_size.to_le_bytes())?;
    w.write_all(&h.uncompressed_size.to_le_bytes())?;
    w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
    w.write_all(&(extra.len() as u16).to_le_bytes())?;
    w.write_all(name_bytes)?;
    w.write_all(extra)?;
    Ok(())
}

/// Fields of a parsed local header needed for extraction and compaction.
pub(crate) struct LocalHeader {
    pub crc32: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

/// Read and validate the fixed part of a local header.
pub(crate) fn read_local_header<R: Read>(r: &mut R) -> Result<LocalHeader> {
    let mut buf = [0u8; LOCAL_HEADER_LEN];
    r.read_exact(&mut buf)?;
    let sig = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if sig != LOCAL_HEADER_SIG {
        return Err(FerrozipError::signature_mismatch(LOCAL_HEADER_SIG, sig));
    }
    Ok(LocalHeader {
        crc32: u32::from_le_bytes(buf[14..18].try_into().unwrap()),
        name_len: u16::from_le_bytes(buf[26..28].try_into().unwrap()),
        extra_len: u16::from_le_bytes(buf[28..30].try_into().unwrap()),
    })
}

/// Write a central directory entry; extra and comment lengths are zero.
/// Returns the number of bytes written.
pub(crate) fn write_central_entry<W: Write>(
    w: &mut W,
    h: &FileHeader,
    name_bytes: &[u8],
) -> Result<u64> {
    w.write_all(&CENTRAL_HEADER_SIG.to_le_bytes())?;
    w.write_all(&h.version_made_by.to_le_bytes())?;
    w.write_all(&VERSION_NEEDED.to_le_bytes())?;
    w.write_all(&h.flags.to_le_bytes())?;
    w.write_all(&h.method.to_le_bytes())?;
    w.write_all(&h.dos_time.to_le_bytes())?;
    w.write_all(&h.dos_date.to_le_bytes())?;
    w.write_all(&h.crc32.to_le_bytes())?;
    w.write_all(&h.compressed_size.to_le_bytes())?;
    w.write_all(&h.uncompressed_size.to_le_bytes())?;
    w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // extra length
    w.write_all(&0u16.to_le_bytes())?; // comment length
    w.write_all(&0u16.to_le_bytes())?; // disk number start
    w.write_all(&0u16.to_le_bytes())?; // internal attributes
    w.write_all(&h.attributes.to_le_bytes())?;
    w.write_all(&(h.header_offset as u32).to_le_bytes())?;
    w.write_all(name_bytes)?;
    Ok((CENTRAL_HEADER_LEN + name_bytes.len()) as u64)
}

/// A central directory entry as parsed from disk, before the local header
/// has been probed for its on-disk length and NTFS times.
pub(crate) struct CentralEntry {
    pub name_bytes: Vec<u8>,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub method: u16,
    pub flags: u16,
    pub version_made_by: u16,
    pub attributes: u32,
    pub header_offset: u64,
}

/// Read one central directory entry.
pub(crate) fn read_central_entry<R: Read>(r: &mut R) -> Result<CentralEntry> {
    let mut buf = [0u8; CENTRAL_HEADER_LEN];
    r.read_exact(&mut buf)?;
    let sig = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if sig != CENTRAL_HEADER_SIG {
        return Err(FerrozipError::signature_mismatch(CENTRAL_HEADER_SIG, sig));
    }

    let version_made_by = u16::from_le_bytes(buf[4..6].try_into().unwrap());
    let flags = u16::from_le_bytes(buf[8..10].try_into().unwrap());
    let method = u16::from_le_bytes(buf[10..12].try_into().unwrap());
    let dos_time = u16::from_le_bytes(buf[12..14].try_into().unwrap());
    let dos_date = u16::from_le_bytes(buf[14..16].try_into().unwrap());
    let crc32 = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let compressed_size = u32::from_le_bytes(buf[20..24].try_into().unwrap());
    let uncompressed_size = u32::from_le_bytes(buf[24..28].try_into().unwrap());
    let name_len = usize::from(u16::from_le_bytes(buf[28..30].try_into().unwrap()));
    let extra_len = usize::from(u16::from_le_bytes(buf[30..32].try_into().unwrap()));
    let comment_len = usize::from(u16::from_le_bytes(buf[32..34].try_into().unwrap()));
    let mut attributes = u32::from_le_bytes(buf[38..42].try_into().unwrap());
    let header_offset = u64::from(u32::from_le_bytes(buf[42..46].try_into().unwrap()));

    // Attributes from a non-FAT source filesystem are not meaningful here.
    if version_made_by >> 8 != 0 {
        attributes = 0;
    }

    let mut name_bytes = vec![0u8; name_len];
    r.read_exact(&mut name_bytes)?;
    // Foreign extras and comments are read and discarded.
    let mut skip = vec![0u8; extra_len + comment_len];
    r.read_exact(&mut skip)?;

    Ok(CentralEntry {
        name_bytes,
        dos_time,
        dos_date,
        crc32,
        compressed_size,
        uncompressed_size,
        method,
        flags,
        version_made_by,
        attributes,
        header_offset,
    })
}

/// End-of-central-directory fields.
pub(crate) struct Eocd {
    pub entry_count: u16,
    pub dir_size: u32,
    pub dir_offset: u32,
}

/// Write the end-of-central-directory record.
pub(crate) fn write_eocd<W: Write>(w: &mut W, eocd: &Eocd) -> Result<()> {
    w.write_all(&EOCD_SIG.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // this disk
    w.write_all(&0u16.to_le_bytes())?; // directory disk
    w.write_all(&eocd.entry_count.to_le_bytes())?;
    w.write_all(&eocd.entry_count.to_le_bytes())?;
    w.write_all(&eocd.dir_size.to_le_bytes())?;
    w.write_all(&eocd.dir_offset.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // comment length
    Ok(())
}

/// Parse an EOCD record starting at `buf[0]` (signature included).
pub(crate) fn parse_eocd(buf: &[u8]) -> Result<Eocd> {
    if buf.len() < EOCD_LEN {
        return Err(FerrozipError::NoCentralDirectory);
    }
    let this_disk = u16::from_le_bytes(buf[4..6].try_into().unwrap());
    let dir_disk = u16::from_le_bytes(buf[6..8].try_into().unwrap());
    if this_disk != 0 || dir_disk != 0 {
        return Err(FerrozipError::MultiDiskUnsupported);
    }
    let disk_entries = u16::from_le_bytes(buf[8..10].try_into().unwrap());
    let entry_count = u16::from_le_bytes(buf[10..12].try_into().unwrap());
    if disk_entries != entry_count {
        return Err(FerrozipError::NoCentralDirectory);
    }
    let dir_size = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let dir_offset = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    if dir_size == 0 || dir_offset == 0 {
        return Err(FerrozipError::EmptyCentralDirectory);
    }
    Ok(Eocd {
        entry_count,
        dir_size,
        dir_offset,
    })
}
