//! The ZIP central-directory engine.
//!
//! One [`ZipArchive`] owns the archive handle for a whole session. Opening
//! parses the central directory and remembers where it started; members
//! added afterwards overwrite the old directory bytes, and `save` writes a
//! fresh directory at the end. Deleting marks the in-memory list dirty and
//! `save` compacts the data region, sliding surviving members left through
//! a bounce buffer.
//!
//! The in-memory directory is kept ordered: directory entries sort after
//! plain files, then lexicographically by name. A second, by-offset order
//! is derived where the on-disk layout matters (compaction and directory
//! writing).

use super::cp437;
use super::header::{
    build_ntfs_extra, parse_ntfs_extra, read_central_entry, read_local_header, write_central_entry,
    write_eocd, write_local_header, Eocd, FileHeader, NtfsTimes, EOCD_SIG, LOCAL_HEADER_LEN,
    VERSION_NEEDED,
};
use ferrozip_core::checksum::{Crc32, CrcReader, CrcWriter};
use ferrozip_core::error::{ChecksumKind, FerrozipError, Result};
use ferrozip_core::traits::CompressionLevel;
use ferrozip_deflate::{inflate, inflate_to_writer, Deflater};
use std::cmp::Ordering;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

/// How many trailing bytes are scanned for the end-of-central-directory
/// signature.
const EOCD_SCAN_LEN: u64 = 512;

/// Bounce buffer size used when sliding members during compaction.
const BOUNCE_LEN: usize = 64 * 1024;

/// Compression methods this engine reads and writes.
const METHOD_STORED: u16 = 0;
/// DEFLATE method id.
const METHOD_DEFLATE: u16 = 8;

/// FAT attribute bits.
const ATTR_DIRECTORY: u32 = 0x10;
const ATTR_ARCHIVE: u32 = 0x20;

/// Truncation support for archive handles.
///
/// `Seek + Write` cannot shrink a file, but compaction and directory
/// rewrites must. Implemented for the two handle types archives live in:
/// real files and in-memory buffers.
pub trait SetLen {
    /// Truncate (or extend) the handle to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> std::io::Result<()>;
}

impl SetLen for std::fs::File {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        std::fs::File::set_len(self, len)
    }
}

impl SetLen for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// An open ZIP archive session.
///
/// The embedded [`Deflater`] and its hash tables are reused across every
/// member added in the session.
#[derive(Debug)]
pub struct ZipArchive<F> {
    file: F,
    entries: Vec<FileHeader>,
    /// Where the next member (or the directory, at save time) gets written.
    write_pos: u64,
    /// Set once any entry has been deleted; forces compaction on save.
    deleted: bool,
    deflater: Deflater,
}

/// Directory order: paths after plain files, then by name.
fn entry_order(a: &FileHeader, b: &FileHeader) -> Ordering {
    a.is_dir
        .cmp(&b.is_dir)
        .then_with(|| a.name.as_str().cmp(b.name.as_str()))
}

impl<F> ZipArchive<F> {
    /// The directory, in its canonical order.
    pub fn entries(&self) -> &[FileHeader] {
        &self.entries
    }

    /// Look up a member by its archive name.
    pub fn entry_by_name(&self, name: &str) -> Option<&FileHeader> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Set the compression level used by subsequent [`ZipArchive::add_file`]
    /// calls.
    pub fn set_level(&mut self, level: CompressionLevel) {
        self.deflater.set_level(level.level());
    }

    fn insert_entry(&mut self, header: FileHeader) -> Result<()> {
        match self
            .entries
            .binary_search_by(|e| entry_order(e, &header))
        {
            Ok(_) => Err(FerrozipError::duplicate_entry(header.name)),
            Err(idx) => {
                self.entries.insert(idx, header);
                Ok(())
            }
        }
    }
}

impl<F: Read + Seek> ZipArchive<F> {
    /// Open an existing archive.
    ///
    /// The end-of-central-directory record is located by scanning the last
    /// 512 bytes (or the whole file, if shorter) backwards for its
    /// signature. The central directory is parsed into memory and each
    /// member's local header is probed for its on-disk length and NTFS
    /// times. New data written afterwards lands where the old directory
    /// started; the directory itself is rewritten on save.
    pub fn open(mut file: F) -> Result<Self> {
        let file_len = file.seek(SeekFrom::End(0))?;
        let scan = file_len.min(EOCD_SCAN_LEN);
        file.seek(SeekFrom::Start(file_len - scan))?;
        let mut tail = vec![0u8; scan as usize];
        file.read_exact(&mut tail)?;

        let sig = EOCD_SIG.to_le_bytes();
        let at = tail
            .windows(4)
            .rposition(|w| w == sig)
            .ok_or(FerrozipError::NoCentralDirectory)?;
        let eocd = super::header::parse_eocd(&tail[at..])?;

        file.seek(SeekFrom::Start(u64::from(eocd.dir_offset)))?;
        let mut entries = Vec::with_capacity(usize::from(eocd.entry_count));
        for _ in 0..eocd.entry_count {
            let central = read_central_entry(&mut file)?;
            let after = file.stream_position()?;

            // Probe the local header: its name/extra lengths give the
            // member's on-disk span, and the extra carries the NTFS times.
            file.seek(SeekFrom::Start(central.header_offset))?;
            let local = read_local_header(&mut file)?;
            file.seek(SeekFrom::Current(i64::from(local.name_len)))?;
            let mut extra = vec![0u8; usize::from(local.extra_len)];
            file.read_exact(&mut extra)?;
            let ntfs = parse_ntfs_extra(&extra);
            file.seek(SeekFrom::Start(after))?;

            let name = cp437::decode(&central.name_bytes);
            let is_dir = name.ends_with('/');
            entries.push(FileHeader {
                name,
                is_dir,
                dos_time: central.dos_time,
                dos_date: central.dos_date,
                crc32: central.crc32,
                compressed_size: central.compressed_size,
                uncompressed_size: central.uncompressed_size,
                method: central.method,
                flags: central.flags,
                version_made_by: central.version_made_by,
                attributes: central.attributes,
                header_offset: central.header_offset,
                local_header_len: (LOCAL_HEADER_LEN
                    + usize::from(local.name_len)
                    + usize::from(local.extra_len)) as u32,
                ntfs,
            });
        }
        entries.sort_by(entry_order);

        Ok(Self {
            file,
            entries,
            write_pos: u64::from(eocd.dir_offset),
            deleted: false,
            deflater: Deflater::new(CompressionLevel::default().level()),
        })
    }

    /// Extract a member by name.
    pub fn extract(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry_by_name(name)
            .cloned()
            .ok_or_else(|| FerrozipError::entry_not_found(name))?;
        self.extract_entry(&entry)
    }

    /// Extract a member. Directories yield no bytes.
    ///
    /// The local header signature is validated and its CRC-32 cross-checked
    /// against the directory entry; the remaining local fields are read and
    /// ignored (the central directory is authoritative). The decompressed
    /// data is CRC-verified before being returned.
    pub fn extract_entry(&mut self, entry: &FileHeader) -> Result<Vec<u8>> {
        if entry.is_dir {
            return Ok(Vec::new());
        }
        self.seek_to_member_body(entry)?;

        let mut body = vec![0u8; entry.compressed_size as usize];
        self.file.read_exact(&mut body)?;

        let data = match entry.method {
            METHOD_STORED => body,
            METHOD_DEFLATE => inflate(&body)?,
            method => return Err(FerrozipError::UnsupportedMethod { method }),
        };

        let computed = Crc32::compute(&data);
        if computed != entry.crc32 {
            return Err(FerrozipError::checksum_mismatch(
                ChecksumKind::Crc32,
                entry.crc32,
                computed,
            ));
        }
        Ok(data)
    }

    /// Extract a member by name, streaming it into `sink`.
    ///
    /// The member body flows through the decoder straight into a
    /// checksumming writer, so nothing is buffered beyond the codec's own
    /// window. Returns the number of bytes produced.
    pub fn extract_to_writer<W: Write>(&mut self, name: &str, sink: W) -> Result<u64> {
        let entry = self
            .entry_by_name(name)
            .cloned()
            .ok_or_else(|| FerrozipError::entry_not_found(name))?;
        if entry.is_dir {
            return Ok(0);
        }
        self.seek_to_member_body(&entry)?;

        let mut out = CrcWriter::new(sink);
        let body = (&mut self.file).take(u64::from(entry.compressed_size));
        let produced = match entry.method {
            METHOD_STORED => {
                let mut body = body;
                std::io::copy(&mut body, &mut out)?
            }
            METHOD_DEFLATE => inflate_to_writer(body, &mut out)?,
            method => return Err(FerrozipError::UnsupportedMethod { method }),
        };

        if out.crc() != entry.crc32 {
            return Err(FerrozipError::checksum_mismatch(
                ChecksumKind::Crc32,
                entry.crc32,
                out.crc(),
            ));
        }
        Ok(produced)
    }

    /// Validate the local header against the directory entry and leave the
    /// stream positioned at the member body.
    fn seek_to_member_body(&mut self, entry: &FileHeader) -> Result<()> {
        self.file.seek(SeekFrom::Start(entry.header_offset))?;
        let local = read_local_header(&mut self.file)?;
        if local.crc32 != entry.crc32 {
            return Err(FerrozipError::checksum_mismatch(
                ChecksumKind::Crc32,
                entry.crc32,
                local.crc32,
            ));
        }
        self.file.seek(SeekFrom::Current(
            i64::from(local.name_len) + i64::from(local.extra_len),
        ))?;
        Ok(())
    }
}

impl<F: Read + Write + Seek + SetLen> ZipArchive<F> {
    /// Create a new empty archive on `file`, truncating it.
    pub fn create(mut file: F) -> Result<Self> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file,
            entries: Vec::new(),
            write_pos: 0,
            deleted: false,
            deflater: Deflater::new(CompressionLevel::default().level()),
        })
    }

    /// Add a file member with the given modification time.
    ///
    /// The data is compressed at the session level; if deflate fails to
    /// shrink it, the member is stored raw with method 0. The name must be
    /// a relative, CP437-encodable `/`-separated path.
    pub fn add_file(&mut self, name: &str, data: &[u8], modified: SystemTime) -> Result<()> {
        let name = validate_name(name, false)?;
        let name_bytes =
            cp437::encode(&name).ok_or_else(|| FerrozipError::invalid_path(&name))?;
        if data.len() as u64 > u64::from(u32::MAX) {
            return Err(FerrozipError::FileTooLarge {
                size: data.len() as u64,
            });
        }
        if self
            .entries
            .binary_search_by(|e| {
                e.is_dir
                    .cmp(&false)
                    .then_with(|| e.name.as_str().cmp(&name))
            })
            .is_ok()
        {
            return Err(FerrozipError::duplicate_entry(name));
        }

        let crc32 = Crc32::compute(data);
        let compressed = self.deflater.compress_to_vec(data)?;
        let (method, body): (u16, &[u8]) = if compressed.len() < data.len() {
            (METHOD_DEFLATE, &compressed)
        } else {
            (METHOD_STORED, data)
        };
        if body.len() as u64 > u64::from(u32::MAX) {
            return Err(FerrozipError::FileTooLarge {
                size: body.len() as u64,
            });
        }

        let ntfs = NtfsTimes::all(modified);
        let extra = build_ntfs_extra(&ntfs);
        let (dos_time, dos_date) = super::time::dos_datetime_from_system(modified);

        let header = FileHeader {
            name,
            is_dir: false,
            dos_time,
            dos_date,
            crc32,
            compressed_size: body.len() as u32,
            uncompressed_size: data.len() as u32,
            method,
            flags: 0,
            version_made_by: VERSION_NEEDED,
            attributes: ATTR_ARCHIVE,
            header_offset: self.write_pos,
            local_header_len: (LOCAL_HEADER_LEN + name_bytes.len() + extra.len()) as u32,
            ntfs: Some(ntfs),
        };

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        write_local_header(&mut self.file, &header, &name_bytes, &extra)?;
        self.file.write_all(body)?;
        self.write_pos += header.stored_span();
        self.insert_entry(header)
    }

    /// Add a file member, streaming the data from `reader`.
    ///
    /// The local header goes out first with zeroed CRC, size and method
    /// fields; once the body has landed, those fields are rewritten in
    /// place at their fixed offsets. The CRC comes from a checksumming
    /// reader wrapped around the source, so the data is only traversed
    /// once on its way in.
    pub fn add_file_from_reader<R: Read>(
        &mut self,
        name: &str,
        reader: R,
        modified: SystemTime,
    ) -> Result<()> {
        let name = validate_name(name, false)?;
        let name_bytes =
            cp437::encode(&name).ok_or_else(|| FerrozipError::invalid_path(&name))?;
        if self
            .entries
            .binary_search_by(|e| {
                e.is_dir
                    .cmp(&false)
                    .then_with(|| e.name.as_str().cmp(&name))
            })
            .is_ok()
        {
            return Err(FerrozipError::duplicate_entry(name));
        }

        let mut source = CrcReader::new(reader);
        let mut data = Vec::new();
        source
            .by_ref()
            .take(u64::from(u32::MAX) + 1)
            .read_to_end(&mut data)?;
        if data.len() as u64 > u64::from(u32::MAX) {
            return Err(FerrozipError::FileTooLarge {
                size: data.len() as u64,
            });
        }
        let crc32 = source.crc();

        let ntfs = NtfsTimes::all(modified);
        let extra = build_ntfs_extra(&ntfs);
        let (dos_time, dos_date) = super::time::dos_datetime_from_system(modified);

        let mut header = FileHeader {
            name,
            is_dir: false,
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            method: METHOD_DEFLATE,
            flags: 0,
            version_made_by: VERSION_NEEDED,
            attributes: ATTR_ARCHIVE,
            header_offset: self.write_pos,
            local_header_len: (LOCAL_HEADER_LEN + name_bytes.len() + extra.len()) as u32,
            ntfs: Some(ntfs),
        };

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        write_local_header(&mut self.file, &header, &name_bytes, &extra)?;

        let compressed = self.deflater.compress_to_vec(&data)?;
        let (method, body): (u16, &[u8]) = if compressed.len() < data.len() {
            (METHOD_DEFLATE, &compressed)
        } else {
            (METHOD_STORED, &data)
        };
        self.file.write_all(body)?;

        header.method = method;
        header.crc32 = crc32;
        header.compressed_size = body.len() as u32;
        header.uncompressed_size = data.len() as u32;

        // Patch the fields that were unknown when the header went out:
        // method at +8, then CRC and both sizes as one 12-byte run at +14.
        let base = header.header_offset;
        self.file.seek(SeekFrom::Start(base + 8))?;
        self.file.write_all(&header.method.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(base + 14))?;
        self.file.write_all(&header.crc32.to_le_bytes())?;
        self.file.write_all(&header.compressed_size.to_le_bytes())?;
        self.file.write_all(&header.uncompressed_size.to_le_bytes())?;

        self.write_pos += header.stored_span();
        self.insert_entry(header)
    }

    /// Add a directory member. The stored name gains a trailing `/` and the
    /// entry carries no body and no extra field.
    pub fn add_dir(&mut self, name: &str, modified: SystemTime) -> Result<()> {
        let name = validate_name(name, true)?;
        let name_bytes =
            cp437::encode(&name).ok_or_else(|| FerrozipError::invalid_path(&name))?;
        let (dos_time, dos_date) = super::time::dos_datetime_from_system(modified);

        let header = FileHeader {
            name,
            is_dir: true,
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            method: METHOD_STORED,
            flags: 0,
            version_made_by: VERSION_NEEDED,
            attributes: ATTR_DIRECTORY,
            header_offset: self.write_pos,
            local_header_len: (LOCAL_HEADER_LEN + name_bytes.len()) as u32,
            ntfs: None,
        };

        if self
            .entries
            .binary_search_by(|e| entry_order(e, &header))
            .is_ok()
        {
            return Err(FerrozipError::duplicate_entry(header.name));
        }

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        write_local_header(&mut self.file, &header, &name_bytes, &[])?;
        self.write_pos += header.stored_span();
        self.insert_entry(header)
    }

    /// Remove a member from the directory. The bytes leave the file when
    /// the archive is saved.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| FerrozipError::entry_not_found(name))?;
        self.entries.remove(idx);
        self.deleted = true;
        Ok(())
    }

    /// Write the central directory and finish the session, returning the
    /// handle.
    ///
    /// An empty directory truncates the archive to nothing. If members were
    /// deleted, survivors are first compacted down over the holes.
    pub fn save(mut self) -> Result<F> {
        if self.entries.is_empty() {
            self.file.set_len(0)?;
            self.file.flush()?;
            return Ok(self.file);
        }

        if self.deleted {
            self.compact()?;
        }

        let dir_start = self.write_pos;
        self.file.seek(SeekFrom::Start(dir_start))?;

        // The directory goes out in on-disk order.
        let mut by_offset: Vec<usize> = (0..self.entries.len()).collect();
        by_offset.sort_by_key(|&i| self.entries[i].header_offset);

        let mut dir_size = 0u64;
        for idx in by_offset {
            let entry = &self.entries[idx];
            let name_bytes = cp437::encode(&entry.name)
                .ok_or_else(|| FerrozipError::invalid_path(&entry.name))?;
            dir_size += write_central_entry(&mut self.file, entry, &name_bytes)?;
        }

        write_eocd(
            &mut self.file,
            &Eocd {
                entry_count: self.entries.len() as u16,
                dir_size: dir_size as u32,
                dir_offset: dir_start as u32,
            },
        )?;

        let end = self.file.stream_position()?;
        self.file.set_len(end)?;
        self.file.flush()?;
        Ok(self.file)
    }

    /// Slide surviving members left over deleted ones, updating offsets.
    fn compact(&mut self) -> Result<()> {
        let mut by_offset: Vec<usize> = (0..self.entries.len()).collect();
        by_offset.sort_by_key(|&i| self.entries[i].header_offset);

        let mut bounce = vec![0u8; BOUNCE_LEN];
        let mut cursor = 0u64;
        for idx in by_offset {
            let span = self.entries[idx].stored_span();
            let src = self.entries[idx].header_offset;
            if src != cursor {
                self.copy_region(src, cursor, span, &mut bounce)?;
                self.entries[idx].header_offset = cursor;
            }
            cursor += span;
        }
        self.write_pos = cursor;
        self.deleted = false;
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dst` through the bounce buffer.
    /// Compaction only ever moves data towards the front, so a forward
    /// chunked copy never overwrites unread source bytes.
    fn copy_region(&mut self, mut src: u64, mut dst: u64, mut len: u64, buf: &mut [u8]) -> Result<()> {
        debug_assert!(dst < src);
        while len > 0 {
            let n = (buf.len() as u64).min(len) as usize;
            self.file.seek(SeekFrom::Start(src))?;
            self.file.read_exact(&mut buf[..n])?;
            self.file.seek(SeekFrom::Start(dst))?;
            self.file.write_all(&buf[..n])?;
            src += n as u64;
            dst += n as u64;
            len -= n as u64;
        }
        Ok(())
    }
}

/// Check and normalize an archive member name.
///
/// Rejected: empty names, absolute paths, drive letters, backslashes, `.`
/// and `..` components. Directory names gain a trailing `/`.
fn validate_name(name: &str, is_dir: bool) -> Result<String> {
    let trimmed = name.strip_suffix('/').unwrap_or(name);
    if trimmed.is_empty() {
        return Err(FerrozipError::invalid_path(name));
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err(FerrozipError::invalid_path(name));
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' {
        return Err(FerrozipError::invalid_path(name));
    }
    if trimmed.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(FerrozipError::invalid_path(name));
    }
    Ok(if is_dir {
        format!("{trimmed}/")
    } else {
        trimmed.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn t0() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_592_228_722)
    }

    fn new_archive() -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::create(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("a/b.txt", false).unwrap(), "a/b.txt");
        assert_eq!(validate_name("a/b", true).unwrap(), "a/b/");
        assert_eq!(validate_name("a/b/", true).unwrap(), "a/b/");
        assert!(validate_name("/etc/passwd", false).is_err());
        assert!(validate_name("C:/temp", false).is_err());
        assert!(validate_name("a\\b", false).is_err());
        assert!(validate_name("a/../b", false).is_err());
        assert!(validate_name("./a", false).is_err());
        assert!(validate_name("", false).is_err());
    }

    #[test]
    fn test_entry_ordering_paths_after_files() {
        let mut zip = new_archive();
        zip.add_dir("sub", t0()).unwrap();
        zip.add_file("zzz.txt", b"z", t0()).unwrap();
        zip.add_file("aaa.txt", b"a", t0()).unwrap();

        let names: Vec<&str> = zip.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["aaa.txt", "zzz.txt", "sub/"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut zip = new_archive();
        zip.add_file("same.txt", b"one", t0()).unwrap();
        assert!(matches!(
            zip.add_file("same.txt", b"two", t0()),
            Err(FerrozipError::DuplicateEntry { .. })
        ));
        zip.add_dir("same.txt.d", t0()).unwrap();
        assert!(matches!(
            zip.add_dir("same.txt.d", t0()),
            Err(FerrozipError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_extract_before_save() {
        let mut zip = new_archive();
        let data = b"the rain in spain stays mainly in the plain".repeat(10);
        zip.add_file("rain.txt", &data, t0()).unwrap();
        assert_eq!(zip.extract("rain.txt").unwrap(), data);
    }

    #[test]
    fn test_extract_missing_entry() {
        let mut zip = new_archive();
        zip.add_file("a", b"a", t0()).unwrap();
        assert!(matches!(
            zip.extract("b"),
            Err(FerrozipError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let data = vec![0u8; 100];
        assert!(matches!(
            ZipArchive::open(Cursor::new(data)),
            Err(FerrozipError::NoCentralDirectory)
        ));
    }

    #[test]
    fn test_save_empty_truncates() {
        let zip = new_archive();
        let cursor = zip.save().unwrap();
        assert!(cursor.into_inner().is_empty());
    }

    #[test]
    fn test_delete_then_save_empty() {
        let mut zip = new_archive();
        zip.add_file("only.txt", b"data", t0()).unwrap();
        zip.delete("only.txt").unwrap();
        let cursor = zip.save().unwrap();
        assert!(cursor.into_inner().is_empty());
    }
}
