//! End-to-end archive scenarios: build, save, reopen, edit, extract.

use ferrozip_archive::ZipArchive;
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn t0() -> SystemTime {
    // 2020-06-15 13:45:22 UTC
    UNIX_EPOCH + Duration::from_secs(1_592_228_722)
}

fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            (seed >> 24) as u8
        })
        .collect()
}

#[test]
fn create_save_reopen_extract() {
    let text = b"The rain in Spain stays mainly in the plain. ".repeat(40);
    let binary = pseudo_random(2000, 0xBEEF);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("docs/readme.txt", &text, t0()).unwrap();
    zip.add_file("blob.bin", &binary, t0()).unwrap();
    zip.add_dir("docs", t0()).unwrap();
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    let names: Vec<&str> = zip.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["blob.bin", "docs/readme.txt", "docs/"]);

    assert_eq!(zip.extract("docs/readme.txt").unwrap(), text);
    assert_eq!(zip.extract("blob.bin").unwrap(), binary);

    // Repetitive text deflates, random bytes fall back to stored.
    assert_eq!(zip.entry_by_name("docs/readme.txt").unwrap().method, 8);
    assert_eq!(zip.entry_by_name("blob.bin").unwrap().method, 0);
}

#[test]
fn empty_file_member_layout() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("e", b"", t0()).unwrap();
    let bytes = zip.save().unwrap().into_inner();

    // local (30 + 1 name + 36 NTFS extra) + empty body
    // + central (46 + 1) + EOCD 22
    assert_eq!(bytes.len(), 67 + 47 + 22);

    let mut zip = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(zip.entries().len(), 1);
    assert_eq!(zip.entries()[0].uncompressed_size, 0);
    assert!(zip.extract("e").unwrap().is_empty());
}

#[test]
fn ntfs_times_roundtrip_exactly() {
    // Half-second fraction survives through the NTFS extra field; the DOS
    // fields keep only 2-second resolution.
    let precise = UNIX_EPOCH + Duration::new(1_592_228_722, 500_000_000);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("stamped.txt", b"payload", precise).unwrap();
    let cursor = zip.save().unwrap();

    let zip = ZipArchive::open(cursor).unwrap();
    let entry = zip.entry_by_name("stamped.txt").unwrap();
    assert_eq!(entry.modified(), precise);

    // DOS encoding: 2020-06-15, 13:45, seconds 22 stored as 11.
    assert_eq!(entry.dos_date >> 9, 2020 - 1980);
    assert_eq!((entry.dos_date >> 5) & 0xF, 6);
    assert_eq!(entry.dos_date & 0x1F, 15);
    assert_eq!(entry.dos_time >> 11, 13);
    assert_eq!((entry.dos_time >> 5) & 0x3F, 45);
    assert_eq!(entry.dos_time & 0x1F, 11);
}

#[test]
fn delete_and_compact() {
    let a = pseudo_random(100, 1);
    let b = pseudo_random(200, 2);
    let c = pseudo_random(300, 3);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("a.bin", &a, t0()).unwrap();
    zip.add_file("b.bin", &b, t0()).unwrap();
    zip.add_file("c.bin", &c, t0()).unwrap();
    let before = zip.save().unwrap().into_inner();

    let mut zip = ZipArchive::open(Cursor::new(before.clone())).unwrap();
    zip.delete("b.bin").unwrap();
    let after = zip.save().unwrap().into_inner();

    // Random data stays stored, so b.bin occupied exactly its local header
    // (30 + 5 + 36) plus 200 body bytes, plus a 51-byte central entry.
    let b_span = 71 + 200;
    let b_central = 46 + 5;
    assert_eq!(after.len(), before.len() - b_span - b_central);
    assert!(!after
        .windows(5)
        .any(|w| w == b"b.bin"));

    let mut zip = ZipArchive::open(Cursor::new(after)).unwrap();
    let names: Vec<&str> = zip.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["a.bin", "c.bin"]);
    assert_eq!(zip.entry_by_name("a.bin").unwrap().header_offset, 0);
    assert_eq!(zip.entry_by_name("c.bin").unwrap().header_offset, 271);
    assert_eq!(zip.extract("a.bin").unwrap(), a);
    assert_eq!(zip.extract("c.bin").unwrap(), c);
}

#[test]
fn delete_first_and_last() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    for (name, seed) in [("one", 10u32), ("two", 11), ("three", 12), ("four", 13)] {
        zip.add_file(name, &pseudo_random(500, seed), t0()).unwrap();
    }
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    zip.delete("four").unwrap();
    zip.delete("one").unwrap();
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    let names: Vec<&str> = zip.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["three", "two"]);
    assert_eq!(zip.extract("two").unwrap(), pseudo_random(500, 11));
    assert_eq!(zip.extract("three").unwrap(), pseudo_random(500, 12));
}

#[test]
fn append_after_reopen_overwrites_old_directory() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("first.txt", b"first member", t0()).unwrap();
    let cursor = zip.save().unwrap();
    let size_one = cursor.get_ref().len();

    let mut zip = ZipArchive::open(cursor).unwrap();
    zip.add_file("second.txt", b"second member", t0()).unwrap();
    let bytes = zip.save().unwrap().into_inner();

    // The new member starts where the old central directory used to be:
    // growth is the member plus one extra central entry, not a stale copy
    // of the old directory.
    let second_span = 30 + "second.txt".len() + 36 + "second member".len();
    let second_central = 46 + "second.txt".len();
    assert_eq!(bytes.len(), size_one + second_span + second_central);

    let mut zip = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(zip.extract("first.txt").unwrap(), b"first member");
    assert_eq!(zip.extract("second.txt").unwrap(), b"second member");
}

#[test]
fn many_members_roundtrip() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    for i in 0..50u32 {
        let data = format!("member number {i} ").repeat(i as usize + 1);
        zip.add_file(&format!("m/{i:03}.txt"), data.as_bytes(), t0())
            .unwrap();
    }
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    assert_eq!(zip.entries().len(), 50);
    for i in 0..50u32 {
        let expect = format!("member number {i} ").repeat(i as usize + 1);
        assert_eq!(
            zip.extract(&format!("m/{i:03}.txt")).unwrap(),
            expect.as_bytes()
        );
    }
}

#[test]
fn streaming_add_produces_identical_archive() {
    let text = b"stream me in, one pass only, stream me in. ".repeat(30);

    let mut buffered = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    buffered.add_file("s.txt", &text, t0()).unwrap();
    let buffered = buffered.save().unwrap().into_inner();

    let mut streamed = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    streamed
        .add_file_from_reader("s.txt", &text[..], t0())
        .unwrap();
    let streamed = streamed.save().unwrap().into_inner();

    // The patched header ends up identical to one written in a single shot.
    assert_eq!(buffered, streamed);
}

#[test]
fn streaming_extract_matches_buffered() {
    let data = pseudo_random(10_000, 21);
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("r.bin", &data, t0()).unwrap();
    zip.add_file("t.txt", b"tiny", t0()).unwrap();
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    for name in ["r.bin", "t.txt"] {
        let buffered = zip.extract(name).unwrap();
        let mut streamed = Vec::new();
        let written = zip.extract_to_writer(name, &mut streamed).unwrap();
        assert_eq!(streamed, buffered, "{name}");
        assert_eq!(written, buffered.len() as u64, "{name}");
    }
}

#[test]
fn cp437_names_survive_roundtrip() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("café/señal.txt", b"ole", t0()).unwrap();
    let cursor = zip.save().unwrap();

    let mut zip = ZipArchive::open(cursor).unwrap();
    assert_eq!(zip.extract("café/señal.txt").unwrap(), b"ole");
}

#[test]
fn unencodable_name_rejected() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    assert!(zip.add_file("emoji\u{1F600}.txt", b"x", t0()).is_err());
}

#[test]
fn corrupted_member_detected() {
    let text = b"some compressible text, repeated a bit, repeated a bit".repeat(5);
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("x.txt", &text, t0()).unwrap();
    let mut bytes = zip.save().unwrap().into_inner();

    // Flip a byte in the member body (past the 71-byte local header).
    bytes[80] ^= 0xFF;
    let mut zip = ZipArchive::open(Cursor::new(bytes)).unwrap();
    assert!(zip.extract("x.txt").is_err());
}

#[test]
fn truncated_archive_rejected() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
    zip.add_file("x", b"data", t0()).unwrap();
    let bytes = zip.save().unwrap().into_inner();

    // Chop off the EOCD record.
    let cut = bytes.len() - 10;
    assert!(ZipArchive::open(Cursor::new(bytes[..cut].to_vec())).is_err());
}
