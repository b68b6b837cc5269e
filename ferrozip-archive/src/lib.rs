//! # Ferrozip Archive
//!
//! ZIP container support built on the ferrozip DEFLATE engine.
//!
//! ## Example
//!
//! ```rust
//! use ferrozip_archive::ZipArchive;
//! use std::io::Cursor;
//! use std::time::SystemTime;
//!
//! let mut zip = ZipArchive::create(Cursor::new(Vec::new())).unwrap();
//! zip.add_file("hello.txt", b"hello world", SystemTime::now()).unwrap();
//! let cursor = zip.save().unwrap();
//!
//! let mut zip = ZipArchive::open(cursor).unwrap();
//! assert_eq!(zip.extract("hello.txt").unwrap(), b"hello world");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod zip;

pub use zip::{FileHeader, NtfsTimes, SetLen, ZipArchive};
