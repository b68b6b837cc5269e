//! fzip - a ZIP archiver built on the ferrozip DEFLATE engine.

use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use ferrozip_archive::{FileHeader, ZipArchive};
use ferrozip_core::CompressionLevel;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

#[derive(Parser)]
#[command(name = "fzip")]
#[command(version, about = "ZIP archiver built on the ferrozip DEFLATE engine")]
#[command(long_about = "\
fzip creates, lists and extracts ZIP archives using a pure Rust
DEFLATE implementation.

Examples:
  fzip compress backup.zip notes.txt src/
  fzip list backup.zip
  fzip extract backup.zip restored/
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an archive from files and directories
    #[command(alias = "c")]
    Compress {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add
        files: Vec<PathBuf>,

        /// Compression level
        #[arg(short = 'l', long, value_enum, default_value = "normal")]
        compression: LevelArg,

        /// Show each member as it is added
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract an archive into a directory
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(default_value = ".")]
        output: PathBuf,

        /// Show each member as it is extracted
        #[arg(short, long)]
        verbose: bool,
    },

    /// List archive contents
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,
    },
}

/// Compression level names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum LevelArg {
    /// Store without compression
    Store,
    /// Fast compression
    Fast,
    /// Balanced compression (default)
    #[default]
    Normal,
    /// Best compression
    Best,
}

impl From<LevelArg> for CompressionLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Store => CompressionLevel::NONE,
            LevelArg::Fast => CompressionLevel::FAST,
            LevelArg::Normal => CompressionLevel::DEFAULT,
            LevelArg::Best => CompressionLevel::BEST,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Compress {
            archive,
            files,
            compression,
            verbose,
        } => cmd_compress(&archive, &files, compression.into(), verbose),
        Commands::Extract {
            archive,
            output,
            verbose,
        } => cmd_extract(&archive, &output, verbose),
        Commands::List { archive } => cmd_list(&archive),
    };

    if let Err(e) = result {
        eprintln!("fzip: {e}");
        std::process::exit(2);
    }
}

fn cmd_compress(
    archive: &Path,
    files: &[PathBuf],
    level: CompressionLevel,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if files.is_empty() {
        return Err("no input files".into());
    }

    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(archive)?;
    let mut zip = ZipArchive::create(file)?;
    zip.set_level(level);

    for path in files {
        add_path(&mut zip, path, verbose)?;
    }

    let count = zip.entries().len();
    zip.save()?;
    if count == 0 {
        fs::remove_file(archive)?;
        println!("No members added; removed {}", archive.display());
    } else {
        println!("Created {} ({} member(s))", archive.display(), count);
    }
    Ok(())
}

fn add_path(
    zip: &mut ZipArchive<File>,
    path: &Path,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = archive_name(path)?;
    let meta = fs::metadata(path)?;
    let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());

    if meta.is_dir() {
        zip.add_dir(&name, modified)?;
        if verbose {
            println!("  added: {name}/");
        }
        let mut children: Vec<PathBuf> = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        children.sort();
        for child in children {
            add_path(zip, &child, verbose)?;
        }
    } else {
        let source = File::open(path)?;
        zip.add_file_from_reader(&name, source, modified)?;
        if verbose {
            println!("  added: {name} ({} bytes)", meta.len());
        }
    }
    Ok(())
}

/// Derive the archive member name from an input path: relative, forward
/// slashes, no current-directory prefixes.
fn archive_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "cannot archive non-relative path: {}",
                    path.display()
                )
                .into());
            }
        }
    }
    if parts.is_empty() {
        return Err(format!("empty archive name for: {}", path.display()).into());
    }
    Ok(parts.join("/"))
}

fn cmd_extract(
    archive: &Path,
    output: &Path,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::open(file)?;
    let entries: Vec<FileHeader> = zip.entries().to_vec();

    println!("Extracting {} to {}", archive.display(), output.display());
    for entry in &entries {
        let target = output.join(sanitized_path(&entry.name));
        if entry.is_dir {
            fs::create_dir_all(&target)?;
            if verbose {
                println!("  created: {}", entry.name);
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let out = File::create(&target)?;
            let written = zip.extract_to_writer(&entry.name, &out)?;
            out.set_modified(entry.modified())?;
            if verbose {
                println!("  extracted: {} ({} bytes)", entry.name, written);
            }
        }
    }
    println!("Done ({} member(s))", entries.len());
    Ok(())
}

/// Strip path components that would escape the output directory.
fn sanitized_path(name: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        out.push(part);
    }
    out
}

fn cmd_list(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let zip = ZipArchive::open(file)?;

    println!("Archive: {}", archive.display());
    println!("{:>10} {:>10} {:>8}  {:<16} Name", "Size", "Packed", "Method", "Modified");

    let mut total_size = 0u64;
    let mut total_packed = 0u64;
    for entry in zip.entries() {
        let method = match entry.method {
            8 => "deflate",
            _ => "stored",
        };
        let year = 1980 + (entry.dos_date >> 9);
        let month = (entry.dos_date >> 5) & 0xF;
        let day = entry.dos_date & 0x1F;
        let hour = entry.dos_time >> 11;
        let minute = (entry.dos_time >> 5) & 0x3F;
        println!(
            "{:>10} {:>10} {:>8}  {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}  {}",
            entry.uncompressed_size, entry.compressed_size, method, entry.name
        );
        total_size += u64::from(entry.uncompressed_size);
        total_packed += u64::from(entry.compressed_size);
    }

    println!();
    println!(
        "{} member(s), {} bytes ({} packed)",
        zip.entries().len(),
        total_size,
        total_packed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name(Path::new("a/b.txt")).unwrap(), "a/b.txt");
        assert_eq!(archive_name(Path::new("./a/b.txt")).unwrap(), "a/b.txt");
        assert!(archive_name(Path::new("/abs/path")).is_err());
        assert!(archive_name(Path::new("../up")).is_err());
    }

    #[test]
    fn test_sanitized_path() {
        assert_eq!(sanitized_path("a/b.txt"), PathBuf::from("a/b.txt"));
        assert_eq!(sanitized_path("../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(sanitized_path("a//b"), PathBuf::from("a/b"));
    }
}
