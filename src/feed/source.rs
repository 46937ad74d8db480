//! Table sources: where a feed's tables are read from.
//!
//! A [`TableSource`] hands out a fresh [`RecordStream`] for every `open` call,
//! so any number of readers can scan the same table concurrently without
//! sharing a cursor. Two implementations are provided:
//!
//! - [`DirectorySource`] - an unpacked feed directory
//! - [`ArchiveSource`] - a zipped feed

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use zip::ZipArchive;

use super::stream::{RecordStream, StreamError};

/// File extensions recognized as tables.
const TABLE_EXTENSIONS: &[&str] = &["txt", "csv"];

/// Upper bound on the buffer reserved from an entry's declared size. Larger
/// entries grow the buffer as they inflate.
const MAX_PREALLOC: u64 = 64 << 20;

/// Errors returned by a [`TableSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The table is not part of the feed. Never fatal to a run.
    #[error("table not found: {0}")]
    NotFound(String),
    /// The feed itself could not be read (unreadable directory, corrupt
    /// archive, I/O failure). Fatal to a run.
    #[error("failed to open {path}: {message}")]
    OpenFailed { path: String, message: String },
    /// The table exists but its header could not be decoded.
    #[error("invalid table {table}: {message}")]
    InvalidTable { table: String, message: String },
}

impl SourceError {
    fn open_failed(path: &Path, err: impl std::fmt::Display) -> Self {
        SourceError::OpenFailed {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    fn from_header(path: &Path, err: StreamError) -> Self {
        match err {
            StreamError::Io { source, .. } => SourceError::open_failed(path, source),
            StreamError::Malformed { table, message, .. } => {
                SourceError::InvalidTable { table, message }
            }
        }
    }
}

/// Access to the named tables of one feed.
pub trait TableSource: Send + Sync {
    /// Open `name` (e.g. `trips.txt`) as an independent stream positioned at
    /// its first data row.
    fn open(&self, name: &str) -> Result<RecordStream, SourceError>;

    /// Whether the feed contains `name`.
    fn exists(&self, name: &str) -> bool;

    /// Names of all tables in the feed.
    fn list(&self) -> BTreeSet<String>;

    /// Human-readable location, used in logs.
    fn location(&self) -> String;
}

/// Open the feed at `path`: a directory or a zip archive.
pub fn open_feed(path: &Path) -> Result<Arc<dyn TableSource>, SourceError> {
    if path.is_dir() {
        Ok(Arc::new(DirectorySource::new(path)?))
    } else {
        Ok(Arc::new(ArchiveSource::new(path)?))
    }
}

fn is_table_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TABLE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Only bare file names address tables; anything with a path component is
/// treated as absent.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Feed stored as a directory of CSV files.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(SourceError::open_failed(&root, "not a directory")),
            Err(err) => Err(SourceError::open_failed(&root, err)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TableSource for DirectorySource {
    fn open(&self, name: &str) -> Result<RecordStream, SourceError> {
        if !is_plain_name(name) {
            return Err(SourceError::NotFound(name.to_string()));
        }
        let path = self.root.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(name.to_string()));
            }
            Err(err) => return Err(SourceError::open_failed(&path, err)),
        };
        RecordStream::new(name, Box::new(BufReader::new(file)))
            .map_err(|err| SourceError::from_header(&path, err))
    }

    fn exists(&self, name: &str) -> bool {
        is_plain_name(name) && self.root.join(name).is_file()
    }

    fn list(&self) -> BTreeSet<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_table_name(name))
            .collect()
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Feed stored as a zip archive.
///
/// The central directory is read once at construction. Every `open` re-opens
/// the archive file and inflates the requested entry into memory, so streams
/// never share a reader.
#[derive(Debug)]
pub struct ArchiveSource {
    path: PathBuf,
    /// Table name -> entry name inside the archive.
    entries: BTreeMap<String, String>,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let archive = Self::open_archive(&path)?;

        let mut entries = BTreeMap::new();
        for entry in archive.file_names() {
            if entry.ends_with('/') || entry.matches('/').count() > 1 {
                continue;
            }
            let base = entry.rsplit('/').next().unwrap_or(entry);
            if is_table_name(base) {
                // Top-level entries win over nested ones with the same name.
                let top_level = !entry.contains('/');
                if top_level || !entries.contains_key(base) {
                    entries.insert(base.to_string(), entry.to_string());
                }
            }
        }

        Ok(Self { path, entries })
    }

    fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, SourceError> {
        let file = File::open(path).map_err(|err| SourceError::open_failed(path, err))?;
        ZipArchive::new(BufReader::new(file)).map_err(|err| SourceError::open_failed(path, err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSource for ArchiveSource {
    fn open(&self, name: &str) -> Result<RecordStream, SourceError> {
        let Some(entry) = self.entries.get(name) else {
            return Err(SourceError::NotFound(name.to_string()));
        };

        let mut archive = Self::open_archive(&self.path)?;
        let mut zipped = archive
            .by_name(entry)
            .map_err(|err| SourceError::open_failed(&self.path, err))?;
        // The declared size comes from the archive and may be corrupt.
        let declared = zipped.size();
        let mut data = Vec::with_capacity(declared.min(MAX_PREALLOC) as usize);
        zipped
            .read_to_end(&mut data)
            .map_err(|err| SourceError::open_failed(&self.path, err))?;
        if data.len() as u64 != declared {
            return Err(SourceError::open_failed(
                &self.path,
                format!("{entry}: declared {declared} bytes, read {}", data.len()),
            ));
        }

        RecordStream::new(name, Box::new(Cursor::new(data)))
            .map_err(|err| SourceError::from_header(&self.path, err))
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn list(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_directory_source_lists_only_tables() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("trips.txt"), "trip_id\nT1\n").unwrap();
        std::fs::write(dir.path().join("extra.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let source = DirectorySource::new(dir.path()).unwrap();
        let names: Vec<_> = source.list().into_iter().collect();
        assert_eq!(names, vec!["extra.csv".to_string(), "trips.txt".to_string()]);
        assert!(source.exists("trips.txt"));
        assert!(!source.exists("routes.txt"));
        assert!(!source.exists("../trips.txt"));
    }

    #[test]
    fn test_directory_source_missing_table() {
        let dir = TempDir::new().unwrap();
        let source = DirectorySource::new(dir.path()).unwrap();
        assert!(matches!(
            source.open("routes.txt"),
            Err(SourceError::NotFound(name)) if name == "routes.txt"
        ));
    }

    #[test]
    fn test_directory_source_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("feed.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            DirectorySource::new(&file),
            Err(SourceError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_independent_streams() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("stops.txt"), "stop_id\nA\nB\n").unwrap();
        let source = DirectorySource::new(dir.path()).unwrap();

        let mut first = source.open("stops.txt").unwrap();
        let mut second = source.open("stops.txt").unwrap();
        assert_eq!(first.next().unwrap().unwrap().get("stop_id"), Some("A"));
        assert_eq!(first.next().unwrap().unwrap().get("stop_id"), Some("B"));
        // The second stream is unaffected by the first one's progress.
        assert_eq!(second.next().unwrap().unwrap().get("stop_id"), Some("A"));
    }

    #[test]
    fn test_archive_source_reads_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.zip");
        write_zip(
            &path,
            &[
                ("trips.txt", "route_id,service_id,trip_id\nR1,S1,T1\n"),
                ("notes.md", "ignored"),
            ],
        );

        let source = ArchiveSource::new(&path).unwrap();
        assert_eq!(
            source.list().into_iter().collect::<Vec<_>>(),
            vec!["trips.txt".to_string()]
        );
        let row = source.open("trips.txt").unwrap().next().unwrap().unwrap();
        assert_eq!(row.get("trip_id"), Some("T1"));
        assert!(matches!(
            source.open("routes.txt"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_archive_source_nested_folder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.zip");
        write_zip(&path, &[("gtfs/stops.txt", "stop_id\nS1\n")]);

        let source = ArchiveSource::new(&path).unwrap();
        assert!(source.exists("stops.txt"));
        let row = source.open("stops.txt").unwrap().next().unwrap().unwrap();
        assert_eq!(row.get("stop_id"), Some("S1"));
    }

    #[test]
    fn test_corrupt_archive_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.zip");
        std::fs::write(&path, b"definitely not a zip file").unwrap();
        assert!(matches!(
            ArchiveSource::new(&path),
            Err(SourceError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_corrupt_entry_size_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.zip");
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let stored =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("stops.txt", stored).unwrap();
        zip.write_all(b"stop_id\nS1\n").unwrap();
        zip.finish().unwrap();

        // Overwrite the uncompressed size in the central directory entry.
        let mut bytes = std::fs::read(&path).unwrap();
        let central = bytes
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let source = ArchiveSource::new(&path).unwrap();
        assert!(source.exists("stops.txt"));
        assert!(matches!(
            source.open("stops.txt"),
            Err(SourceError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_open_feed_picks_source_kind() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("agency.txt"), "agency_name\nX\n").unwrap();
        let source = open_feed(dir.path()).unwrap();
        assert!(source.exists("agency.txt"));

        let path = dir.path().join("feed.zip");
        write_zip(&path, &[("agency.txt", "agency_name\nX\n")]);
        let source = open_feed(&path).unwrap();
        assert!(source.exists("agency.txt"));
    }
}
