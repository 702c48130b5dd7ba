//! Storage abstraction shared by the validator, the renamer and the sync engine.
//!
//! Local and remote roots are exposed through the same [`Storage`] trait, so the
//! same validation and planning code runs regardless of which side is the source
//! ("downloading" is "uploading" with the roots swapped). Paths are absolute;
//! a storage does not rebase them.

use std::fs;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::{io_err, StorageError};

/// Buffer size used for content comparison and copying.
const CHUNK: usize = 64 * 1024;

/// One immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

/// The operations the core needs from its environment.
pub trait Storage {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    fn is_dir(&self, path: &Path) -> Result<bool, StorageError>;

    /// Immediate children of `dir`, sorted by name.
    fn list_dir(&self, dir: &Path) -> Result<Vec<Entry>, StorageError>;

    /// Every file below `dir` (recursively, symlinks not followed), sorted.
    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError>;

    fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + 'a>, StorageError>;

    /// Last modification time, when the backend tracks one.
    fn modified(&self, path: &Path) -> Result<Option<SystemTime>, StorageError>;

    /// Size of a file in bytes.
    fn size(&self, path: &Path) -> Result<u64, StorageError>;

    /// Create or truncate `path` with the bytes of `reader`, then stamp it with
    /// `modified` if given. Returns the number of bytes written.
    fn write_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        modified: Option<SystemTime>,
    ) -> Result<u64, StorageError>;

    /// Create a single directory; the parent must exist.
    fn create_dir(&self, path: &Path) -> Result<(), StorageError>;

    fn remove_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> Result<(), StorageError>;

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Cross-storage helpers
// ---------------------------------------------------------------------------

/// Size and modification time of a file, enough to notice that it changed
/// without reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(storage: &dyn Storage, path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            size: storage.size(path)?,
            modified: storage.modified(path)?,
        })
    }
}

/// Byte-for-byte comparison of two files, possibly on different storages.
pub fn contents_equal(
    a_store: &dyn Storage,
    a: &Path,
    b_store: &dyn Storage,
    b: &Path,
) -> Result<bool, StorageError> {
    if a_store.size(a)? != b_store.size(b)? {
        return Ok(false);
    }
    let mut ra = BufReader::with_capacity(CHUNK, a_store.open_read(a)?);
    let mut rb = BufReader::with_capacity(CHUNK, b_store.open_read(b)?);
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];

    loop {
        let na = fill(&mut ra, &mut buf_a).map_err(|e| io_err(a, e))?;
        let nb = fill(&mut rb, &mut buf_b).map_err(|e| io_err(b, e))?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

/// Copy `from` on `src` to `to` on `dst`, preserving the modification time
/// where both sides support it.
pub fn copy_with_metadata(
    src: &dyn Storage,
    from: &Path,
    dst: &dyn Storage,
    to: &Path,
) -> Result<u64, StorageError> {
    let modified = src.modified(from)?;
    let mut reader = src.open_read(from)?;
    let bytes = dst.write_from(to, &mut reader, modified)?;
    tracing::debug!(
        from = %from.display(),
        to = %to.display(),
        bytes,
        "{} -> {}",
        src.name(),
        dst.name()
    );
    Ok(bytes)
}

/// Read until `buf` is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// [`Storage`] over the local filesystem (including network mounts).
#[derive(Debug, Clone)]
pub struct LocalStorage {
    name: String,
}

impl LocalStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new("local")
    }
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn is_dir(&self, path: &Path) -> Result<bool, StorageError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<Entry>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            let is_dir = fs::metadata(&path)
                .map(|m| m.is_dir())
                .map_err(|e| io_err(&path, e))?;
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| StorageError::Walk {
                path: dir.to_path_buf(),
                source: e,
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + 'a>, StorageError> {
        let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
        Ok(Box::new(file))
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>, StorageError> {
        let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
        Ok(meta.modified().ok())
    }

    fn size(&self, path: &Path) -> Result<u64, StorageError> {
        let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
        Ok(meta.len())
    }

    fn write_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        modified: Option<SystemTime>,
    ) -> Result<u64, StorageError> {
        let file = fs::File::create(path).map_err(|e| io_err(path, e))?;
        let mut writer = io::BufWriter::with_capacity(CHUNK, file);
        let written = io::copy(reader, &mut writer).map_err(|e| io_err(path, e))?;
        writer.flush().map_err(|e| io_err(path, e))?;
        drop(writer);

        if let Some(mtime) = modified {
            filetime::set_file_mtime(path, FileTime::from_system_time(mtime))
                .map_err(|e| io_err(path, e))?;
        }
        Ok(written)
    }

    fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
        fs::create_dir(path).map_err(|e| io_err(path, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|e| io_err(path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), StorageError> {
        fs::remove_dir(path).map_err(|e| io_err(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        fs::rename(from, to).map_err(|e| io_err(from, e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
