//! Temp storage for file parts.
//!
//! The parser only needs a byte sink per file part: [`TempStorage::create`] opens it,
//! [`PartSink::write_all`] appends, [`PartSink::finish`] closes it into a [`StoredFile`] and
//! [`PartSink::discard`] closes and deletes it.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

use crate::multipart::PartInfo;

pub trait TempStorage: Send + Sync + fmt::Debug {
    fn create(&self, part: &PartInfo) -> io::Result<Box<dyn PartSink>>;
}

pub trait PartSink: Send + Sync + fmt::Debug {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn finish(self: Box<Self>) -> io::Result<StoredFile>;

    fn discard(self: Box<Self>) -> io::Result<()>;

    fn path(&self) -> &Path;
}

/// Stores file parts as `upload-*` files in a directory.
#[derive(Debug, Clone)]
pub struct TempDirStorage {
    dir: PathBuf,
}

impl TempDirStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for TempDirStorage {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl TempStorage for TempDirStorage {
    fn create(&self, _part: &PartInfo) -> io::Result<Box<dyn PartSink>> {
        let file = tempfile::Builder::new().prefix("upload-").tempfile_in(&self.dir)?;
        Ok(Box::new(TempFileSink { file }))
    }
}

#[derive(Debug)]
struct TempFileSink {
    file: NamedTempFile,
}

impl PartSink for TempFileSink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.as_file_mut().write_all(buf)
    }

    fn finish(mut self: Box<Self>) -> io::Result<StoredFile> {
        self.file.as_file_mut().flush()?;
        Ok(StoredFile::new(self.file.into_temp_path()))
    }

    fn discard(self: Box<Self>) -> io::Result<()> {
        self.file.close()
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

/// A completely received file part.
///
/// The backing file is deleted when this value is dropped unless it was persisted.
#[derive(Debug)]
pub struct StoredFile {
    path: TempPath,
}

impl StoredFile {
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Moves the file to `target` and keeps it.
    pub fn persist(self, target: impl AsRef<Path>) -> io::Result<()> {
        self.path.persist(target).map_err(|e| e.error)
    }

    /// Copies the content to `target`; the temp file is still removed on drop.
    pub fn copy_to(&self, target: impl AsRef<Path>) -> io::Result<u64> {
        std::fs::copy(&self.path, target)
    }
}
