use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crawl_core::{CrawlJob, PageRecord};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage root {} is unusable: {reason}", path.display())]
    OutputDir { path: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Create the storage root if needed and check that pages can be written there.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |reason: String| PersistError::OutputDir {
        path: dir.to_path_buf(),
        reason,
    };
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(unusable("not a directory".to_string())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| unusable(e.to_string()))?;
        }
        Err(err) => return Err(unusable(err.to_string())),
    }
    tempfile::tempfile_in(dir).map_err(|e| unusable(format!("not writable: {e}")))?;
    Ok(())
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        if !self.dir.is_dir() {
            ensure_output_dir(&self.dir)?;
        }

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // `persist` replaces an existing target on every platform tempfile supports.
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

/// Durable home for fetched page content.
pub trait PageStore: Send + Sync {
    fn save(&self, content: &str, source_url: &str) -> Result<PageRecord, PersistError>;
}

/// Stores each page as `{root}/{uuid}.html`.
#[derive(Debug, Clone)]
pub struct FilePageStore {
    writer: AtomicFileWriter,
    extension: String,
}

impl FilePageStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        ensure_output_dir(&root)?;
        Ok(Self {
            writer: AtomicFileWriter::new(root),
            extension: "html".to_string(),
        })
    }

    pub fn for_job(job: &CrawlJob) -> Result<Self, PersistError> {
        Self::new(job.storage_root.clone())
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        self.writer.dir()
    }
}

impl PageStore for FilePageStore {
    fn save(&self, content: &str, source_url: &str) -> Result<PageRecord, PersistError> {
        let filename = unique_filename(&self.extension);
        let storage_ref = self.writer.write(&filename, content)?;
        Ok(PageRecord {
            source_url: source_url.to_string(),
            storage_ref,
            size_bytes: content.len() as u64,
        })
    }
}

/// Random 128-bit name: 32 lowercase hex digits plus the extension.
pub fn unique_filename(extension: &str) -> String {
    let id = Uuid::new_v4().simple();
    if extension.is_empty() {
        id.to_string()
    } else {
        format!("{id}.{extension}")
    }
}
