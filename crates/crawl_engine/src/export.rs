use std::fs;
use std::path::{Path, PathBuf};

use crawl_core::PageRecord;
use serde::{Deserialize, Serialize};

use crate::persist::{AtomicFileWriter, PersistError};

pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("manifest is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk index of a crawl's output, in crawl order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub page_count: usize,
    pub total_bytes: u64,
    pub pages: Vec<PageRecord>,
}

impl Manifest {
    pub fn from_records(records: &[PageRecord]) -> Self {
        Self {
            page_count: records.len(),
            total_bytes: records.iter().map(|r| r.size_bytes).sum(),
            pages: records.to_vec(),
        }
    }
}

/// Write `manifest.json` into `dir`, replacing any previous manifest.
pub fn write_manifest(dir: &Path, records: &[PageRecord]) -> Result<PathBuf, ManifestError> {
    let manifest = Manifest::from_records(records);
    let json = serde_json::to_string_pretty(&manifest)?;
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    Ok(writer.write(MANIFEST_FILENAME, &json)?)
}

pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// A stored page read back for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledDocument {
    pub content: String,
    pub url: String,
}

/// Read every record's stored content, preserving order.
pub fn load_documents(records: &[PageRecord]) -> Result<Vec<CrawledDocument>, PersistError> {
    records
        .iter()
        .map(|record| {
            let content = fs::read_to_string(&record.storage_ref)?;
            Ok(CrawledDocument {
                content,
                url: record.source_url.clone(),
            })
        })
        .collect()
}
