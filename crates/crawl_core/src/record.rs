use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A discovered URL waiting in the frontier, with its hop distance from a starter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
}

/// Output unit for one fetched and persisted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub source_url: String,
    pub storage_ref: PathBuf,
    pub size_bytes: u64,
}
