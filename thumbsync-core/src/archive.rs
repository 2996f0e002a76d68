//! Archive access and candidate selection.
//!
//! The pipeline consumes archives through [`ArchiveReader`]: a cheap listing of entries up
//! front, then one entry decompressed at a time when its bytes are actually needed.

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::debug;

/// The only folder (besides the archive root) whose images are considered.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Image extensions accepted as candidates, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Largest decompressed entry the pipeline reads by default (the store's attachment limit).
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to read archive: {0}")]
    Open(String),
    #[error("failed to read archive entry {path}: {message}")]
    Entry { path: String, message: String },
    #[error("archive entry {path} exceeds {limit} bytes (at least {size})")]
    TooLarge { path: String, size: u64, limit: u64 },
}

/// One entry of an archive's directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub index: usize,
    pub path: String,
    pub is_directory: bool,
}

impl ArchiveEntry {
    /// The last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Enumerates archive entries and lazily extracts their contents.
pub trait ArchiveReader {
    fn entries(&self) -> &[ArchiveEntry];

    /// Decompress one entry fully into memory, refusing entries larger than `max_bytes`.
    fn read_entry(&mut self, entry: &ArchiveEntry, max_bytes: u64) -> Result<Vec<u8>, ArchiveError>;
}

/// Zip archive held in memory.
pub struct ZipImageArchive {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<ArchiveEntry>,
}

impl ZipImageArchive {
    /// Parse the central directory and list every entry. Any failure here is fatal for a job.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        let size = bytes.len();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ArchiveError::Open(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| ArchiveError::Open(format!("entry at index {index}: {e}")))?;
            entries.push(ArchiveEntry {
                index,
                path: file.name().to_string(),
                is_directory: file.is_dir(),
            });
        }
        debug!(bytes = size, entries = entries.len(), "Opened zip archive");

        Ok(Self { archive, entries })
    }
}

impl ArchiveReader for ZipImageArchive {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(
        &mut self,
        entry: &ArchiveEntry,
        max_bytes: u64,
    ) -> Result<Vec<u8>, ArchiveError> {
        let entry_error = |message: String| ArchiveError::Entry {
            path: entry.path.clone(),
            message,
        };
        let too_large = |size: u64| ArchiveError::TooLarge {
            path: entry.path.clone(),
            size,
            limit: max_bytes,
        };
        let file = self
            .archive
            .by_index(entry.index)
            .map_err(|e| entry_error(e.to_string()))?;
        if file.size() > max_bytes {
            return Err(too_large(file.size()));
        }

        // The declared size is not trusted: never inflate more than one byte past the cap.
        let mut contents = Vec::new();
        file.take(max_bytes.saturating_add(1))
            .read_to_end(&mut contents)
            .map_err(|e| entry_error(e.to_string()))?;
        if contents.len() as u64 > max_bytes {
            return Err(too_large(contents.len() as u64));
        }
        debug!(path = %entry.path, bytes = contents.len(), "Extracted archive entry");
        Ok(contents)
    }
}

/// Keep image files located at the archive root or directly inside [`THUMBNAIL_DIR`],
/// preserving archive order.
pub fn filter_entries(entries: &[ArchiveEntry]) -> Vec<ArchiveEntry> {
    entries
        .iter()
        .filter(|entry| !entry.is_directory)
        .filter(|entry| has_image_extension(&entry.path))
        .filter(|entry| is_allowed_location(&entry.path))
        .cloned()
        .collect()
}

fn has_image_extension(path: &str) -> bool {
    match path.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn is_allowed_location(path: &str) -> bool {
    match path.split_once('/') {
        None => true,
        Some((dir, rest)) => dir == THUMBNAIL_DIR && !rest.is_empty() && !rest.contains('/'),
    }
}
