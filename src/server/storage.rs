//! Server-side document storage.
//!
//! The shared document lives in one JSON file:
//! ```text
//! <DATA_DIR>/
//!   document.json
//! ```
//!
//! Writes replace the whole file through a temp file + rename, and the
//! in-memory copy only changes once the file is on disk.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use todoosh_core::RemoteDocument;

const DOCUMENT_FILE: &str = "document.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// The stored file is not a JSON object.
    ParseError(PathBuf, serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StorageError::ParseError(path, e) => {
                write!(f, "Failed to load document {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(_, e) => Some(e),
            StorageError::ParseError(_, e) => Some(e),
        }
    }
}

/// The shared document and the file backing it.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    document: RemoteDocument,
}

impl DocumentStore {
    /// Opens the document in `data_dir`, starting empty if there is none.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::IoError(data_dir.to_path_buf(), e))?;

        let path = data_dir.join(DOCUMENT_FILE);
        let document = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StorageError::ParseError(path.clone(), e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => RemoteDocument::new(),
            Err(e) => return Err(StorageError::IoError(path, e)),
        };

        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &RemoteDocument {
        &self.document
    }

    /// Applies `change`, writes the result and returns the new document.
    ///
    /// On failure the stored and in-memory document are left as they were.
    pub fn update(
        &mut self,
        change: impl FnOnce(&mut RemoteDocument),
    ) -> Result<RemoteDocument, StorageError> {
        let mut next = self.document.clone();
        change(&mut next);
        self.write(&next)?;
        self.document = next;
        Ok(self.document.clone())
    }

    fn write(&self, document: &RemoteDocument) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| StorageError::ParseError(self.path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = self.path.with_extension("json.tmp");
        let mut file =
            File::create(&temp_path).map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| StorageError::IoError(temp_path.clone(), e))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| StorageError::IoError(self.path.clone(), e))?;
        Ok(())
    }
}
