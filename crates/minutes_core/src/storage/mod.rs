use std::{io, path::PathBuf};

use thiserror::Error;

pub mod folder;
pub mod json_repo;
pub mod schema;

pub use folder::{FixedFolderPicker, FolderAccess, FolderPicker, LocalFolder, MemoryFolder};
pub use json_repo::DocumentStore;
pub use schema::{is_recognized, parse_document, reconcile, DEFAULT_FILE_NAME};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no minutes file is connected")]
    NotConnected,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("there is no draft to finalize")]
    NoDraft,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to serialize minutes document: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Maps a platform error, treating permission failures as a refused grant.
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::AccessDenied(format!("{}: {source}", path.display()))
        } else {
            Self::Io { path, source }
        }
    }

    /// Stable machine-readable code for bridge responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::AccessDenied(_) => "access_denied",
            Self::Io { .. } => "io_error",
            Self::InvalidFileName(_) => "invalid_file_name",
            Self::NoDraft => "no_draft",
            Self::NotFound(_) => "not_found",
            Self::Serialize(_) => "serialization_failure",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
