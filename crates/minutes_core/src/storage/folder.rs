//! Folder capabilities the document store reads and writes through.
//!
//! A [`FolderAccess`] is an already-authorized handle to one folder. Hosts
//! obtain it from a [`FolderPicker`] at the start of every session; handles
//! are never persisted, so each session has to ask for access again.

use std::{
    collections::BTreeMap,
    fs,
    io,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex},
};

use super::{StoreError, StoreResult};

pub trait FolderAccess: Send {
    /// Human-readable location used in logs and status reports.
    fn location(&self) -> String;
    fn list_entries(&self) -> StoreResult<Vec<String>>;
    fn read_file(&self, name: &str) -> StoreResult<String>;
    /// Replaces the whole file, creating it when absent.
    fn write_file(&self, name: &str, contents: &str) -> StoreResult<()>;
}

pub trait FolderPicker: Send {
    /// Requests a fresh folder grant. `hint` is a host-specific folder choice.
    fn request_folder(&self, hint: Option<&str>) -> StoreResult<Box<dyn FolderAccess>>;
}

pub(crate) fn validate_file_name(name: &str) -> StoreResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(StoreError::InvalidFileName(name.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct LocalFolder {
    root: PathBuf,
}

impl LocalFolder {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let metadata = fs::metadata(&root).map_err(|error| StoreError::from_io(&root, error))?;
        if !metadata.is_dir() {
            return Err(StoreError::Io {
                path: root,
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> StoreResult<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }
}

impl FolderAccess for LocalFolder {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn list_entries(&self) -> StoreResult<Vec<String>> {
        let entries =
            fs::read_dir(&self.root).map_err(|error| StoreError::from_io(&self.root, error))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::from_io(&self.root, error))?;
            let is_file = entry
                .file_type()
                .map(|file_type| file_type.is_file())
                .unwrap_or(false);
            if is_file {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, name: &str) -> StoreResult<String> {
        let path = self.path_of(name)?;
        fs::read_to_string(&path).map_err(|error| StoreError::from_io(&path, error))
    }

    fn write_file(&self, name: &str, contents: &str) -> StoreResult<()> {
        let path = self.path_of(name)?;
        let tmp_path = self.root.join(format!(".{name}.tmp"));

        fs::write(&tmp_path, contents).map_err(|error| StoreError::from_io(&tmp_path, error))?;
        fs::rename(&tmp_path, &path).map_err(|error| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::from_io(&path, error)
        })
    }
}

/// In-memory folder. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFolder {
    files: Arc<Mutex<BTreeMap<String, String>>>,
    read_only: bool,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A folder whose grant only allows reading; every write is refused.
    pub fn read_only(self) -> Self {
        Self {
            read_only: true,
            ..self
        }
    }

    pub fn with_file(self, name: &str, contents: &str) -> Self {
        self.lock().insert(name.to_string(), contents.to_string());
        self
    }

    pub fn contents(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.files.lock().expect("memory folder mutex poisoned")
    }
}

impl FolderAccess for MemoryFolder {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn list_entries(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn read_file(&self, name: &str) -> StoreResult<String> {
        validate_file_name(name)?;
        self.lock().get(name).cloned().ok_or_else(|| StoreError::Io {
            path: PathBuf::from(name),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        })
    }

    fn write_file(&self, name: &str, contents: &str) -> StoreResult<()> {
        validate_file_name(name)?;
        if self.read_only {
            return Err(StoreError::AccessDenied(format!(
                "write to {name} was not granted"
            )));
        }
        self.lock().insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

/// Grants a directory chosen by the host, or a configured fallback.
#[derive(Debug, Clone, Default)]
pub struct FixedFolderPicker {
    default_dir: Option<PathBuf>,
}

impl FixedFolderPicker {
    pub fn new(default_dir: Option<PathBuf>) -> Self {
        Self { default_dir }
    }
}

impl FolderPicker for FixedFolderPicker {
    fn request_folder(&self, hint: Option<&str>) -> StoreResult<Box<dyn FolderAccess>> {
        let chosen = hint
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.default_dir.clone())
            .ok_or_else(|| StoreError::AccessDenied("no folder was selected".to_string()))?;

        Ok(Box::new(LocalFolder::open(chosen)?))
    }
}
