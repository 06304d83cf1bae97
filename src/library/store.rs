use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::package::ShapeLibrary;
use crate::error::LibraryError;

/// Summary row for a stored library, as listed by the storage service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySummary {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub image_count: usize,
}

/// Default location for saved libraries: `<data dir>/lipsync/libraries`.
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lipsync")
        .join("libraries")
}

/// Replace everything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> Result<String, LibraryError> {
    let trimmed = name.trim();
    let cleaned: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(LibraryError::InvalidName(name.to_string()));
    }
    Ok(cleaned)
}

/// A directory of `<name>.zip` library archives.
pub struct LibraryStore {
    root: PathBuf,
}

impl LibraryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, LibraryError> {
        Ok(self.root.join(format!("{}.zip", sanitize_name(name)?)))
    }

    /// All readable archives, sorted by name. Unreadable ones are logged and skipped.
    pub fn list(&self) -> Result<Vec<LibrarySummary>, LibraryError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            let metadata = entry.metadata()?;
            match ShapeLibrary::from_zip_file(&path) {
                Ok(library) => {
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    out.push(LibrarySummary {
                        display_name: library.manifest.display_name().to_string(),
                        created_at: library.manifest.created.clone(),
                        size: metadata.len(),
                        image_count: library.manifest.image_count,
                        name: stem,
                    });
                }
                Err(e) => log::warn!("Skipping unreadable library {}: {}", path.display(), e),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn load(&self, name: &str) -> Result<ShapeLibrary, LibraryError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        ShapeLibrary::from_zip_file(&path)
    }

    /// Store archive bytes under `name`, replacing any library of the same name.
    ///
    /// The archive must load before anything is written. It is written to a
    /// temporary file first and renamed into place, so a failure leaves the
    /// existing library untouched.
    pub fn save_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, LibraryError> {
        let path = self.path_for(name)?;
        ShapeLibrary::from_zip_bytes(bytes, name)?;

        std::fs::create_dir_all(&self.root)?;
        let tmp = path.with_extension("zip.tmp");
        if let Err(e) = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!("Saved library '{}' to {}", name, path.display());
        Ok(path)
    }

    pub fn save(&self, library: &ShapeLibrary) -> Result<PathBuf, LibraryError> {
        self.save_bytes(library.name(), &library.to_zip_bytes()?)
    }

    pub fn delete(&self, name: &str) -> Result<(), LibraryError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        log::info!("Deleted library '{}'", name);
        Ok(())
    }
}
