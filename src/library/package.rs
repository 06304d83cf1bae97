use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::manifest::{LibraryManifest, MANIFEST_FILE};
use crate::error::LibraryError;
use crate::viseme::{is_image_file, ShapeCatalog, ShapeImage};

const IMAGES_DIR: &str = "images/";

/// A named set of shape images, as stored in a library archive.
#[derive(Clone, Debug)]
pub struct ShapeLibrary {
    pub manifest: LibraryManifest,
    pub catalog: ShapeCatalog,
}

impl ShapeLibrary {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Read a library archive held in memory.
    ///
    /// `fallback_name` names the library when the archive has no `library.json`.
    /// Images are read from `images/` when that folder holds any, otherwise from
    /// the archive root.
    pub fn from_zip_bytes(bytes: &[u8], fallback_name: &str) -> Result<Self, LibraryError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let manifest = match archive.by_name(MANIFEST_FILE) {
            Ok(mut file) => {
                let mut text = String::new();
                file.read_to_string(&mut text)?;
                Some(LibraryManifest::parse(&text)?)
            }
            Err(zip::result::ZipError::FileNotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let mut manifest = manifest.unwrap_or_else(|| {
            log::debug!("No {} in '{}', using defaults", MANIFEST_FILE, fallback_name);
            LibraryManifest::new(fallback_name)
        });

        let mut nested = Vec::new();
        let mut root = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let path = file.name().to_string();
            let (target, name) = match path.strip_prefix(IMAGES_DIR) {
                Some(rest) => (&mut nested, rest.to_string()),
                None if !path.contains('/') => (&mut root, path.clone()),
                None => continue,
            };
            if name.contains('/') || name.starts_with('.') || !is_image_file(&name) {
                continue;
            }
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            target.push(ShapeImage::new(name, bytes));
        }

        let images = if nested.is_empty() { root } else { nested };
        manifest.image_count = images.len();
        let catalog = ShapeCatalog::from_images(images, &manifest.shape_overrides());
        log::info!(
            "Loaded library '{}' ({} image(s), {} shape(s))",
            manifest.display_name(),
            manifest.image_count,
            catalog.len()
        );
        Ok(Self { manifest, catalog })
    }

    pub fn from_zip_file(path: &Path) -> Result<Self, LibraryError> {
        let bytes = std::fs::read(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("library");
        Self::from_zip_bytes(&bytes, stem)
    }

    /// Load every image file directly inside `dir` (no manifest needed).
    pub fn from_dir(dir: &Path) -> Result<Self, LibraryError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') && is_image_file(name) {
                    paths.push((name.to_string(), entry.path()));
                }
            }
        }
        paths.sort();

        let mut images = Vec::with_capacity(paths.len());
        for (name, path) in paths {
            images.push(ShapeImage::new(name, std::fs::read(&path)?));
        }

        let name = dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("library");
        let mut manifest = LibraryManifest::new(name);
        manifest.image_count = images.len();
        let catalog = ShapeCatalog::from_images(images, &Default::default());
        Ok(Self { manifest, catalog })
    }

    /// Load a `.zip` archive or a directory of images.
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_zip_file(path)
        }
    }

    /// Serialize to an archive with `library.json` and `images/<Shape>.<ext>`.
    pub fn to_zip_bytes(&self) -> Result<Vec<u8>, LibraryError> {
        let mut manifest = self.manifest.clone();
        manifest.image_count = self.catalog.len();
        manifest.phoneme_map.clear();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.add_directory(IMAGES_DIR, options)?;
        for entry in self.catalog.entries() {
            let file_name = format!("{}.{}", entry.shape.name(), entry.image.extension());
            writer.start_file(format!("{}{}", IMAGES_DIR, file_name), options)?;
            writer.write_all(&entry.image.bytes)?;
        }

        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| LibraryError::Manifest(e.to_string()))?;
        writer.start_file(MANIFEST_FILE, options)?;
        writer.write_all(json.as_bytes())?;

        Ok(writer.finish()?.into_inner())
    }
}
