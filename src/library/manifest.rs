use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::viseme::Shape;

pub const MANIFEST_FILE: &str = "library.json";

/// Contents of `library.json` at the root of a library archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// ISO-8601 creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub image_count: usize,
    /// Image base name → shape label, for files whose names are not labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub phoneme_map: BTreeMap<String, String>,
}

impl LibraryManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            created: Some(chrono::Utc::now().to_rfc3339()),
            image_count: 0,
            phoneme_map: BTreeMap::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, LibraryError> {
        let manifest: LibraryManifest = serde_json::from_str(text)
            .map_err(|e| LibraryError::Manifest(format!("{}: {}", MANIFEST_FILE, e)))?;
        if manifest.name.trim().is_empty() {
            return Err(LibraryError::Manifest(format!(
                "{}: 'name' must not be empty",
                MANIFEST_FILE
            )));
        }
        Ok(manifest)
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// `phonemeMap` resolved to shapes. Entries with unknown labels are logged and skipped.
    pub fn shape_overrides(&self) -> HashMap<String, Shape> {
        let mut out = HashMap::new();
        for (file, label) in &self.phoneme_map {
            match Shape::from_label(label) {
                Some(shape) => {
                    out.insert(file.clone(), shape);
                }
                None => log::warn!(
                    "Library '{}': phonemeMap entry '{}' has unknown shape '{}'",
                    self.name,
                    file,
                    label
                ),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exported_manifest() {
        let manifest = LibraryManifest::parse(
            r#"{
                "name": "my_lib",
                "displayName": "My Lib",
                "created": "2024-01-01T00:00:00.000Z",
                "imageCount": 3,
                "phonemeMap": { "shape_00": "Aa", "shape_01": "bogus" }
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.display_name(), "My Lib");
        assert_eq!(manifest.image_count, 3);
        let overrides = manifest.shape_overrides();
        assert_eq!(overrides.get("shape_00"), Some(&Shape::Aa));
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn missing_name_is_rejected() {
        assert!(matches!(
            LibraryManifest::parse(r#"{ "displayName": "x" }"#),
            Err(LibraryError::Manifest(_))
        ));
        assert!(LibraryManifest::parse(r#"{ "name": "  " }"#).is_err());
        assert!(LibraryManifest::parse("not json").is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let mut manifest = LibraryManifest::new("lib");
        manifest.image_count = 2;
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"imageCount\":2"));
        assert!(!json.contains("phonemeMap"));
    }
}
