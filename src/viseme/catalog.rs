use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::shape::{Shape, ShapeCategory};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Raw bytes of one shape image together with the name it was loaded under.
#[derive(Clone, Debug)]
pub struct ShapeImage {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl ShapeImage {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercase extension, `"png"` when the name has none.
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "png".to_string())
    }
}

pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub shape: Shape,
    pub category: ShapeCategory,
    pub image: ShapeImage,
}

/// What the classifier resolved a frame to: a catalog index plus the shape it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShapeChoice {
    pub index: usize,
    pub shape: Shape,
    pub category: ShapeCategory,
}

impl ShapeChoice {
    /// Returned whenever the catalog cannot supply anything.
    pub const FALLBACK: ShapeChoice = ShapeChoice {
        index: 0,
        shape: Shape::Neutral,
        category: ShapeCategory::Fallback,
    };

    pub fn name(&self) -> &'static str {
        self.shape.name()
    }
}

/// Shape → image bindings for one library, in load order.
///
/// Categories are resolved once when entries are added. Each shape appears at
/// most once; a later image for the same shape is ignored.
#[derive(Clone, Debug, Default)]
pub struct ShapeCatalog {
    entries: Vec<CatalogEntry>,
    by_shape: [Option<usize>; Shape::ALL.len()],
}

impl ShapeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from image files, recognising shapes from file names.
    ///
    /// `overrides` maps a file base name (without extension) to a shape and wins
    /// over name recognition. Unrecognised files are skipped.
    pub fn from_images(images: Vec<ShapeImage>, overrides: &HashMap<String, Shape>) -> Self {
        let mut catalog = Self::new();
        for image in images {
            let base = image
                .file_name
                .rsplit('/')
                .next()
                .unwrap_or(&image.file_name)
                .to_string();
            let stem = base.rsplit_once('.').map_or(base.as_str(), |(s, _)| s);
            let shape = overrides
                .get(stem)
                .or_else(|| overrides.get(&base))
                .copied()
                .or_else(|| Shape::from_file_name(&base));
            match shape {
                Some(shape) => {
                    if !catalog.insert(shape, image) {
                        log::warn!("Duplicate image for shape {}: keeping the first one", shape);
                    }
                }
                None => log::debug!("Ignoring unrecognised image '{}'", base),
            }
        }
        log::info!(
            "Shape catalog: {} shape(s) [{}]",
            catalog.len(),
            catalog
                .entries
                .iter()
                .map(|e| e.shape.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        catalog
    }

    /// Adds `shape` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, shape: Shape, image: ShapeImage) -> bool {
        if self.by_shape[shape.ordinal()].is_some() {
            return false;
        }
        self.by_shape[shape.ordinal()] = Some(self.entries.len());
        self.entries.push(CatalogEntry {
            shape,
            category: shape.category(),
            image,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn contains(&self, shape: Shape) -> bool {
        self.by_shape[shape.ordinal()].is_some()
    }

    pub fn index_of(&self, shape: Shape) -> Option<usize> {
        self.by_shape[shape.ordinal()]
    }

    pub fn choice(&self, shape: Shape) -> Option<ShapeChoice> {
        self.index_of(shape).map(|index| ShapeChoice {
            index,
            shape,
            category: shape.category(),
        })
    }

    /// The silence shape, when the catalog has one.
    pub fn silence(&self) -> Option<ShapeChoice> {
        self.choice(Shape::Neutral)
    }

    /// Neutral, else the most common vowel, else the first entry, else [`ShapeChoice::FALLBACK`].
    pub fn default_choice(&self) -> ShapeChoice {
        self.silence()
            .or_else(|| self.choice(Shape::Uh))
            .or_else(|| self.first())
            .unwrap_or(ShapeChoice::FALLBACK)
    }

    /// Shape for padding frames: silence, else the first entry, else [`ShapeChoice::FALLBACK`].
    pub fn neutral_choice(&self) -> ShapeChoice {
        self.silence()
            .or_else(|| self.first())
            .unwrap_or(ShapeChoice::FALLBACK)
    }

    fn first(&self) -> Option<ShapeChoice> {
        self.entries.first().map(|e| ShapeChoice {
            index: 0,
            shape: e.shape,
            category: e.category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> ShapeImage {
        ShapeImage::new(name, name.as_bytes().to_vec())
    }

    #[test]
    fn builds_from_recognised_names_only() {
        let catalog = ShapeCatalog::from_images(
            vec![image("mouth_Uh.png"), image("logo.png"), image("neutral.svg")],
            &HashMap::new(),
        );
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.index_of(Shape::Uh), Some(0));
        assert_eq!(catalog.index_of(Shape::Neutral), Some(1));
        assert!(!catalog.contains(Shape::Aa));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("shape_00".to_string(), Shape::Aa);
        overrides.insert("mouth_Uh".to_string(), Shape::Oh);
        let catalog =
            ShapeCatalog::from_images(vec![image("shape_00.png"), image("mouth_Uh.png")], &overrides);
        assert!(catalog.contains(Shape::Aa));
        assert!(catalog.contains(Shape::Oh));
        assert!(!catalog.contains(Shape::Uh));
    }

    #[test]
    fn duplicates_keep_first() {
        let mut catalog = ShapeCatalog::new();
        assert!(catalog.insert(Shape::M, image("m1.png")));
        assert!(!catalog.insert(Shape::M, image("m2.png")));
        assert_eq!(catalog.entry(0).unwrap().image.file_name, "m1.png");
    }

    #[test]
    fn default_choice_preference_order() {
        let empty = ShapeCatalog::new();
        assert_eq!(empty.default_choice(), ShapeChoice::FALLBACK);
        assert_eq!(empty.neutral_choice(), ShapeChoice::FALLBACK);

        let mut catalog = ShapeCatalog::new();
        catalog.insert(Shape::S, image("s.png"));
        assert_eq!(catalog.default_choice().shape, Shape::S);
        catalog.insert(Shape::Uh, image("uh.png"));
        assert_eq!(catalog.default_choice().shape, Shape::Uh);
        assert_eq!(catalog.neutral_choice().shape, Shape::S);
        catalog.insert(Shape::Neutral, image("neutral.png"));
        assert_eq!(catalog.default_choice().shape, Shape::Neutral);
        assert_eq!(catalog.default_choice().index, 2);
    }

    #[test]
    fn image_helpers() {
        assert!(is_image_file("a/B.PNG"));
        assert!(!is_image_file("library.json"));
        assert_eq!(image("x.JPG").extension(), "jpg");
        assert_eq!(image("noext").extension(), "png");
    }
}
