use std::collections::HashMap;
use std::sync::Arc;

use super::raster::Rasterizer;
use super::text::TextOverlay;
use crate::error::ExportError;
use crate::viseme::{AnimationFrame, ShapeCatalog};

/// Rasterizes animation frames at a fixed size, one decode per catalog image.
pub struct FrameRenderer<'a> {
    catalog: &'a ShapeCatalog,
    rasterizer: Box<dyn Rasterizer + 'a>,
    pub width: u32,
    pub height: u32,
    background: [u8; 4],
    overlay: Option<TextOverlay>,
    cache: HashMap<usize, Result<Arc<Vec<u8>>, String>>,
    previous: Option<Arc<Vec<u8>>>,
    substituted: usize,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(
        catalog: &'a ShapeCatalog,
        rasterizer: Box<dyn Rasterizer + 'a>,
        width: u32,
        height: u32,
        background: [u8; 4],
    ) -> Self {
        Self {
            catalog,
            rasterizer,
            width,
            height,
            background,
            overlay: None,
            cache: HashMap::new(),
            previous: None,
            substituted: 0,
        }
    }

    pub fn with_overlay(mut self, overlay: Option<TextOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Frames that were replaced by the previous image (or a blank) so far.
    pub fn substituted(&self) -> usize {
        self.substituted
    }

    /// Rasterize the image a frame points at. Failures are cached per image.
    pub fn render_frame(&mut self, frame: &AnimationFrame) -> Result<Arc<Vec<u8>>, ExportError> {
        let index = frame.image_index.ok_or(ExportError::NoImages)?;
        if let Some(cached) = self.cache.get(&index) {
            return cached.clone().map_err(|reason| ExportError::Rasterize {
                image: self.image_name(index),
                reason,
            });
        }

        let entry = self.catalog.entry(index).ok_or_else(|| ExportError::Rasterize {
            image: format!("#{}", index),
            reason: "not in the shape library".into(),
        })?;
        let result = self
            .rasterizer
            .rasterize(&entry.image, self.width, self.height)
            .map(Arc::new);
        let cached = result.as_ref().map(Arc::clone).map_err(|e| e.to_string());
        self.cache.insert(index, cached);
        result
    }

    /// Pixels for a frame, never failing.
    ///
    /// A frame whose image cannot be rasterized reuses the previous frame's
    /// pixels, or a blank background frame when there is none yet.
    pub fn render_or_substitute(&mut self, frame: &AnimationFrame) -> Vec<u8> {
        let base = match self.render_frame(frame) {
            Ok(pixels) => pixels,
            Err(e) => {
                self.substituted += 1;
                log::warn!(
                    "Frame {} ({}): {}; reusing previous frame",
                    frame.frame_index,
                    frame.shape,
                    e
                );
                match &self.previous {
                    Some(previous) => Arc::clone(previous),
                    None => Arc::new(self.blank()),
                }
            }
        };
        self.previous = Some(Arc::clone(&base));

        let mut pixels = base.to_vec();
        if let Some(ref overlay) = self.overlay {
            overlay.label_frame(&mut pixels, self.width, self.height, frame.shape_name(), frame.time);
        }
        pixels
    }

    pub fn blank(&self) -> Vec<u8> {
        self.background
            .iter()
            .copied()
            .cycle()
            .take(self.width as usize * self.height as usize * 4)
            .collect()
    }

    fn image_name(&self, index: usize) -> String {
        self.catalog
            .entry(index)
            .map(|e| e.image.file_name.clone())
            .unwrap_or_else(|| format!("#{}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viseme::{Shape, ShapeCategory, ShapeImage};
    use std::cell::Cell;

    /// Fills the frame with the image's first byte; images starting with 0 fail.
    struct FillRasterizer<'c> {
        calls: &'c Cell<usize>,
    }

    impl Rasterizer for FillRasterizer<'_> {
        fn rasterize(&self, image: &ShapeImage, width: u32, height: u32) -> Result<Vec<u8>, ExportError> {
            self.calls.set(self.calls.get() + 1);
            match image.bytes.first() {
                Some(0) | None => Err(ExportError::Rasterize {
                    image: image.file_name.clone(),
                    reason: "broken".into(),
                }),
                Some(v) => Ok(vec![*v; (width * height * 4) as usize]),
            }
        }
    }

    fn frame(i: usize, shape: Shape, image_index: Option<usize>) -> AnimationFrame {
        AnimationFrame {
            time: i as f64 / 24.0,
            frame_index: i,
            shape,
            category: ShapeCategory::Vowel,
            image_index,
            buffer: false,
        }
    }

    fn catalog() -> ShapeCatalog {
        let mut catalog = ShapeCatalog::new();
        catalog.insert(Shape::Neutral, ShapeImage::new("neutral.png", vec![7u8]));
        catalog.insert(Shape::Uh, ShapeImage::new("uh.png", vec![0u8]));
        catalog
    }

    #[test]
    fn caches_per_image() {
        let calls = Cell::new(0);
        let catalog = catalog();
        let mut renderer =
            FrameRenderer::new(&catalog, Box::new(FillRasterizer { calls: &calls }), 2, 2, [0, 0, 0, 255]);
        for i in 0..5 {
            let pixels = renderer.render_frame(&frame(i, Shape::Neutral, Some(0))).unwrap();
            assert_eq!(pixels.len(), 16);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_frames_reuse_previous_image() {
        let calls = Cell::new(0);
        let catalog = catalog();
        let mut renderer =
            FrameRenderer::new(&catalog, Box::new(FillRasterizer { calls: &calls }), 2, 2, [1, 2, 3, 255]);

        let first_bad = renderer.render_or_substitute(&frame(0, Shape::Uh, Some(1)));
        assert_eq!(first_bad, renderer.blank());

        let good = renderer.render_or_substitute(&frame(1, Shape::Neutral, Some(0)));
        assert_eq!(good, vec![7u8; 16]);

        let bad = renderer.render_or_substitute(&frame(2, Shape::Uh, Some(1)));
        assert_eq!(bad, good);
        assert_eq!(renderer.substituted(), 2);
        // The failing image is only attempted once.
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn frames_without_images_are_substituted() {
        let calls = Cell::new(0);
        let catalog = ShapeCatalog::new();
        let mut renderer =
            FrameRenderer::new(&catalog, Box::new(FillRasterizer { calls: &calls }), 1, 1, [9, 9, 9, 255]);
        assert!(matches!(
            renderer.render_frame(&frame(0, Shape::Neutral, None)),
            Err(ExportError::NoImages)
        ));
        assert_eq!(renderer.render_or_substitute(&frame(0, Shape::Neutral, None)), vec![9, 9, 9, 255]);
    }
}
