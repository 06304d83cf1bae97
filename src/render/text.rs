use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};

/// Draws short labels (shape name, timestamp) onto rendered frames.
pub struct TextOverlay {
    font: Font,
    font_size: f32,
    color: [u8; 4],
}

impl TextOverlay {
    pub fn from_bytes(bytes: &[u8], font_size: f32) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;
        Ok(Self {
            font,
            font_size,
            color: [255, 255, 255, 220],
        })
    }

    /// Load a font from a local path or an `http(s)://` URL.
    pub fn load(source: &str, font_size: f32) -> Result<Self> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            load_font_from_url(source)?
        } else {
            std::fs::read(Path::new(source))
                .with_context(|| format!("Failed to read font: {}", source))?
        };
        Self::from_bytes(&bytes, font_size)
    }

    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn line_height(&self) -> u32 {
        self.font
            .horizontal_line_metrics(self.font_size)
            .map(|m| m.new_line_size.ceil() as u32)
            .unwrap_or(self.font_size.ceil() as u32)
    }

    /// Composite text onto an RGBA pixel buffer with its top-left corner at (x, y).
    pub fn composite(&self, pixels: &mut [u8], width: u32, height: u32, text: &str, x: u32, y: u32) {
        let color = self.color;
        let mut cursor_x = x as i32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.font_size);
            let glyph_y = y as i32 + self.font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = bitmap[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }
                    let px = cursor_x + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= pixels.len() {
                        continue;
                    }

                    let a = alpha as f32 / 255.0 * (color[3] as f32 / 255.0);
                    for c in 0..3 {
                        pixels[idx + c] = (color[c] as f32 * a + pixels[idx + c] as f32 * (1.0 - a)) as u8;
                    }
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width as i32;
        }
    }

    pub fn measure_width(&self, text: &str) -> u32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, self.font_size).advance_width)
            .sum::<f32>()
            .ceil() as u32
    }

    /// Shape name in the top-left corner, timestamp in the bottom-right.
    pub fn label_frame(&self, pixels: &mut [u8], width: u32, height: u32, shape: &str, time: f64) {
        let margin = (width.min(height) as f32 * 0.04) as u32;
        self.composite(pixels, width, height, shape, margin, margin);

        let stamp = format_timestamp(time);
        let tw = self.measure_width(&stamp);
        let tx = width.saturating_sub(margin + tw);
        let ty = height.saturating_sub(margin + self.line_height());
        self.composite(pixels, width, height, &stamp, tx, ty);
    }
}

pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to fetch font from {}", url))?
        .error_for_status()
        .with_context(|| format!("Font request failed: {}", url))?;
    Ok(response.bytes()?.to_vec())
}

/// `mm:ss.cc`, or `hh:mm:ss.cc` past an hour.
pub fn format_timestamp(time: f64) -> String {
    let total_centis = (time.max(0.0) * 100.0).round() as u64;
    let centis = total_centis % 100;
    let total_secs = total_centis / 100;
    if total_secs >= 3600 {
        format!(
            "{:02}:{:02}:{:02}.{:02}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            centis
        )
    } else {
        format!("{:02}:{:02}.{:02}", total_secs / 60, total_secs % 60, centis)
    }
}
