use std::time::Duration;

use crate::encode::ffmpeg;
use crate::error::ExportError;
use crate::viseme::ShapeImage;

/// Turns a shape image into a `width * height * 4` RGBA buffer.
pub trait Rasterizer {
    fn rasterize(&self, image: &ShapeImage, width: u32, height: u32) -> Result<Vec<u8>, ExportError>;
}

/// Decodes, scales and letterboxes images with the `ffmpeg` binary.
///
/// The image is fitted inside the frame keeping its aspect ratio, centred,
/// and composited over `background`.
pub struct FfmpegRasterizer {
    pub background: [u8; 4],
    pub timeout: Duration,
}

impl FfmpegRasterizer {
    pub fn new(background: [u8; 4], timeout: Duration) -> Self {
        Self { background, timeout }
    }
}

impl Rasterizer for FfmpegRasterizer {
    fn rasterize(&self, image: &ShapeImage, width: u32, height: u32) -> Result<Vec<u8>, ExportError> {
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,format=rgba,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black@0",
            w = width,
            h = height
        );
        let mut args: Vec<String> = vec!["-loglevel".into(), "error".into()];
        if image.extension() == "svg" {
            args.extend(["-f".to_string(), "svg_pipe".to_string()]);
        }
        args.extend([
            "-i".into(), "pipe:0".into(),
            "-vf".into(), filter,
            "-frames:v".into(), "1".into(),
            "-f".into(), "rawvideo".into(),
            "-pix_fmt".into(), "rgba".into(),
            "pipe:1".into(),
        ]);

        let output = ffmpeg::run(&args, Some(&image.bytes[..]), self.timeout)?;
        let expected = width as usize * height as usize * 4;
        if !output.status.success() || output.stdout.len() != expected {
            return Err(ExportError::Rasterize {
                image: image.file_name.clone(),
                reason: format!(
                    "got {} of {} bytes: {}",
                    output.stdout.len(),
                    expected,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let mut pixels = output.stdout;
        flatten(&mut pixels, self.background);
        Ok(pixels)
    }
}

/// Composite RGBA pixels over an opaque background colour in place.
pub fn flatten(pixels: &mut [u8], background: [u8; 4]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u32;
        for c in 0..3 {
            px[c] = ((px[c] as u32 * a + background[c] as u32 * (255 - a)) / 255) as u8;
        }
        px[3] = 255;
    }
}

/// Parse `#rrggbb` or `rrggbb` into an opaque colour.
pub fn parse_color(text: &str) -> Option<[u8; 4]> {
    let hex = text.trim().trim_start_matches('#');
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    let alpha = match hex.len() {
        6 => 255,
        8 => channel(6)?,
        _ => return None,
    };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_blends_over_background() {
        let mut pixels = vec![255, 0, 0, 255, 0, 0, 0, 0, 0, 255, 0, 128];
        flatten(&mut pixels, [0, 0, 255, 255]);
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[4..8], &[0, 0, 255, 255]);
        assert_eq!(pixels[9], 128);
        assert_eq!(pixels[10], 127);
        assert_eq!(pixels[11], 255);
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_color("#ffffff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_color("102030"), Some([16, 32, 48, 255]));
        assert_eq!(parse_color("#ffcc0080"), Some([255, 204, 0, 128]));
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("zzzzzz"), None);
    }

    #[test]
    fn rasterizes_png_when_ffmpeg_is_installed() {
        if !ffmpeg::available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        ffmpeg::write_png(&[255, 0, 0, 255].repeat(8 * 4), 8, 4, &path, Duration::from_secs(30))
            .unwrap();
        let image = ShapeImage::new("red.png", std::fs::read(&path).unwrap());
        let raster = FfmpegRasterizer::new([0, 0, 0, 255], Duration::from_secs(30));
        let pixels = raster.rasterize(&image, 16, 16).unwrap();
        assert_eq!(pixels.len(), 16 * 16 * 4);
        // Centre of the letterboxed image is red.
        let centre = (8 * 16 + 8) * 4;
        assert!(pixels[centre] > 200 && pixels[centre + 1] < 50);
    }
}
