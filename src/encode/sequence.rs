use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use serde::Serialize;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{write_atomically, Encoder, ExportJob};
use crate::error::{ExportError, Result};
use crate::run::{Progress, RunControl, Stage};
use crate::viseme::{AnimationFrame, CatalogEntry, Shape, ShapeCategory};

const FRAMES_DIR: &str = "frames/";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameInfo<'a> {
    index: usize,
    name: &'static str,
    category: ShapeCategory,
    timestamp: String,
    image: &'a str,
    buffer: bool,
    original_format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnimationInfo<'a> {
    total_frames: usize,
    duration: f64,
    fps: u32,
    audio_duration: f64,
    generated_at: String,
    audio_file: &'a str,
    library_used: &'a str,
    distribution: BTreeMap<Shape, usize>,
    frames: &'a [AnimationFrame],
}

/// Writes the animation as a zip of numbered source images plus JSON metadata.
///
/// Images are copied byte-for-byte from the library, so every frame keeps its
/// source format.
#[derive(Default)]
pub struct ImageSequenceEncoder;

impl ImageSequenceEncoder {
    pub fn new() -> Self {
        Self
    }

    fn write_archive<W: Write + Seek>(
        &self,
        job: &ExportJob,
        writer: W,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let frames = &job.track.frames;
        let fps = job.track.frame_rate;

        zip.add_directory(FRAMES_DIR, deflated).map_err(ExportError::Zip)?;

        let mut previous: Option<&CatalogEntry> = None;
        let mut substituted = 0usize;
        for (i, frame) in frames.iter().enumerate() {
            control.check()?;

            let entry = match frame.image_index.and_then(|idx| job.catalog.entry(idx)) {
                Some(entry) => entry,
                None => {
                    substituted += 1;
                    log::warn!(
                        "Frame {} ({}) has no image; reusing the previous one",
                        frame.frame_index,
                        frame.shape
                    );
                    match previous.or_else(|| job.catalog.entries().first()) {
                        Some(entry) => entry,
                        None => return Err(ExportError::NoImages.into()),
                    }
                }
            };
            previous = Some(entry);

            let ext = entry.image.extension();
            let stem = format!("frame_{:04}", i + 1);
            zip.start_file(format!("{}{}.{}", FRAMES_DIR, stem, ext), stored)
                .map_err(ExportError::Zip)?;
            zip.write_all(&entry.image.bytes).map_err(ExportError::Io)?;

            let info = FrameInfo {
                index: i,
                name: frame.shape_name(),
                category: frame.category,
                timestamp: format!("{:.3}s", i as f64 / fps as f64),
                image: &entry.image.file_name,
                buffer: frame.buffer,
                original_format: ext,
            };
            zip.start_file(format!("{}{}_info.json", FRAMES_DIR, stem), deflated)
                .map_err(ExportError::Zip)?;
            zip.write_all(&serde_json::to_vec_pretty(&info).map_err(ExportError::Json)?)
                .map_err(ExportError::Io)?;

            progress.update(Stage::Export, i + 1, frames.len());
        }
        if substituted > 0 {
            log::warn!("{} frame(s) reused a previous image", substituted);
        }

        let info = AnimationInfo {
            total_frames: frames.len(),
            duration: job.track.duration(),
            fps,
            audio_duration: job.track.audio_duration,
            generated_at: chrono::Utc::now().to_rfc3339(),
            audio_file: &job.audio_name,
            library_used: &job.library_name,
            distribution: job.track.distribution(),
            frames,
        };
        zip.start_file("animation_info.json", deflated)
            .map_err(ExportError::Zip)?;
        zip.write_all(&serde_json::to_vec_pretty(&info).map_err(ExportError::Json)?)
            .map_err(ExportError::Io)?;

        zip.start_file("README.md", deflated).map_err(ExportError::Zip)?;
        zip.write_all(readme(&info).as_bytes()).map_err(ExportError::Io)?;

        Ok(zip.finish().map_err(ExportError::Zip)?)
    }
}

impl Encoder for ImageSequenceEncoder {
    fn name(&self) -> &'static str {
        "image-sequence"
    }

    fn encode(
        &mut self,
        job: &ExportJob,
        output: &Path,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<()> {
        if job.track.frames.is_empty() {
            return Err(ExportError::NoFrames.into());
        }
        if job.catalog.is_empty() {
            return Err(ExportError::NoImages.into());
        }

        write_atomically(output, |partial| {
            let file = File::create(partial).map_err(ExportError::Io)?;
            let mut writer = self.write_archive(job, BufWriter::new(file), control, progress)?;
            writer.flush().map_err(ExportError::Io)?;
            Ok(())
        })?;

        log::info!(
            "Wrote {} frames to {}",
            job.track.frames.len(),
            output.display()
        );
        Ok(())
    }
}

fn readme(info: &AnimationInfo) -> String {
    let shapes: String = info
        .distribution
        .iter()
        .map(|(shape, count)| format!("- {} ({} frames): {}\n", shape, count, shape.description()))
        .collect();
    format!(
        "# Lip-Sync Animation Frames\n\
         \n\
         ## Contents\n\
         - `frames/frame_XXXX.<ext>`: the mouth shape image shown on each frame\n\
         - `frames/frame_XXXX_info.json`: shape, category and timestamp of each frame\n\
         - `animation_info.json`: metadata and the full frame list\n\
         \n\
         ## Details\n\
         - Total frames: {}\n\
         - Duration: {:.2} seconds\n\
         - Frame rate: {} FPS\n\
         - Generated: {}\n\
         - Audio file: {}\n\
         - Library: {}\n\
         \n\
         ## Shapes\n\
         {}\
         \n\
         Import the sequence as numbered frames starting from frame_0001 at {} FPS.\n",
        info.total_frames,
        info.duration,
        info.fps,
        info.generated_at,
        info.audio_file,
        info.library_used,
        shapes,
        info.fps
    )
}
