use std::path::{Path, PathBuf};

use super::ffmpeg::{FfmpegEncoder, VideoSettings};
use super::{write_atomically, Encoder, ExportJob};
use crate::audio::Waveform;
use crate::error::{ExportError, Result};
use crate::render::FrameRenderer;
use crate::run::{Progress, RunControl, Stage};

/// Streams rendered frames into ffmpeg and muxes them with the source audio.
pub struct VideoEncoder<'a> {
    renderer: FrameRenderer<'a>,
    settings: VideoSettings,
}

impl<'a> VideoEncoder<'a> {
    pub fn new(renderer: FrameRenderer<'a>, settings: VideoSettings) -> Self {
        Self { renderer, settings }
    }
}

impl Encoder for VideoEncoder<'_> {
    fn name(&self) -> &'static str {
        "video"
    }

    fn encode(
        &mut self,
        job: &ExportJob,
        output: &Path,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<()> {
        let frames = &job.track.frames;
        if frames.is_empty() {
            return Err(ExportError::NoFrames.into());
        }
        if self.renderer.width != self.settings.width || self.renderer.height != self.settings.height {
            return Err(ExportError::Encoder(format!(
                "renderer is {}x{} but the encoder expects {}x{}",
                self.renderer.width, self.renderer.height, self.settings.width, self.settings.height
            ))
            .into());
        }

        let audio = AudioTrack::write(output, job.waveform)?;
        let mut settings = self.settings.clone();
        settings.fps = job.track.frame_rate;
        if let Some(remaining) = control.remaining() {
            settings.timeout = settings.timeout.min(remaining);
        }

        write_atomically(output, |partial| {
            let mut encoder = FfmpegEncoder::new(partial, &audio.path, &settings)?;
            for (i, frame) in frames.iter().enumerate() {
                control.check()?;
                let pixels = self.renderer.render_or_substitute(frame);
                progress.update(Stage::Render, i + 1, frames.len());
                encoder.write_frame(&pixels)?;
                progress.update(Stage::Export, i + 1, frames.len());
            }
            encoder.finish()?;
            Ok(())
        })?;

        if self.renderer.substituted() > 0 {
            log::warn!(
                "{} of {} frame(s) reused a previous image",
                self.renderer.substituted(),
                frames.len()
            );
        }
        log::info!("Wrote {} frames to {}", frames.len(), output.display());
        Ok(())
    }
}

/// Temporary 16-bit WAV of the analysed waveform, removed on drop.
struct AudioTrack {
    path: PathBuf,
}

impl AudioTrack {
    fn write(output: &Path, waveform: &Waveform) -> Result<Self, ExportError> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let path = output.with_file_name(format!(".{}.audio.wav", stem));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: waveform.sample_rate.max(1),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let track = Self { path };
        let mut writer = hound::WavWriter::create(&track.path, spec)?;
        for &sample in &waveform.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
        Ok(track)
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::ffmpeg;
    use crate::error::LipsyncError;
    use crate::render::Rasterizer;
    use crate::run::NoProgress;
    use crate::viseme::{AnimationFrame, AnimationTrack, Shape, ShapeCatalog, ShapeImage};
    use std::time::Duration;

    struct Solid;

    impl Rasterizer for Solid {
        fn rasterize(&self, _image: &ShapeImage, width: u32, height: u32) -> Result<Vec<u8>, ExportError> {
            Ok(vec![128; (width * height * 4) as usize])
        }
    }

    fn settings() -> VideoSettings {
        VideoSettings {
            width: 32,
            height: 32,
            fps: 10,
            codec: "mpeg4".into(),
            pix_fmt: "yuv420p".into(),
            crf: 23,
            bitrate: Some("400k".into()),
            timeout: Duration::from_secs(60),
        }
    }

    fn track(n: usize) -> AnimationTrack {
        AnimationTrack {
            frames: (0..n)
                .map(|i| AnimationFrame {
                    time: i as f64 / 10.0,
                    frame_index: i,
                    shape: Shape::Neutral,
                    category: Shape::Neutral.category(),
                    image_index: Some(0),
                    buffer: false,
                })
                .collect(),
            frame_rate: 10,
            audio_duration: n as f64 / 10.0,
            audio_frames: n,
            features: Vec::new(),
        }
    }

    #[test]
    fn temporary_audio_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let waveform = Waveform::new(vec![0.5, -0.5, 2.0], 8000);
        let path = {
            let track = AudioTrack::write(&dir.path().join("out.mp4"), &waveform).unwrap();
            let reader = hound::WavReader::open(&track.path).unwrap();
            assert_eq!(reader.len(), 3);
            track.path.clone()
        };
        assert!(!path.exists());
    }

    #[test]
    fn empty_track_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = ShapeCatalog::new();
        catalog.insert(Shape::Neutral, ShapeImage::new("n.png", vec![1u8]));
        let renderer = FrameRenderer::new(&catalog, Box::new(Solid), 32, 32, [0, 0, 0, 255]);
        let track = track(0);
        let waveform = Waveform::new(vec![0.0; 10], 100);
        let job = ExportJob {
            track: &track,
            catalog: &catalog,
            waveform: &waveform,
            audio_name: String::new(),
            library_name: String::new(),
        };
        let err = VideoEncoder::new(renderer, settings()).encode(
            &job,
            &dir.path().join("out.mp4"),
            &RunControl::new(),
            &NoProgress,
        );
        assert!(matches!(err, Err(LipsyncError::Export(ExportError::NoFrames))));
    }

    #[test]
    fn encodes_mp4_when_ffmpeg_is_installed() {
        if !ffmpeg::available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut catalog = ShapeCatalog::new();
        catalog.insert(Shape::Neutral, ShapeImage::new("n.png", vec![1u8]));
        let renderer = FrameRenderer::new(&catalog, Box::new(Solid), 32, 32, [0, 0, 0, 255]);
        let track = track(5);
        let waveform = Waveform::new(vec![0.0; 4000], 8000);
        let job = ExportJob {
            track: &track,
            catalog: &catalog,
            waveform: &waveform,
            audio_name: "a.wav".into(),
            library_name: "lib".into(),
        };
        VideoEncoder::new(renderer, settings())
            .encode(&job, &output, &RunControl::new(), &NoProgress)
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        // Only the finished video remains: no partial file, no temporary audio.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
