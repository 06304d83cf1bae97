pub mod ffmpeg;
pub mod sequence;
pub mod video;

use std::path::{Path, PathBuf};

use crate::audio::Waveform;
use crate::error::{ExportError, LipsyncError, Result};
use crate::run::{Progress, RunControl};
use crate::viseme::{AnimationTrack, ShapeCatalog};

pub use sequence::ImageSequenceEncoder;
pub use video::VideoEncoder;

/// Everything an encoder consumes: the finished track, the images it points
/// at, and the audio it was generated from.
pub struct ExportJob<'a> {
    pub track: &'a AnimationTrack,
    pub catalog: &'a ShapeCatalog,
    pub waveform: &'a Waveform,
    /// Shown in manifests; usually the input file name.
    pub audio_name: String,
    pub library_name: String,
}

/// An output format for a generated animation.
///
/// Implementations must emit exactly one image per track frame, in order,
/// and must not leave a partial output behind on failure.
pub trait Encoder {
    fn name(&self) -> &'static str;

    fn encode(
        &mut self,
        job: &ExportJob,
        output: &Path,
        control: &RunControl,
        progress: &dyn Progress,
    ) -> Result<()>;
}

/// `<dir>/<stem>.partial.<ext>`: same extension so tools can still infer the format.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    output.with_file_name(name)
}

/// Run `write` against a partial path and move the result to `output` only if
/// it succeeded and produced a non-empty file. Any failure removes the partial file.
pub fn write_atomically<F>(output: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let partial = partial_path(output);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ExportError::Io)?;
    }

    let outcome = write(&partial).and_then(|_| {
        let len = std::fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(ExportError::EmptyOutput(output.to_path_buf()).into());
        }
        std::fs::rename(&partial, output).map_err(|e| LipsyncError::Export(ExportError::Io(e)))
    });

    if outcome.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            log::warn!("Could not remove {}: {}", partial.display(), e);
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_keeps_extension() {
        assert_eq!(partial_path(Path::new("out/video.mp4")), Path::new("out/video.partial.mp4"));
        assert_eq!(partial_path(Path::new("frames")), Path::new("frames.partial"));
    }

    #[test]
    fn failures_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.zip");

        let err = write_atomically(&output, |p| {
            std::fs::write(p, b"half")?;
            Err(LipsyncError::Cancelled)
        });
        assert!(matches!(err, Err(LipsyncError::Cancelled)));

        let empty = write_atomically(&output, |p| {
            std::fs::write(p, b"")?;
            Ok(())
        });
        assert!(matches!(empty, Err(LipsyncError::Export(ExportError::EmptyOutput(_)))));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomically(&output, |p| {
            std::fs::write(p, b"done")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"done");
    }
}
