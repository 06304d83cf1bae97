use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use lipsync::audio::SpectrumMethod;
use lipsync::viseme::{BiasConfiguration, MappingMode};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub bias: BiasConfiguration,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_buffer")]
    pub buffer: f64,
    pub seed: Option<u64>,
    #[serde(default)]
    pub mode: MappingMode,
    #[serde(default)]
    pub method: SpectrumMethod,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    pub bitrate: Option<String>,
    #[serde(default = "default_background")]
    pub background: String,
    /// Path or URL of a TTF/OTF font for the label overlay
    pub font: Option<String>,
    pub font_size: Option<f32>,
    #[serde(default)]
    pub overlay: bool,
    /// Overlay text colour (#rrggbb or #rrggbbaa)
    pub overlay_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Local library directory; defaults to the platform data dir
    pub dir: Option<PathBuf>,
    /// Base URL of the library storage service
    pub server: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            sensitivity: default_sensitivity(),
            buffer: default_buffer(),
            seed: None,
            mode: MappingMode::default(),
            method: SpectrumMethod::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            crf: default_crf(),
            bitrate: None,
            background: default_background(),
            font: None,
            font_size: None,
            overlay: false,
            overlay_color: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_fps() -> u32 { 24 }
fn default_sensitivity() -> f32 { 1.4 }
fn default_buffer() -> f64 { lipsync::viseme::sequencer::DEFAULT_BUFFER_SECS }
fn default_width() -> u32 { 512 }
fn default_height() -> u32 { 512 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_crf() -> u32 { 18 }
fn default_background() -> String { "#ffffff".into() }
fn default_timeout() -> u64 { 600 }

/// `--config`, then `./lipsync.toml`, `~/.config/lipsync/config.toml`, and the
/// platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("lipsync.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("lipsync").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("lipsync").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lipsync::viseme::Shape;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.generation.fps, 24);
        assert_eq!(cfg.generation.sensitivity, 1.4);
        assert_eq!(cfg.bias, BiasConfiguration::default());
        assert_eq!(cfg.export.timeout_secs, 600);
        assert!(cfg.storage.server.is_none());
    }

    #[test]
    fn parses_all_sections() {
        let cfg: Config = toml::from_str(
            r##"
            [generation]
            fps = 30
            seed = 7
            mode = "volume"
            method = "fft"

            [bias]
            phoneme_bias = 0.8
            hold_pause = 2

            [bias.shapes]
            Aa = 1.5
            "W-Oo" = 0.0

            [output]
            width = 640
            bitrate = "2M"
            overlay = true
            overlay_color = "#ffcc00c0"

            [export]
            timeout_secs = 30

            [storage]
            server = "http://localhost:3000"
            "##,
        )
        .unwrap();
        assert_eq!(cfg.generation.fps, 30);
        assert_eq!(cfg.generation.seed, Some(7));
        assert_eq!(cfg.generation.mode, MappingMode::Volume);
        assert_eq!(cfg.generation.method, SpectrumMethod::Fft);
        assert_eq!(cfg.bias.multiplier(Shape::Aa), 1.5);
        assert_eq!(cfg.bias.multiplier(Shape::WOo), 0.0);
        assert_eq!(cfg.bias.smoothing, 3);
        assert_eq!(cfg.output.width, 640);
        assert_eq!(cfg.output.height, 512);
        assert_eq!(cfg.output.bitrate.as_deref(), Some("2M"));
        assert_eq!(cfg.output.overlay_color.as_deref(), Some("#ffcc00c0"));
        assert_eq!(cfg.export.timeout_secs, 30);
        assert_eq!(cfg.storage.server.as_deref(), Some("http://localhost:3000"));
    }
}
