use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lipsync::audio::SpectrumMethod;
use lipsync::viseme::{MappingMode, Shape};

#[derive(Parser, Debug)]
#[command(name = "lipsync", about = "Audio-driven mouth shape animation generator")]
pub struct Cli {
    /// Config file (defaults to lipsync.toml or ~/.config/lipsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding saved shape libraries
    #[arg(long, global = true)]
    pub library_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an animation and export it as a video or a zipped image sequence
    Generate(GenerateArgs),
    /// Print the shape timeline for an audio file without exporting
    Analyze(AnalyzeArgs),
    /// Manage saved shape libraries
    #[command(subcommand)]
    Library(LibraryCommand),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub audio: PathBuf,

    /// Shape library: a .zip package, an image directory, or a saved library name
    #[arg(short, long)]
    pub library: String,

    /// Output file; `.zip` writes an image sequence, anything else a video
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    #[command(flatten)]
    pub generation: GenerationArgs,

    #[command(flatten)]
    pub render: RenderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Input audio file
    pub audio: PathBuf,

    /// Shape library: a .zip package, an image directory, or a saved library name
    #[arg(short, long)]
    pub library: String,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Print one line per frame
    #[arg(long)]
    pub timeline: bool,

    /// Print the frames and distribution as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Render this frame (0-based) to a PNG
    #[arg(long)]
    pub preview_frame: Option<usize>,

    /// Where to write the preview frame
    #[arg(long, default_value = "preview.png")]
    pub preview_out: PathBuf,

    #[command(flatten)]
    pub render: RenderArgs,
}

#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    /// Frames per second
    #[arg(long, default_value_t = 24)]
    pub fps: u32,

    /// Volume/energy gain applied before classification
    #[arg(long, default_value_t = 1.4)]
    pub sensitivity: f32,

    /// Feature smoothing radius in frames
    #[arg(long, default_value_t = 3)]
    pub smoothing: u32,

    /// Extra frames to hold each shape
    #[arg(long, default_value_t = 5)]
    pub hold_pause: u32,

    /// 0.0 favours open vowels, 1.0 favours S/Ee/D
    #[arg(long, default_value_t = 0.5)]
    pub phoneme_bias: f32,

    /// Per-shape weight, e.g. `--bias Aa=1.5 --bias W-Oo=0`
    #[arg(long = "bias", value_parser = parse_bias)]
    pub biases: Vec<(Shape, f32)>,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Shape selection strategy
    #[arg(long, value_enum)]
    pub mode: Option<MappingMode>,

    /// Spectrum backend
    #[arg(long, value_enum)]
    pub method: Option<SpectrumMethod>,

    /// Seconds of neutral frames after the audio ends
    #[arg(long, default_value_t = 0.1)]
    pub buffer: f64,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Video width in pixels
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 512)]
    pub height: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Background colour behind transparent images (#rrggbb)
    #[arg(long, default_value = "#ffffff")]
    pub background: String,

    /// Draw the shape name and timestamp on each frame
    #[arg(long)]
    pub overlay: bool,

    /// Font for the overlay: a local path or an http(s) URL
    #[arg(long)]
    pub font: Option<String>,

    /// Overlay font size in pixels (defaults to a fraction of the frame size)
    #[arg(long)]
    pub font_size: Option<f32>,

    /// Overlay text colour (#rrggbb or #rrggbbaa)
    #[arg(long)]
    pub overlay_color: Option<String>,

    /// Give up on the export after this many seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum LibraryCommand {
    /// List saved libraries
    List,
    /// Save a .zip package or an image directory under a name
    Import {
        path: PathBuf,
        /// Name to save under (defaults to the package name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Write a saved library out as a .zip package
    Export { name: String, output: PathBuf },
    /// Delete a saved library
    Delete { name: String },
    /// Talk to a library storage service
    Remote {
        /// Service base URL (defaults to `storage.server` from the config)
        #[arg(long)]
        server: Option<String>,
        #[command(subcommand)]
        command: RemoteCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// Check that the service is up
    Health,
    /// List libraries on the service
    List,
    /// Upload a saved library, .zip package or image directory
    Upload { library: String },
    /// Download a library and save it locally
    Download { name: String },
    /// Delete a library on the service
    Delete { name: String },
}

fn parse_bias(text: &str) -> Result<(Shape, f32), String> {
    let (label, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected SHAPE=WEIGHT, got '{}'", text))?;
    let shape = Shape::from_label(label).ok_or_else(|| format!("unknown shape '{}'", label))?;
    let weight: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid weight '{}'", value))?;
    if !weight.is_finite() || weight < 0.0 {
        return Err(format!("weight must be a non-negative number, got {}", weight));
    }
    Ok((shape, weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_with_biases() {
        let cli = Cli::try_parse_from([
            "lipsync",
            "generate",
            "voice.wav",
            "--library",
            "faces.zip",
            "--bias",
            "Aa=1.5",
            "--bias",
            "w-oo=0",
            "--seed",
            "9",
            "--mode",
            "volume",
            "-o",
            "out.zip",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.generation.biases, vec![(Shape::Aa, 1.5), (Shape::WOo, 0.0)]);
        assert_eq!(args.generation.seed, Some(9));
        assert_eq!(args.generation.mode, Some(MappingMode::Volume));
        assert_eq!(args.generation.fps, 24);
        assert_eq!(args.output, PathBuf::from("out.zip"));
    }

    #[test]
    fn parses_render_overrides() {
        let cli = Cli::try_parse_from([
            "lipsync",
            "analyze",
            "voice.wav",
            "-l",
            "faces",
            "--overlay",
            "--overlay-color",
            "#ffcc00c0",
            "--preview-frame",
            "3",
        ])
        .unwrap();
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert!(args.render.overlay);
        assert_eq!(args.render.overlay_color.as_deref(), Some("#ffcc00c0"));
        assert_eq!(args.render.background, "#ffffff");
        assert_eq!(args.preview_frame, Some(3));
    }

    #[test]
    fn rejects_bad_bias() {
        assert!(parse_bias("Aa").is_err());
        assert!(parse_bias("Zz=1").is_err());
        assert!(parse_bias("Aa=-1").is_err());
    }

    #[test]
    fn parses_remote_commands() {
        let cli = Cli::try_parse_from([
            "lipsync",
            "library",
            "remote",
            "--server",
            "http://localhost:3000",
            "download",
            "faces",
        ])
        .unwrap();
        match cli.command {
            Command::Library(LibraryCommand::Remote { server, command }) => {
                assert_eq!(server.as_deref(), Some("http://localhost:3000"));
                assert!(matches!(command, RemoteCommand::Download { ref name } if name == "faces"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
