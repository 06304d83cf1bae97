mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use cli::{AnalyzeArgs, Cli, Command, GenerateArgs, GenerationArgs, LibraryCommand, RemoteCommand, RenderArgs};
use config::Config;
use lipsync::audio::{decode_audio, Waveform};
use lipsync::encode::ffmpeg::{self, VideoSettings};
use lipsync::encode::{Encoder, ExportJob, ImageSequenceEncoder, VideoEncoder};
use lipsync::library::{default_store_dir, LibraryStore, RemoteLibraries, ShapeLibrary};
use lipsync::render::{parse_color, FfmpegRasterizer, FrameRenderer, TextOverlay};
use lipsync::run::{Progress, RunControl, Stage};
use lipsync::viseme::{AnimationSequencer, AnimationTrack, BiasConfiguration, GenerationRequest};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    let store = LibraryStore::new(
        cli.library_dir
            .clone()
            .or_else(|| config.storage.dir.clone())
            .unwrap_or_else(default_store_dir),
    );

    match cli.command {
        Command::Generate(mut args) => {
            merge_generation(&mut args.generation, &config);
            merge_render(&mut args.render, &config);
            generate(&args, &config, &store)
        }
        Command::Analyze(mut args) => {
            merge_generation(&mut args.generation, &config);
            merge_render(&mut args.render, &config);
            analyze(&args, &config, &store)
        }
        Command::Library(command) => library(command, &config, &store),
    }
}

/// Config values apply only when the CLI flag is at its default.
fn merge_generation(args: &mut GenerationArgs, cfg: &Config) {
    let generation = &cfg.generation;
    if args.fps == 24 { args.fps = generation.fps; }
    if args.sensitivity == 1.4 { args.sensitivity = generation.sensitivity; }
    if args.buffer == 0.1 { args.buffer = generation.buffer; }
    if args.smoothing == 3 { args.smoothing = cfg.bias.smoothing; }
    if args.hold_pause == 5 { args.hold_pause = cfg.bias.hold_pause; }
    if args.phoneme_bias == 0.5 { args.phoneme_bias = cfg.bias.phoneme_bias; }
    if args.seed.is_none() { args.seed = generation.seed; }
    if args.mode.is_none() { args.mode = Some(generation.mode); }
    if args.method.is_none() { args.method = Some(generation.method); }
}

fn merge_render(args: &mut RenderArgs, cfg: &Config) {
    let output = &cfg.output;
    if args.width == 512 { args.width = output.width; }
    if args.height == 512 { args.height = output.height; }
    if args.codec == "libx264" { args.codec = output.codec.clone(); }
    if args.pix_fmt == "yuv420p" { args.pix_fmt = output.pix_fmt.clone(); }
    if args.crf == 18 { args.crf = output.crf; }
    if args.bitrate.is_none() { args.bitrate = output.bitrate.clone(); }
    if args.background == "#ffffff" { args.background = output.background.clone(); }
    if !args.overlay { args.overlay = output.overlay; }
    if args.font.is_none() { args.font = output.font.clone(); }
    if args.font_size.is_none() { args.font_size = output.font_size; }
    if args.overlay_color.is_none() { args.overlay_color = output.overlay_color.clone(); }
    if args.timeout == 600 { args.timeout = cfg.export.timeout_secs; }
}

fn build_request(args: &GenerationArgs, cfg: &Config) -> (GenerationRequest, BiasConfiguration) {
    let request = GenerationRequest {
        frame_rate: args.fps,
        sensitivity: args.sensitivity,
        buffer: args.buffer,
        seed: args.seed,
        mode: args.mode.unwrap_or_default(),
        method: args.method.unwrap_or_default(),
    };

    let mut bias = cfg.bias.clone();
    bias.smoothing = args.smoothing;
    bias.hold_pause = args.hold_pause;
    bias.phoneme_bias = args.phoneme_bias;
    for &(shape, weight) in &args.biases {
        bias = bias.with_shape(shape, weight);
    }
    (request, bias)
}

/// A saved library name, or a path to a package or image directory.
fn resolve_library(source: &str, store: &LibraryStore) -> Result<ShapeLibrary> {
    let path = Path::new(source);
    let library = if path.exists() {
        ShapeLibrary::open(path)
            .with_context(|| format!("Failed to load shape library: {}", path.display()))?
    } else {
        store
            .load(source)
            .with_context(|| format!("No library file or saved library named '{}'", source))?
    };
    log::info!(
        "Library: {} ({} shapes)",
        library.manifest.display_name(),
        library.catalog.len()
    );
    Ok(library)
}

fn run_pipeline(
    audio: &Path,
    generation: &GenerationArgs,
    cfg: &Config,
    library: &ShapeLibrary,
    control: &RunControl,
    bars: &StageBars,
) -> Result<(Waveform, AnimationTrack)> {
    log::info!("Decoding audio...");
    let waveform = decode_audio(audio, Some(control))
        .with_context(|| format!("Failed to decode {}", audio.display()))?;
    log::info!(
        "Audio: {:.2}s @ {} Hz, {} channel(s)",
        waveform.duration(),
        waveform.sample_rate,
        waveform.channels
    );

    let (request, bias) = build_request(generation, cfg);
    let sequencer = AnimationSequencer::new(&library.catalog, &bias, &request);
    let track = sequencer.generate(&waveform, control, bars)?;
    bars.finish();
    log::info!(
        "Generated {} frames ({:.2}s, {:.1}% of the audio)",
        track.frames.len(),
        track.duration(),
        track.coverage() * 100.0
    );
    Ok((waveform, track))
}

fn generate(args: &GenerateArgs, cfg: &Config, store: &LibraryStore) -> Result<()> {
    log::info!("Input: {}", args.audio.display());
    log::info!("Output: {}", args.output.display());

    let library = resolve_library(&args.library, store)?;
    let control = RunControl::with_timeout(Duration::from_secs(args.render.timeout));
    let bars = StageBars::new();
    let (waveform, track) = run_pipeline(&args.audio, &args.generation, cfg, &library, &control, &bars)?;

    let job = ExportJob {
        track: &track,
        catalog: &library.catalog,
        waveform: &waveform,
        audio_name: file_name(&args.audio),
        library_name: library.manifest.display_name().to_string(),
    };

    let is_zip = args
        .output
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"));
    let mut encoder: Box<dyn Encoder + '_> = if is_zip {
        Box::new(ImageSequenceEncoder::new())
    } else {
        let renderer = build_renderer(&args.render, &library)?;
        let settings = VideoSettings {
            width: args.render.width,
            height: args.render.height,
            fps: track.frame_rate,
            codec: args.render.codec.clone(),
            pix_fmt: args.render.pix_fmt.clone(),
            crf: args.render.crf,
            bitrate: args.render.bitrate.clone(),
            timeout: Duration::from_secs(args.render.timeout),
        };
        Box::new(VideoEncoder::new(renderer, settings))
    };

    log::info!("Exporting with the {} encoder...", encoder.name());
    encoder.encode(&job, &args.output, &control, &bars)?;
    bars.finish();

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn analyze(args: &AnalyzeArgs, cfg: &Config, store: &LibraryStore) -> Result<()> {
    let library = resolve_library(&args.library, store)?;
    let control = RunControl::with_timeout(Duration::from_secs(args.render.timeout));
    let bars = StageBars::new();
    let (_, track) = run_pipeline(&args.audio, &args.generation, cfg, &library, &control, &bars)?;

    let distribution = track.distribution();
    if args.json {
        let report = serde_json::json!({
            "fps": track.frame_rate,
            "audioDuration": track.audio_duration,
            "totalFrames": track.frames.len(),
            "coverage": track.coverage(),
            "distribution": distribution,
            "frames": track.frames,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if args.timeline {
            for frame in &track.frames {
                println!(
                    "{:>9.3}s  #{:<6} {:<10} {}{}",
                    frame.time,
                    frame.frame_index,
                    frame.shape_name(),
                    frame.category,
                    if frame.buffer { "  (buffer)" } else { "" }
                );
            }
        }
        println!(
            "{} frames @ {}fps, {:.2}s of animation for {:.2}s of audio",
            track.frames.len(),
            track.frame_rate,
            track.duration(),
            track.audio_duration
        );
        for (shape, count) in &distribution {
            println!(
                "  {:<10} {:>6}  {:>5.1}%",
                shape.name(),
                count,
                *count as f64 / track.frames.len().max(1) as f64 * 100.0
            );
        }
    }

    if let Some(index) = args.preview_frame {
        let frame = track
            .frames
            .get(index)
            .with_context(|| format!("Frame {} is out of range (0-{})", index, track.frames.len().saturating_sub(1)))?;
        let mut renderer = build_renderer(&args.render, &library)?;
        let pixels = renderer.render_or_substitute(frame);
        ffmpeg::write_png(
            &pixels,
            args.render.width,
            args.render.height,
            &args.preview_out,
            Duration::from_secs(args.render.timeout),
        )?;
        log::info!(
            "Frame {} ({}) written to {}",
            index,
            frame.shape_name(),
            args.preview_out.display()
        );
    }
    Ok(())
}

fn build_renderer<'a>(args: &RenderArgs, library: &'a ShapeLibrary) -> Result<FrameRenderer<'a>> {
    let background = parse_color(&args.background)
        .with_context(|| format!("Invalid background colour '{}'", args.background))?;
    let rasterizer = FfmpegRasterizer::new(background, Duration::from_secs(args.timeout));
    let overlay_color = args
        .overlay_color
        .as_deref()
        .map(|text| parse_color(text).with_context(|| format!("Invalid overlay colour '{}'", text)))
        .transpose()?;

    let overlay = if args.overlay {
        match args.font.as_deref() {
            Some(font) => {
                let shorter = args.width.min(args.height) as f32;
                let size = args.font_size.unwrap_or((shorter * 0.06).max(12.0));
                match TextOverlay::load(font, size) {
                    Ok(overlay) => Some(match overlay_color {
                        Some(color) => overlay.with_color(color),
                        None => overlay,
                    }),
                    Err(err) => {
                        log::warn!("Overlay disabled: {:#}", err);
                        None
                    }
                }
            }
            None => {
                log::warn!("Overlay disabled: no font configured (--font or output.font)");
                None
            }
        }
    } else {
        None
    };

    Ok(FrameRenderer::new(
        &library.catalog,
        Box::new(rasterizer),
        args.width,
        args.height,
        background,
    )
    .with_overlay(overlay))
}

fn library(command: LibraryCommand, cfg: &Config, store: &LibraryStore) -> Result<()> {
    match command {
        LibraryCommand::List => {
            let libraries = store.list()?;
            if libraries.is_empty() {
                println!("No libraries in {}", store.root().display());
            }
            for lib in libraries {
                println!(
                    "  {:<24} {:<28} {:>3} images  {:>8} bytes",
                    lib.name, lib.display_name, lib.image_count, lib.size
                );
            }
        }
        LibraryCommand::Import { path, name } => {
            let mut library = ShapeLibrary::open(&path)
                .with_context(|| format!("Failed to load shape library: {}", path.display()))?;
            if let Some(name) = name {
                library.manifest.name = name;
            }
            let saved = store.save(&library)?;
            println!("Saved '{}' to {}", library.name(), saved.display());
        }
        LibraryCommand::Export { name, output } => {
            let library = store.load(&name)?;
            std::fs::write(&output, library.to_zip_bytes()?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported '{}' to {}", name, output.display());
        }
        LibraryCommand::Delete { name } => {
            store.delete(&name)?;
            println!("Deleted '{}'", name);
        }
        LibraryCommand::Remote { server, command } => {
            let server = server
                .or_else(|| cfg.storage.server.clone())
                .context("No storage service configured (--server or storage.server)")?;
            let remote = RemoteLibraries::new(&server, HTTP_TIMEOUT)?;
            match command {
                RemoteCommand::Health => {
                    let health = remote.health()?;
                    println!("{}: {} (version {})", server, health.status, health.version);
                }
                RemoteCommand::List => {
                    for (name, lib) in remote.list()? {
                        println!("  {:<24} {:<28} {:>3} images", name, lib.display_name, lib.image_count);
                    }
                }
                RemoteCommand::Upload { library } => {
                    let library = resolve_library(&library, store)?;
                    let name = remote.upload(&library)?;
                    println!("Uploaded '{}'", name);
                }
                RemoteCommand::Download { name } => {
                    let bytes = remote.download_bytes(&name)?;
                    let saved = store.save_bytes(&name, &bytes)?;
                    println!("Downloaded '{}' to {}", name, saved.display());
                }
                RemoteCommand::Delete { name } => {
                    remote.delete(&name)?;
                    println!("Deleted remote '{}'", name);
                }
            }
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

/// One indicatif bar per pipeline stage; rendering and encoding share a bar.
struct StageBars {
    current: Mutex<Option<(&'static str, ProgressBar)>>,
}

impl StageBars {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    fn finish(&self) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((_, bar)) = current.take() {
            bar.finish();
        }
    }
}

impl Progress for StageBars {
    fn update(&self, stage: Stage, done: usize, total: usize) {
        let label = match stage {
            Stage::Extract => "extract",
            Stage::Sequence => "sequence",
            Stage::Render | Stage::Export => "export",
        };
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if current.as_ref().map_or(true, |(l, _)| *l != label) {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:>8} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar.set_message(label);
            *current = Some((label, bar));
        }
        if let Some((_, bar)) = current.as_ref() {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        }
    }
}
