use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ExportError;

pub const FFMPEG: &str = "ffmpeg";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settings for the streamed video encode.
#[derive(Clone, Debug)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
    pub timeout: Duration,
}

/// ffmpeg child fed raw RGBA frames on stdin.
///
/// A watchdog kills the process once `timeout` has passed, which also unblocks
/// a stuck `write_frame`. Dropping an unfinished encoder kills the process.
pub struct FfmpegEncoder {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    done: Arc<AtomicBool>,
    timed_out: Arc<AtomicBool>,
    timeout: Duration,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &VideoSettings) -> Result<Self, ExportError> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgba".into(),
            "-video_size".into(), format!("{}x{}", settings.width, settings.height),
            "-framerate".into(), settings.fps.to_string(),
            "-i".into(), "pipe:0".into(),
            "-i".into(), input_audio.to_string_lossy().into_owned(),
            "-map".into(), "0:v:0".into(),
            "-map".into(), "1:a:0".into(),
            "-c:v".into(), settings.codec.clone(),
            "-pix_fmt".into(), settings.pix_fmt.clone(),
        ];

        if let Some(ref br) = settings.bitrate {
            args.extend(["-b:v".to_string(), br.clone()]);
        } else {
            args.extend(["-crf".to_string(), settings.crf.to_string()]);
            args.extend(["-preset".to_string(), "medium".to_string()]);
        }

        // No -shortest: the trailing buffer frames must survive past the audio.
        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            output_path.to_string_lossy().into_owned(),
        ]);

        let mut child = spawn(Command::new(FFMPEG).args(&args).stdin(Stdio::piped()).stdout(Stdio::null()))?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(drain);

        let child = Arc::new(Mutex::new(child));
        let done = Arc::new(AtomicBool::new(false));
        let timed_out = Arc::new(AtomicBool::new(false));
        watchdog(Arc::clone(&child), Arc::clone(&done), Arc::clone(&timed_out), settings.timeout);

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width, settings.height, settings.fps, settings.codec
        );

        Ok(Self {
            child,
            stdin,
            stderr,
            done,
            timed_out,
            timeout: settings.timeout,
            frame_bytes: settings.width as usize * settings.height as usize * 4,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<(), ExportError> {
        if rgba_pixels.len() != self.frame_bytes {
            return Err(ExportError::Encoder(format!(
                "frame has {} bytes, expected {}",
                rgba_pixels.len(),
                self.frame_bytes
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::Encoder("ffmpeg stdin not available".into()))?;
        if let Err(e) = stdin.write_all(rgba_pixels) {
            if self.timed_out.load(Ordering::SeqCst) {
                return Err(ExportError::Timeout(self.timeout.as_secs()));
            }
            return Err(ExportError::Encoder(format!(
                "failed to write frame to ffmpeg: {}\n{}",
                e,
                self.collect_stderr()
            )));
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), ExportError> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let status = loop {
            if self.timed_out.load(Ordering::SeqCst) {
                return Err(ExportError::Timeout(self.timeout.as_secs()));
            }
            let polled = lock(&self.child).try_wait()?;
            if let Some(status) = polled {
                break status;
            }
            thread::sleep(POLL_INTERVAL);
        };
        self.done.store(true, Ordering::SeqCst);

        if !status.success() {
            return Err(ExportError::Encoder(self.collect_stderr()));
        }
        log::info!("FFmpeg encoding complete");
        Ok(())
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|h| h.join().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        drop(self.stdin.take());
        let mut child = lock(&self.child);
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Run ffmpeg to completion with optional stdin bytes, killing it after `timeout`.
pub fn run(args: &[String], input: Option<&[u8]>, timeout: Duration) -> Result<Output, ExportError> {
    let mut command = Command::new(FFMPEG);
    command
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped());
    let mut child = spawn(&mut command)?;

    let writer = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => {
            let bytes = bytes.to_vec();
            Some(thread::spawn(move || {
                let _ = stdin.write_all(&bytes);
            }))
        }
        _ => None,
    };
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExportError::Timeout(timeout.as_secs()));
        }
        thread::sleep(POLL_INTERVAL);
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let join = |h: Option<JoinHandle<Vec<u8>>>| h.and_then(|h| h.join().ok()).unwrap_or_default();
    Ok(Output {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    })
}

/// Whether an `ffmpeg` binary can be started.
pub fn available() -> bool {
    Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encode one RGBA buffer to a PNG file.
pub fn write_png(pixels: &[u8], width: u32, height: u32, path: &Path, timeout: Duration) -> Result<(), ExportError> {
    let args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-i".into(), "pipe:0".into(),
        "-frames:v".into(), "1".into(),
        path.to_string_lossy().into_owned(),
    ];
    let output = run(&args, Some(pixels), timeout)?;
    if !output.status.success() {
        return Err(ExportError::Encoder(String::from_utf8_lossy(&output.stderr).trim().to_string()));
    }
    Ok(())
}

fn spawn(command: &mut Command) -> Result<Child, ExportError> {
    command
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ExportError::Spawn {
            program: FFMPEG.to_string(),
            source,
        })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn lock(child: &Mutex<Child>) -> std::sync::MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn watchdog(child: Arc<Mutex<Child>>, done: Arc<AtomicBool>, timed_out: Arc<AtomicBool>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    thread::spawn(move || loop {
        if done.load(Ordering::SeqCst) {
            return;
        }
        if Instant::now() >= deadline {
            let mut child = lock(&child);
            if let Ok(None) = child.try_wait() {
                log::warn!("FFmpeg exceeded {}s, killing it", timeout.as_secs());
                timed_out.store(true, Ordering::SeqCst);
                let _ = child.kill();
            }
            return;
        }
        thread::sleep(Duration::from_millis(50));
    });
}
