//! Error types shared by the analysis, library and export layers.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level errors surfaced by a generation or export run.
#[derive(Error, Debug)]
pub enum LipsyncError {
    /// Missing or corrupt input (audio, configuration values).
    #[error("Invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    /// The computed animation would end before the audio does.
    #[error(
        "Animation too short: {animation:.3}s of frames for {audio:.3}s of audio ({:.1}% coverage)",
        .coverage * 100.0
    )]
    Coverage {
        animation: f64,
        audio: f64,
        coverage: f64,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded its time limit")]
    TimedOut,

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from reading, writing or transferring shape libraries.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Invalid library archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid library manifest: {0}")]
    Manifest(String),

    #[error("Library not found: {0}")]
    NotFound(String),

    #[error("Invalid library name: {0:?}")]
    InvalidName(String),

    #[error("Library storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library service error: {0}")]
    Http(String),
}

/// Errors from an encoder. A failed export never leaves its output file behind.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to start encoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with error:\n{0}")]
    Encoder(String),

    #[error("Encoder produced no output at {0}")]
    EmptyOutput(PathBuf),

    #[error("Encoder did not finish within {0}s")]
    Timeout(u64),

    #[error("Nothing to export: the animation has no frames")]
    NoFrames,

    #[error("The shape library has no images to export")]
    NoImages,

    #[error("Failed to rasterize '{image}': {reason}")]
    Rasterize { image: String, reason: String },

    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write audio track: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T, E = LipsyncError> = std::result::Result<T, E>;
