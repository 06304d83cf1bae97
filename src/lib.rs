//! Audio-driven mouth shape animation.
//!
//! Audio is decoded and sliced into per-frame acoustic features
//! ([`audio`]), each frame is classified into a mouth shape and held or
//! released by a temporal stabilizer ([`viseme`]), and the resulting frame
//! sequence is exported as a video or an image sequence ([`encode`]).

pub mod audio;
pub mod encode;
pub mod error;
pub mod library;
pub mod render;
pub mod run;
pub mod viseme;

pub use error::{ExportError, LibraryError, LipsyncError, Result};
