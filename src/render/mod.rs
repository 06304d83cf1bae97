pub mod frame;
pub mod raster;
pub mod text;

pub use frame::FrameRenderer;
pub use raster::{parse_color, FfmpegRasterizer, Rasterizer};
pub use text::TextOverlay;
