pub mod bias;
pub mod catalog;
pub mod classifier;
pub mod sequencer;
pub mod shape;
pub mod stabilizer;

pub use bias::BiasConfiguration;
pub use catalog::{is_image_file, CatalogEntry, ShapeCatalog, ShapeChoice, ShapeImage};
pub use classifier::ShapeClassifier;
pub use sequencer::{
    AnimationFrame, AnimationSequencer, AnimationTrack, GenerationRequest, MappingMode,
};
pub use shape::{Shape, ShapeCategory};
pub use stabilizer::{HoldState, TemporalStabilizer};
