pub mod buffer;
pub mod classifier;
pub mod decoder;

pub use buffer::{Frame, FrameBuffer};
pub use classifier::{
    ClassifiedEvent, Completion, DetectionStrategy, Marker, PhaseClassifier, PhaseState,
    TextUpdate,
};
pub use decoder::FrameDecoder;
