//! Input data model: frames, decode order, motion fields and clip batches.

mod clip;
mod frame;
mod motion;

pub use clip::{mask_to_rows, ClipBatch};
pub use frame::{frame_layout, DecodeOrder, Frame, Gop, ABSENT_FRAME};
pub use motion::{
    MotionVectorField, MOTION_CHANNELS, REFERENCE_LISTS, VECTOR_CHANNELS,
};
