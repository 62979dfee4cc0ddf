//! Motion-compensated feature propagation.
//!
//! - [`warp`]: the warp boundary and a host bilinear implementation
//! - [`buffer`]: the write-once per-video buffer
//! - [`bridge`]: straight-through gradient around the warp
//! - [`propagator`]: the decode-order walk

pub mod bridge;
pub mod buffer;
pub mod propagator;
pub mod warp;

pub use bridge::GradientBridge;
pub use buffer::PropagationBuffer;
pub use propagator::{MotionCompensatedPropagator, PropagationOutput, PropagationTrace};
pub use warp::{BilinearMotionWarp, MotionWarp, ReferenceMaps};
