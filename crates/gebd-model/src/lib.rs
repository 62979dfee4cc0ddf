//! Generic event boundary detection on compressed video.
//!
//! Boundaries are predicted from codec side data (motion vectors and
//! residuals) rather than decoded RGB frames. Dense features of anchor
//! frames are carried to the other frames of a group of pictures by warping
//! along the codec's motion vectors, in decode order. A sliding-window
//! temporal encoder then scores each frame from the self-similarity of its
//! neighbourhood.
//!
//! # Architecture
//!
//! - **FeatureExtractor**: backbone over stacked side data
//! - **MotionCompensatedPropagator**: decode-order walk over a write-once buffer
//! - **MotionWarp**: warp boundary (host bilinear implementation included)
//! - **aggregate**: shifted-phase sliding windows (SPoS)
//! - **GroupSimilarityEncoder**: GRU + grouped cosine similarity + conv stack
//! - **BoundaryHead**: per-frame logits
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gebd_model::{BilinearMotionWarp, BoundaryConfig, CompressedBoundaryModel};
//!
//! let config = BoundaryConfig::from_file("gebd.toml")?.with_env_overrides();
//! config.validate()?;
//! let device = config.device.device()?;
//! let model = CompressedBoundaryModel::new(
//!     config.model,
//!     Arc::new(BilinearMotionWarp::new()),
//!     &device,
//! )?;
//! let scores = model.detect(&batch)?;
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod head;
pub mod layers;
pub mod model;
pub mod propagation;
pub mod refiner;
pub mod temporal;
pub mod training;
pub mod types;

pub use config::{BoundaryConfig, DeviceConfig, ModelConfig, SimilarityFunction, TrainingConfig};
pub use error::{BoundaryError, BoundaryResult};
pub use extractor::{ConvStemExtractor, ExtractedFeatures, FeatureExtractor};
pub use head::BoundaryHead;
pub use model::{BoundaryScores, CompressedBoundaryModel, TimeCost};
pub use propagation::{
    BilinearMotionWarp, GradientBridge, MotionCompensatedPropagator, MotionWarp,
    PropagationBuffer, PropagationOutput, PropagationTrace, ReferenceMaps,
};
pub use refiner::RelationRefiner;
pub use temporal::{
    aggregate, GroupSimilarityEncoder, MemorySink, SafetensorsDirSink, SimilaritySink,
    SimilarityWindow, WindowScorer,
};
pub use training::{
    masked_bce_with_logits, prepare_gaussian_targets, BoundaryTrainer, MaskedLoss, StepOutcome,
};
pub use types::{
    ClipBatch, DecodeOrder, Frame, Gop, MotionVectorField, ABSENT_FRAME, MOTION_CHANNELS,
};
