//! Training utilities: soft targets, the masked loss and an AdamW step.

pub mod loss;
pub mod targets;
pub mod trainer;

pub use loss::{masked_bce_with_logits, MaskedLoss};
pub use targets::{gaussian_smooth, prepare_gaussian_targets};
pub use trainer::{BoundaryTrainer, StepOutcome};
