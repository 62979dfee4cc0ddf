//! Optimisation loop step.

use candle_core::{DType, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use tracing::{info, warn};

use super::loss::MaskedLoss;
use super::targets::prepare_gaussian_targets;
use crate::config::TrainingConfig;
use crate::error::BoundaryResult;
use crate::model::CompressedBoundaryModel;
use crate::types::ClipBatch;

/// Result of one [`BoundaryTrainer::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Parameters were updated.
    Updated { loss: f32, valid_frames: usize },
    /// The batch had no valid frame; parameters are unchanged.
    Skipped,
}

/// AdamW over every variable of a [`CompressedBoundaryModel`].
pub struct BoundaryTrainer {
    optimizer: AdamW,
    sigma: f32,
    steps: usize,
}

impl BoundaryTrainer {
    pub fn new(model: &CompressedBoundaryModel, config: &TrainingConfig) -> BoundaryResult<Self> {
        config.validate()?;
        let params = ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: config.weight_decay,
            ..Default::default()
        };
        let optimizer = AdamW::new(model.varmap().all_vars(), params)?;
        Ok(Self {
            optimizer,
            sigma: config.sigma,
            steps: 0,
        })
    }

    /// Number of parameter updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Smooth `labels` `(B, T)` into targets, run a training forward pass and
    /// apply one optimiser update.
    pub fn step(
        &mut self,
        model: &CompressedBoundaryModel,
        batch: &ClipBatch,
        labels: &Tensor,
    ) -> BoundaryResult<StepOutcome> {
        let targets = prepare_gaussian_targets(labels, self.sigma)?;
        let (loss, valid_frames) = match model.loss(batch, &targets, true)? {
            MaskedLoss::Computed { loss, valid_frames } => (loss, valid_frames),
            MaskedLoss::NoValidFrames => {
                warn!(step = self.steps, "Batch has no valid frames; skipping update");
                return Ok(StepOutcome::Skipped);
            }
        };

        let loss_value = loss.to_dtype(DType::F32)?.to_scalar::<f32>()?;
        self.optimizer.backward_step(&loss)?;
        self.steps += 1;

        info!(
            step = self.steps,
            loss = loss_value,
            valid_frames,
            "Applied training step"
        );
        Ok(StepOutcome::Updated {
            loss: loss_value,
            valid_frames,
        })
    }
}
