//! End-to-end boundary detector over compressed-video side data.
//!
//! ```text
//! mv ++ res ──> extractor ──┬─ primary (dim, H/32) ─────────────────────┐
//!                           └─ secondary (stem, H/4)                    │
//!                                │ 1x1 embedding to dim                 │
//!                                ▼                                      │
//!                 decode-order propagation (motion, order, mask)        │
//!                                │ gradient bridge (training)           │
//!                                ▼                                      ▼
//!                         relation refiner (H/32) ───────────────────> add
//!                                                                       │
//!                          global average pool ──> (B, dim, T) <────────┘
//!                                     │
//!                     SPoS aggregation with group similarity
//!                                     │
//!                           classifier head ──> logits (B, T)
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::{DType, Device, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, Module, VarBuilder, VarMap};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{BoundaryError, BoundaryResult};
use crate::extractor::{ConvStemExtractor, FeatureExtractor};
use crate::head::BoundaryHead;
use crate::layers::global_avg_pool2d;
use crate::propagation::{GradientBridge, MotionCompensatedPropagator, MotionWarp};
use crate::refiner::{RelationRefiner, REFINER_STRIDE};
use crate::temporal::{aggregate, GroupSimilarityEncoder, SimilaritySink};
use crate::training::{masked_bce_with_logits, MaskedLoss};
use crate::types::{ClipBatch, Gop};

/// Wall-clock split of one forward pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeCost {
    /// Feature extraction, propagation and refinement.
    pub backbone: Duration,
    /// Window aggregation and classification.
    pub head: Duration,
}

/// Per-frame boundary probabilities.
#[derive(Debug, Clone)]
pub struct BoundaryScores {
    /// `(B, T)` sigmoid probabilities.
    pub scores: Tensor,
    pub time_cost: TimeCost,
}

impl BoundaryScores {
    pub fn to_rows(&self) -> BoundaryResult<Vec<Vec<f32>>> {
        Ok(self.scores.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

pub struct CompressedBoundaryModel {
    config: ModelConfig,
    varmap: VarMap,
    extractor: Box<dyn FeatureExtractor>,
    embedding: Conv2d,
    propagator: MotionCompensatedPropagator,
    refiner: RelationRefiner,
    encoder: GroupSimilarityEncoder,
    head: BoundaryHead,
}

impl std::fmt::Debug for CompressedBoundaryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedBoundaryModel")
            .field("config", &self.config)
            .field("propagator", &self.propagator)
            .field("encoder", &self.encoder)
            .field("variables", &self.varmap.all_vars().len())
            .finish()
    }
}

impl CompressedBoundaryModel {
    /// Build a freshly initialised model with the convolutional extractor.
    ///
    /// # Errors
    /// Config validation errors (including `NotImplemented` for an unknown
    /// similarity function) and layer construction failures.
    pub fn new(
        config: ModelConfig,
        warp: Arc<dyn MotionWarp>,
        device: &Device,
    ) -> BoundaryResult<Self> {
        Self::with_extractor(config, warp, device, |cfg, vb| {
            let extractor = ConvStemExtractor::new(cfg, vb)?;
            Ok(Box::new(extractor) as Box<dyn FeatureExtractor>)
        })
    }

    /// Build with a caller-provided extractor, constructed from the model
    /// config under the `extractor` weight scope. The extractor must expose a
    /// secondary map.
    pub fn with_extractor<F>(
        config: ModelConfig,
        warp: Arc<dyn MotionWarp>,
        device: &Device,
        build_extractor: F,
    ) -> BoundaryResult<Self>
    where
        F: FnOnce(&ModelConfig, VarBuilder) -> BoundaryResult<Box<dyn FeatureExtractor>>,
    {
        config.validate()?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let extractor = build_extractor(&config, vb.pp("extractor"))?;
        if extractor.out_channels() != config.dim {
            return Err(BoundaryError::shape(
                "extractor output channels",
                config.dim,
                extractor.out_channels(),
            ));
        }
        let secondary = extractor.secondary_channels().ok_or_else(|| {
            BoundaryError::invalid("extractor does not expose a secondary feature map")
        })?;

        let embedding = conv2d(
            secondary,
            config.dim,
            1,
            Conv2dConfig::default(),
            vb.pp("embedding"),
        )?;
        let propagator = MotionCompensatedPropagator::new(warp, Gop::new(config.gop_size)?);
        let refiner = RelationRefiner::new(config.dim, vb.pp("refiner"))?;
        let encoder = GroupSimilarityEncoder::new(&config, vb.pp("encoder"))?;
        let head = BoundaryHead::new(config.dim, config.dim, vb.pp("head"))?;

        info!(
            dim = config.dim,
            group = config.group,
            window_half_size = config.window_half_size,
            gop_size = config.gop_size,
            variables = varmap.all_vars().len(),
            "Built boundary model"
        );

        Ok(Self {
            config,
            varmap,
            extractor,
            embedding,
            propagator,
            refiner,
            encoder,
            head,
        })
    }

    /// Route every similarity map through `sink`.
    pub fn with_similarity_sink(mut self, sink: Arc<dyn SimilaritySink>) -> Self {
        self.encoder = self.encoder.with_sink(sink);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Trainable parameters and batch-norm statistics.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Raw per-frame logits `(B, T)` and the timing split.
    pub fn forward_logits(
        &self,
        batch: &ClipBatch,
        train: bool,
    ) -> BoundaryResult<(Tensor, TimeCost)> {
        batch.validate()?;
        let (videos, frames) = (batch.num_videos(), batch.num_frames());

        let started = Instant::now();
        let side_data = Tensor::cat(&[&batch.mv, &batch.res], 2)?;
        let (_, _, channels, height, width) = side_data.dims5()?;
        let side_data = side_data.reshape((videos * frames, channels, height, width))?;

        let features = self.extractor.extract(&side_data, train)?;
        let secondary = features.secondary.ok_or_else(|| {
            BoundaryError::invalid("extractor returned no secondary feature map")
        })?;
        let embedded = self.embedding.forward(&secondary)?;
        let (_, dim, map_h, map_w) = embedded.dims4()?;
        let embedded = embedded.reshape((videos, frames, dim, map_h, map_w))?;

        let propagated = self.propagator.propagate(
            &embedded,
            &batch.motion,
            &batch.decode_order,
            &batch.frame_mask,
        )?;
        let relation = GradientBridge::for_mode(train).apply(&propagated.buffer, &embedded)?;
        let relation = self
            .refiner
            .forward(&relation.reshape((videos * frames, dim, map_h, map_w))?)?;

        if relation.dims() != features.primary.dims() {
            return Err(BoundaryError::shape(
                format!("refined relation map (stride {}) vs primary map", REFINER_STRIDE),
                features.primary.dims(),
                relation.dims(),
            ));
        }
        let fused = (relation + &features.primary)?;
        let sequence = global_avg_pool2d(&fused)?
            .reshape((videos, frames, dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let backbone = started.elapsed();

        let started = Instant::now();
        let aggregated = aggregate(&sequence, self.config.window_half_size, &self.encoder, train)?;
        let logits = self.head.forward(&aggregated)?.squeeze(1)?;
        let head = started.elapsed();

        debug!(
            videos,
            frames,
            train,
            backbone_ms = backbone.as_secs_f64() * 1000.0,
            head_ms = head.as_secs_f64() * 1000.0,
            "Forward pass complete"
        );

        Ok((logits, TimeCost { backbone, head }))
    }

    /// Inference: per-frame boundary probabilities.
    pub fn detect(&self, batch: &ClipBatch) -> BoundaryResult<BoundaryScores> {
        let (logits, time_cost) = self.forward_logits(batch, false)?;
        let scores = candle_nn::ops::sigmoid(&logits)?;
        Ok(BoundaryScores { scores, time_cost })
    }

    /// Masked BCE between the logits and soft `(B, T)` targets.
    ///
    /// Frames excluded by the batch's validity mask do not contribute.
    pub fn loss(
        &self,
        batch: &ClipBatch,
        targets: &Tensor,
        train: bool,
    ) -> BoundaryResult<MaskedLoss> {
        let (logits, _) = self.forward_logits(batch, train)?;
        masked_bce_with_logits(&logits, targets, &batch.frame_mask)
    }

    /// Write every variable to a safetensors checkpoint.
    pub fn save_weights(&self, path: impl AsRef<Path>) -> BoundaryResult<()> {
        let path = path.as_ref();
        self.varmap.save(path)?;
        info!(path = %path.display(), "Saved weights");
        Ok(())
    }

    /// Overwrite variables from a safetensors checkpoint.
    ///
    /// # Errors
    /// `TensorError` when the file is missing, a variable is absent from it,
    /// or shapes differ.
    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> BoundaryResult<()> {
        let path = path.as_ref();
        self.varmap.load(path)?;
        info!(path = %path.display(), "Loaded weights");
        Ok(())
    }
}
