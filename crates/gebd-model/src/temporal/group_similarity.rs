//! Group-similarity window encoder.
//!
//! Scores a window by how its frames relate to each other rather than by the
//! features themselves: a recurrent encoder contextualizes the window, the
//! channels are split into `group` slices, and each slice yields an `L x L`
//! cosine self-similarity map. A small convolutional stack then reads the
//! maps like images and pools them to one vector per window.

use std::sync::Arc;

use candle_core::Tensor;
use candle_nn::rnn::{gru, GRUConfig, GRU, RNN};
use candle_nn::{ModuleT, VarBuilder};
use tracing::trace;

use super::sink::SimilaritySink;
use super::window::{SimilarityWindow, WindowScorer};
use crate::config::{ModelConfig, SimilarityFunction};
use crate::error::{BoundaryError, BoundaryResult};
use crate::layers::{global_avg_pool2d, l2_normalize, BasicConv2d, COSINE_EPS};

/// Convolutions applied to the stacked similarity maps.
const FCN_DEPTH: usize = 4;

pub struct GroupSimilarityEncoder {
    encoder: Vec<GRU>,
    fcn: Vec<BasicConv2d>,
    dim: usize,
    group: usize,
    similarity: SimilarityFunction,
    sink: Option<Arc<dyn SimilaritySink>>,
}

impl std::fmt::Debug for GroupSimilarityEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSimilarityEncoder")
            .field("dim", &self.dim)
            .field("group", &self.group)
            .field("gru_layers", &self.encoder.len())
            .field("similarity", &self.similarity)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl GroupSimilarityEncoder {
    /// Build from the model configuration.
    ///
    /// # Errors
    /// `ConfigError`/`NotImplemented` from [`ModelConfig::validate`].
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> BoundaryResult<Self> {
        config.validate()?;
        let dim = config.dim;

        let mut encoder = Vec::with_capacity(config.gru_layers);
        for layer in 0..config.gru_layers {
            encoder.push(gru(
                dim,
                dim,
                GRUConfig::default(),
                vb.pp(format!("gru{}", layer)),
            )?);
        }

        let mut fcn = Vec::with_capacity(FCN_DEPTH);
        let mut in_channels = config.group;
        for i in 0..FCN_DEPTH {
            fcn.push(BasicConv2d::same(
                in_channels,
                dim,
                config.fcn_kernel,
                vb.pp(format!("fcn{}", i)),
            )?);
            in_channels = dim;
        }

        Ok(Self {
            encoder,
            fcn,
            dim,
            group: config.group,
            similarity: config.similarity_function()?,
            sink: None,
        })
    }

    /// Attach a diagnostic sink that receives every similarity map.
    pub fn with_sink(mut self, sink: Arc<dyn SimilaritySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the stacked GRU over `(N, L, C)`, returning per-step hidden
    /// states of the last layer.
    pub fn encode(&self, x: &Tensor) -> BoundaryResult<Tensor> {
        let mut x = x.clone();
        for layer in &self.encoder {
            // `states_to_tensor` concatenates along dim 1; keep the time axis.
            let hidden: Vec<Tensor> = layer.seq(&x)?.iter().map(|s| s.h().clone()).collect();
            x = Tensor::stack(&hidden, 1)?;
        }
        Ok(x)
    }

    /// Per-group self-similarity `(N, L, C) -> (N, G, L, L)`.
    pub fn group_similarity(&self, h: &Tensor) -> BoundaryResult<Tensor> {
        let (n, len, channels) = h.dims3()?;
        if channels % self.group != 0 {
            return Err(BoundaryError::shape(
                "group similarity channels",
                format!("multiple of {}", self.group),
                channels,
            ));
        }
        let grouped = h
            .reshape((n, len, self.group, channels / self.group))?
            .permute((0, 2, 1, 3))?
            .contiguous()?;

        match self.similarity {
            SimilarityFunction::Cosine => {
                let unit = l2_normalize(&grouped, COSINE_EPS)?;
                let unit_t = unit.transpose(2, 3)?.contiguous()?;
                Ok(unit.matmul(&unit_t)?)
            }
        }
    }
}

impl WindowScorer for GroupSimilarityEncoder {
    fn out_channels(&self) -> usize {
        self.dim
    }

    fn score(&self, window: &SimilarityWindow, train: bool) -> BoundaryResult<Tensor> {
        let context = window.context()?;
        let channels = context.dim(2)?;
        if channels != self.dim {
            return Err(BoundaryError::shape("window channels", self.dim, channels));
        }

        let hidden = self.encode(&context)?;
        let similarity = self.group_similarity(&hidden)?;
        if let Some(sink) = &self.sink {
            sink.record(window.offset, &similarity)?;
        }

        let mut x = similarity;
        for block in &self.fcn {
            x = block.forward_t(&x, train)?;
        }
        let pooled = global_avg_pool2d(&x)?;

        trace!(
            offset = window.offset,
            context_len = context.dim(1)?,
            windows = pooled.dim(0)?,
            "Scored similarity windows"
        );
        Ok(pooled)
    }
}
