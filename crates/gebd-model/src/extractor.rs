//! Side-data feature extraction boundary.
//!
//! The extractor turns a per-frame stack of motion-vector and residual
//! channels into a dense feature map. The propagator works on the optional
//! secondary (lower-level, higher-resolution) map.

use candle_core::Tensor;
use candle_nn::{
    batch_norm, conv2d, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Module, ModuleT,
    VarBuilder,
};
use tracing::trace;

use crate::config::ModelConfig;
use crate::error::{BoundaryError, BoundaryResult};
use crate::layers::{max_pool2d_padded, BasicConv2d};

/// Maps produced for a batch of frames.
#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
    /// `(N, Cout, H', W')`.
    pub primary: Tensor,
    /// `(N, Csec, Hs, Ws)` intermediate map, if the extractor exposes one.
    pub secondary: Option<Tensor>,
}

/// Backbone over concatenated side data. Stateless per call.
pub trait FeatureExtractor: Send + Sync {
    /// Extract features from `(N, Cin, H, W)` frames.
    fn extract(&self, frames: &Tensor, train: bool) -> BoundaryResult<ExtractedFeatures>;

    fn in_channels(&self) -> usize;

    fn out_channels(&self) -> usize;

    /// Channels of the secondary map, `None` if it is not produced.
    fn secondary_channels(&self) -> Option<usize>;
}

/// Strided convolutional backbone.
///
/// ```text
/// input BN
///   -> conv7x7/2 + BN + ReLU -> maxpool3/2      secondary (stem, H/4)
///   -> 3 x [conv3x3/2 + BN + ReLU]              (8*stem, H/32)
///   -> conv3x3 embedding                        primary (dim, H/32)
/// ```
#[derive(Debug, Clone)]
pub struct ConvStemExtractor {
    input_norm: BatchNorm,
    stem: BasicConv2d,
    stages: Vec<BasicConv2d>,
    embedding: Conv2d,
    in_channels: usize,
    stem_channels: usize,
    out_channels: usize,
}

/// Stride-2 stages after the stem.
const STAGES: usize = 3;

impl ConvStemExtractor {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> BoundaryResult<Self> {
        let in_channels = config.input_channels();
        let stem_channels = config.stem_channels;

        let input_norm = batch_norm(in_channels, BatchNormConfig::default(), vb.pp("input_norm"))?;
        let stem = BasicConv2d::new(in_channels, stem_channels, 7, 2, 3, vb.pp("stem"))?;

        let mut stages = Vec::with_capacity(STAGES);
        let mut width = stem_channels;
        for i in 0..STAGES {
            stages.push(BasicConv2d::new(width, width * 2, 3, 2, 1, vb.pp(format!("stage{}", i)))?);
            width *= 2;
        }

        let embedding = conv2d(
            width,
            config.dim,
            3,
            Conv2dConfig {
                padding: 1,
                ..Default::default()
            },
            vb.pp("embedding"),
        )?;

        Ok(Self {
            input_norm,
            stem,
            stages,
            embedding,
            in_channels,
            stem_channels,
            out_channels: config.dim,
        })
    }
}

impl FeatureExtractor for ConvStemExtractor {
    fn extract(&self, frames: &Tensor, train: bool) -> BoundaryResult<ExtractedFeatures> {
        let (_, channels, _, _) = frames.dims4()?;
        if channels != self.in_channels {
            return Err(BoundaryError::shape(
                "extractor input channels",
                self.in_channels,
                channels,
            ));
        }

        let x = self.input_norm.forward_t(frames, train)?;
        let x = self.stem.forward_t(&x, train)?;
        let secondary = max_pool2d_padded(&x, 3, 2, 1)?;

        let mut x = secondary.clone();
        for stage in &self.stages {
            x = stage.forward_t(&x, train)?;
        }
        let primary = self.embedding.forward(&x)?;

        trace!(
            primary = ?primary.dims(),
            secondary = ?secondary.dims(),
            "Extracted side-data features"
        );

        Ok(ExtractedFeatures {
            primary,
            secondary: Some(secondary),
        })
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn secondary_channels(&self) -> Option<usize> {
        Some(self.stem_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn small_config() -> ModelConfig {
        ModelConfig {
            dim: 8,
            stem_channels: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_output_resolutions() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let extractor = ConvStemExtractor::new(&small_config(), vb).unwrap();

        let frames = Tensor::randn(0f32, 1.0, (3, 7, 64, 64), &Device::Cpu).unwrap();
        let out = extractor.extract(&frames, false).unwrap();

        assert_eq!(out.primary.dims(), &[3, 8, 2, 2]);
        assert_eq!(out.secondary.unwrap().dims(), &[3, 4, 16, 16]);
        assert_eq!(extractor.secondary_channels(), Some(4));
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let extractor = ConvStemExtractor::new(&small_config(), vb).unwrap();

        let frames = Tensor::zeros((1, 3, 32, 32), DType::F32, &Device::Cpu).unwrap();
        let err = extractor.extract(&frames, false).unwrap_err();
        assert!(matches!(err, BoundaryError::ShapeMismatch { .. }));
    }
}
