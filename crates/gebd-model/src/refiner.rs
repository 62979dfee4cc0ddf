//! Relation refiner: strided convolutions over propagated maps.
//!
//! Reduces the secondary-resolution propagated maps by a factor of 8 so they
//! line up with the extractor's primary map, smoothing warp artifacts on the
//! way.

use candle_core::Tensor;
use candle_nn::{conv2d, Conv2d, Conv2dConfig, Module, VarBuilder};

use crate::layers::max_pool2d_padded;

/// conv3x3/2 → ReLU → conv3x3/2 → ReLU → maxpool3/2 (pad 1).
#[derive(Debug, Clone)]
pub struct RelationRefiner {
    conv1: Conv2d,
    conv2: Conv2d,
}

/// Spatial reduction factor of the refiner.
pub const REFINER_STRIDE: usize = 8;

impl RelationRefiner {
    pub fn new(dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        Ok(Self {
            conv1: conv2d(dim, dim, 3, cfg, vb.pp("conv1"))?,
            conv2: conv2d(dim, dim, 3, cfg, vb.pp("conv2"))?,
        })
    }
}

impl Module for RelationRefiner {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.conv1.forward(xs)?.relu()?;
        let xs = self.conv2.forward(&xs)?.relu()?;
        max_pool2d_padded(&xs, 3, 2, 1)
    }
}
