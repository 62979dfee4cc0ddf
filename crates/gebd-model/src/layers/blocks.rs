//! Convolution building blocks.

use candle_core::Tensor;
use candle_nn::{
    batch_norm, conv2d_no_bias, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Module,
    ModuleT, VarBuilder,
};

/// Convolution (no bias) → batch norm → ReLU.
#[derive(Debug, Clone)]
pub struct BasicConv2d {
    conv: Conv2d,
    bn: BatchNorm,
}

impl BasicConv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding,
            stride,
            ..Default::default()
        };
        let conv = conv2d_no_bias(in_channels, out_channels, kernel_size, cfg, vb.pp("conv"))?;
        let bn = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    /// Block with "same" padding at stride 1 (odd `kernel_size`).
    pub fn same(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        Self::new(
            in_channels,
            out_channels,
            kernel_size,
            1,
            (kernel_size - 1) / 2,
            vb,
        )
    }
}

impl ModuleT for BasicConv2d {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        self.bn.forward_t(&xs, train)?.relu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_same_block_preserves_spatial_size() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = BasicConv2d::same(4, 8, 5, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 4, 7, 7), &Device::Cpu).unwrap();
        let y = block.forward_t(&x, false).unwrap();
        assert_eq!(y.dims(), &[2, 8, 7, 7]);

        let min: f32 = y.flatten_all().unwrap().min(0).unwrap().to_scalar().unwrap();
        assert!(min >= 0.0, "ReLU output must be non-negative");
    }

    #[test]
    fn test_strided_block_halves() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = BasicConv2d::new(3, 6, 3, 2, 1, vb).unwrap();
        let x = Tensor::zeros((1, 3, 8, 8), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(block.forward_t(&x, true).unwrap().dims(), &[1, 6, 4, 4]);
    }
}
