//! Boundary classifier head.

use candle_core::Tensor;
use candle_nn::{conv1d, prelu, Conv1d, Conv1dConfig, Module, PReLU, VarBuilder};

/// Three 1D convolutions with PReLU: `(B, C, T) -> (B, 1, T)` raw logits.
#[derive(Debug, Clone)]
pub struct BoundaryHead {
    conv1: Conv1d,
    act1: PReLU,
    conv2: Conv1d,
    act2: PReLU,
    out: Conv1d,
}

impl BoundaryHead {
    pub fn new(in_channels: usize, dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let same3 = Conv1dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv1: conv1d(in_channels, dim, 3, same3, vb.pp("conv1"))?,
            act1: prelu(None, vb.pp("act1"))?,
            conv2: conv1d(dim, dim, 3, same3, vb.pp("conv2"))?,
            act2: prelu(None, vb.pp("act2"))?,
            out: conv1d(dim, 1, 1, Conv1dConfig::default(), vb.pp("out"))?,
        })
    }
}

impl Module for BoundaryHead {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = self.act1.forward(&self.conv1.forward(xs)?)?;
        let xs = self.act2.forward(&self.conv2.forward(&xs)?)?;
        self.out.forward(&xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_one_logit_per_frame() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let head = BoundaryHead::new(8, 16, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 8, 11), &Device::Cpu).unwrap();
        assert_eq!(head.forward(&x).unwrap().dims(), &[2, 1, 11]);
    }
}
