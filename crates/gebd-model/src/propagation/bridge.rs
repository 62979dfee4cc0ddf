//! Straight-through gradient bridge around the warp.
//!
//! The warp runs on detached data and has no backward pass. The bridge
//! returns `warped + input - detach(input)`: the forward value is exactly
//! `warped` and the gradient reaching `input` is the incoming gradient,
//! unchanged, as if the warp were the identity.

use candle_core::Tensor;

use crate::error::{BoundaryError, BoundaryResult};

/// Op boundary pairing a non-differentiable result with the tensor whose
/// gradient it stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientBridge {
    /// Training: attach identity gradient to the input.
    StraightThrough,
    /// Inference: return the warped value unchanged.
    Inert,
}

impl GradientBridge {
    pub fn for_mode(train: bool) -> Self {
        if train {
            Self::StraightThrough
        } else {
            Self::Inert
        }
    }

    /// Combine `warped` with `input` according to the bridge mode.
    ///
    /// # Errors
    /// `ShapeMismatch` when the tensors differ in shape.
    pub fn apply(self, warped: &Tensor, input: &Tensor) -> BoundaryResult<Tensor> {
        if warped.dims() != input.dims() {
            return Err(BoundaryError::shape(
                "gradient bridge",
                input.dims(),
                warped.dims(),
            ));
        }
        match self {
            Self::Inert => Ok(warped.clone()),
            Self::StraightThrough => {
                let identity = (input - input.detach())?;
                Ok((warped.detach() + identity)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1().unwrap()
    }

    #[test]
    fn test_forward_value_is_exactly_warped() {
        let device = Device::Cpu;
        let input = Tensor::from_vec(vec![0.1f32, -3.7, 1e6, 2.5e-7], (2, 2), &device).unwrap();
        let warped = Tensor::from_vec(vec![9.0f32, 0.333, -1e-8, 42.0], (2, 2), &device).unwrap();

        let bridged = GradientBridge::StraightThrough.apply(&warped, &input).unwrap();
        assert_eq!(values(&bridged), values(&warped));

        let inert = GradientBridge::Inert.apply(&warped, &input).unwrap();
        assert_eq!(values(&inert), values(&warped));
    }

    #[test]
    fn test_gradient_is_identity_on_input() {
        let device = Device::Cpu;
        let input = Var::from_tensor(
            &Tensor::from_vec(vec![1.0f32, 2.0, 3.0], (3,), &device).unwrap(),
        )
        .unwrap();
        let warped = Tensor::from_vec(vec![7.0f32, 8.0, 9.0], (3,), &device).unwrap();

        let bridged = GradientBridge::StraightThrough
            .apply(&warped, input.as_tensor())
            .unwrap();
        let weights = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], (3,), &device).unwrap();
        let loss = (bridged * weights).unwrap().sum_all().unwrap();

        let grads = loss.backward().unwrap();
        let grad = grads.get(input.as_tensor()).unwrap();
        assert_eq!(values(grad), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Device::Cpu;
        let a = Tensor::zeros((2,), candle_core::DType::F32, &device).unwrap();
        let b = Tensor::zeros((3,), candle_core::DType::F32, &device).unwrap();
        assert!(GradientBridge::Inert.apply(&a, &b).is_err());
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(GradientBridge::for_mode(true), GradientBridge::StraightThrough);
        assert_eq!(GradientBridge::for_mode(false), GradientBridge::Inert);
    }
}
