//! Masked binary cross-entropy on raw logits.
//!
//! Only frames whose validity mask is set contribute. A batch with no valid
//! frame has no defined mean and is reported as [`MaskedLoss::NoValidFrames`]
//! rather than as a zero loss.

use candle_core::{DType, Tensor};

use crate::error::{BoundaryError, BoundaryResult};
use crate::types::mask_to_rows;

/// Outcome of a masked loss computation.
#[derive(Debug, Clone)]
pub enum MaskedLoss {
    /// Mean loss over `valid_frames` frames (scalar tensor, differentiable).
    Computed { loss: Tensor, valid_frames: usize },
    /// The mask selected no frame.
    NoValidFrames,
}

impl MaskedLoss {
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }

    pub fn valid_frames(&self) -> usize {
        match self {
            Self::Computed { valid_frames, .. } => *valid_frames,
            Self::NoValidFrames => 0,
        }
    }

    /// Host value of the loss, `None` when no frame was valid.
    pub fn value(&self) -> BoundaryResult<Option<f32>> {
        match self {
            Self::Computed { loss, .. } => Ok(Some(tensor_to_f32(loss)?)),
            Self::NoValidFrames => Ok(None),
        }
    }
}

/// Numerically stable BCE with logits over the frames selected by `mask`.
///
/// L = mean_{valid} [ max(x, 0) - x * z + log(1 + exp(-|x|)) ]
///
/// # Arguments
/// * `logits` - raw scores `(B, T)`
/// * `targets` - soft targets in `[0, 1]`, `(B, T)`
/// * `mask` - `(B, T)`, nonzero for frames that count
pub fn masked_bce_with_logits(
    logits: &Tensor,
    targets: &Tensor,
    mask: &Tensor,
) -> BoundaryResult<MaskedLoss> {
    let dims = logits.dims2()?;
    if targets.dims2()? != dims {
        return Err(BoundaryError::shape("loss targets", dims, targets.dims()));
    }
    if mask.dims2()? != dims {
        return Err(BoundaryError::shape("loss mask", dims, mask.dims()));
    }

    let valid: Vec<u32> = mask_to_rows(mask)?
        .into_iter()
        .flatten()
        .enumerate()
        .filter(|(_, keep)| *keep)
        .map(|(i, _)| i as u32)
        .collect();
    if valid.is_empty() {
        return Ok(MaskedLoss::NoValidFrames);
    }
    let valid_frames = valid.len();
    let index = Tensor::from_vec(valid, valid_frames, logits.device())?;

    let x = logits.flatten_all()?.index_select(&index, 0)?;
    let z = targets
        .to_dtype(logits.dtype())?
        .flatten_all()?
        .index_select(&index, 0)?;

    let softplus_neg_abs = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let per_frame = ((x.relu()? - (&x * &z)?)? + softplus_neg_abs)?;
    let loss = per_frame.mean_all()?;

    Ok(MaskedLoss::Computed { loss, valid_frames })
}

/// Extract a scalar f32 from a 0-dim or 1-element tensor.
fn tensor_to_f32(t: &Tensor) -> BoundaryResult<f32> {
    let flat = t.to_dtype(DType::F32)?.flatten_all()?;
    let values = flat.to_vec1::<f32>()?;
    values
        .first()
        .copied()
        .ok_or_else(|| BoundaryError::invalid("empty loss tensor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn t2(data: &[f32], rows: usize, cols: usize) -> Tensor {
        Tensor::from_slice(data, (rows, cols), &Device::Cpu).unwrap()
    }

    fn naive_bce(x: f32, z: f32) -> f32 {
        let p = 1.0 / (1.0 + (-x).exp());
        -(z * p.ln() + (1.0 - z) * (1.0 - p).ln())
    }

    #[test]
    fn test_zero_logit_half_target() {
        let loss = masked_bce_with_logits(
            &t2(&[0.0], 1, 1),
            &t2(&[0.5], 1, 1),
            &t2(&[1.0], 1, 1),
        )
        .unwrap();
        assert_eq!(loss.valid_frames(), 1);
        let v = loss.value().unwrap().unwrap();
        assert!((v - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_matches_naive_formula() {
        let logits = [-2.0f32, -0.5, 0.3, 1.7];
        let targets = [0.0f32, 0.2, 0.9, 1.0];
        let loss = masked_bce_with_logits(
            &t2(&logits, 2, 2),
            &t2(&targets, 2, 2),
            &t2(&[1.0; 4], 2, 2),
        )
        .unwrap();

        let expected: f32 = logits
            .iter()
            .zip(targets.iter())
            .map(|(&x, &z)| naive_bce(x, z))
            .sum::<f32>()
            / 4.0;
        let v = loss.value().unwrap().unwrap();
        assert!((v - expected).abs() < 1e-5, "{} vs {}", v, expected);
    }

    #[test]
    fn test_masked_frames_do_not_contribute() {
        // The huge wrong logit at the masked position would dominate otherwise.
        let loss = masked_bce_with_logits(
            &t2(&[0.0, 100.0], 1, 2),
            &t2(&[0.5, 0.0], 1, 2),
            &t2(&[1.0, 0.0], 1, 2),
        )
        .unwrap();
        assert_eq!(loss.valid_frames(), 1);
        let v = loss.value().unwrap().unwrap();
        assert!((v - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_all_masked_reports_no_valid_frames() {
        let loss = masked_bce_with_logits(
            &t2(&[0.3, -0.2, 1.0], 1, 3),
            &t2(&[0.0, 1.0, 0.0], 1, 3),
            &t2(&[0.0, 0.0, 0.0], 1, 3),
        )
        .unwrap();
        assert!(matches!(loss, MaskedLoss::NoValidFrames));
        assert!(!loss.is_computed());
        assert_eq!(loss.value().unwrap(), None);
    }

    #[test]
    fn test_gradient_only_on_valid_frames() {
        let logits = Var::from_tensor(&t2(&[0.5, 0.5, 0.5], 1, 3)).unwrap();
        let loss = masked_bce_with_logits(
            logits.as_tensor(),
            &t2(&[1.0, 1.0, 1.0], 1, 3),
            &t2(&[1.0, 0.0, 1.0], 1, 3),
        )
        .unwrap();
        let MaskedLoss::Computed { loss, .. } = loss else {
            panic!("expected a computed loss");
        };
        let grads = loss.backward().unwrap();
        let g: Vec<Vec<f32>> = grads.get(&logits).unwrap().to_vec2().unwrap();
        // d/dx mean = (sigmoid(x) - z) / valid on each valid frame.
        let expected = (1.0 / (1.0 + (-0.5f32).exp()) - 1.0) / 2.0;
        assert!((g[0][0] - expected).abs() < 1e-5);
        assert_eq!(g[0][1], 0.0);
        assert!((g[0][2] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = masked_bce_with_logits(
            &t2(&[0.0, 0.0], 1, 2),
            &t2(&[0.0], 1, 1),
            &t2(&[1.0, 1.0], 1, 2),
        )
        .unwrap_err();
        assert!(matches!(err, BoundaryError::ShapeMismatch { .. }));
    }
}
