//! Soft boundary targets.
//!
//! Each positive label spreads into a Gaussian bump; overlapping bumps add
//! and the sum is clamped to `[0, 1]`:
//!
//! `g[j] = clamp(sum_{i : t[i] != 0} exp(-(j - i)^2 / (2 sigma^2)), 0, 1)`

use candle_core::{DType, Tensor};

use crate::error::{BoundaryError, BoundaryResult};

/// Smooth one label sequence. Every nonzero label is a positive.
pub fn gaussian_smooth(labels: &[f32], sigma: f32) -> Vec<f32> {
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let positives: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &v)| v != 0.0)
        .map(|(i, _)| i)
        .collect();

    (0..labels.len())
        .map(|j| {
            let sum: f64 = positives
                .iter()
                .map(|&i| {
                    let d = j as f64 - i as f64;
                    (-(d * d) / denom).exp()
                })
                .sum();
            sum.clamp(0.0, 1.0) as f32
        })
        .collect()
}

/// Smooth a `(B, T)` label tensor into `(B, T)` f32 soft targets on the same
/// device.
///
/// # Errors
/// `InvalidInput` for a non-positive or non-finite `sigma`.
pub fn prepare_gaussian_targets(labels: &Tensor, sigma: f32) -> BoundaryResult<Tensor> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(BoundaryError::invalid(format!(
            "sigma must be > 0, got {}",
            sigma
        )));
    }
    let (batch, frames) = labels.dims2()?;
    let rows = labels.to_dtype(DType::F32)?.to_vec2::<f32>()?;

    let mut smoothed = Vec::with_capacity(batch * frames);
    for row in &rows {
        smoothed.extend(gaussian_smooth(row, sigma));
    }
    Ok(Tensor::from_vec(smoothed, (batch, frames), labels.device())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_isolated_peak_is_unclamped_gaussian() {
        let mut labels = vec![0.0f32; 11];
        labels[5] = 1.0;
        let sigma = 1.5f32;
        let g = gaussian_smooth(&labels, sigma);

        for (j, v) in g.iter().enumerate() {
            let d = j as f64 - 5.0;
            let expected = (-(d * d) / (2.0 * 1.5 * 1.5)).exp() as f32;
            assert_eq!(*v, expected, "j={}", j);
        }
        assert_eq!(g[5], 1.0);
    }

    #[test]
    fn test_overlap_is_clamped() {
        let g = gaussian_smooth(&[0.0, 1.0, 1.0, 0.0], 1.0);
        assert_eq!(g[1], 1.0);
        assert_eq!(g[2], 1.0);
        // Edge frames get two contributions: exp(-0.5) + exp(-2).
        let edge = ((-0.5f64).exp() + (-2.0f64).exp()) as f32;
        assert!((g[0] - edge).abs() < 1e-6);
        assert!(g.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_any_nonzero_label_is_positive() {
        let g = gaussian_smooth(&[0.0, 0.5, 0.0, 2.0, 0.0], 1.0);
        assert_eq!(g[1], 1.0);
        assert_eq!(g[3], 1.0);
        assert_eq!(g, gaussian_smooth(&[0.0, 1.0, 0.0, 1.0, 0.0], 1.0));
    }

    #[test]
    fn test_no_positives_is_zero() {
        assert_eq!(gaussian_smooth(&[0.0; 5], 1.0), vec![0.0; 5]);
    }

    #[test]
    fn test_tensor_rows_independent() {
        let labels = Tensor::from_vec(
            vec![1u8, 0, 0, 0, 0, 0, 0, 1],
            (2, 4),
            &Device::Cpu,
        )
        .unwrap();
        let targets = prepare_gaussian_targets(&labels, 1.0).unwrap();
        let rows: Vec<Vec<f32>> = targets.to_vec2().unwrap();
        assert_eq!(rows[0], gaussian_smooth(&[1.0, 0.0, 0.0, 0.0], 1.0));
        assert_eq!(rows[1], gaussian_smooth(&[0.0, 0.0, 0.0, 1.0], 1.0));
    }

    #[test]
    fn test_bad_sigma_rejected() {
        let labels = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(prepare_gaussian_targets(&labels, 0.0).is_err());
        assert!(prepare_gaussian_targets(&labels, f32::NAN).is_err());
    }
}
