//! Similarity windows and the scoring seam.

use candle_core::Tensor;

use crate::error::{BoundaryError, BoundaryResult};

/// All windows of one aggregation offset.
///
/// `left` and `right` are `(N, k, C)`, `center` is `(N, 1, C)`; `N` runs over
/// (batch item, window) pairs.
#[derive(Debug, Clone)]
pub struct SimilarityWindow {
    pub left: Tensor,
    pub center: Tensor,
    pub right: Tensor,
    pub offset: usize,
}

impl SimilarityWindow {
    /// Window half-size `k`.
    pub fn half_size(&self) -> BoundaryResult<usize> {
        Ok(self.left.dim(1)?)
    }

    pub fn num_windows(&self) -> BoundaryResult<usize> {
        Ok(self.center.dim(0)?)
    }

    /// Symmetric context `[left[offset..], center, right[..k-offset]]`.
    ///
    /// Returns `(N, 2(k - offset) + 1, C)`.
    ///
    /// # Errors
    /// `InvalidInput` when `offset >= k` or the sides disagree in length.
    pub fn context(&self) -> BoundaryResult<Tensor> {
        let k = self.half_size()?;
        let right_k = self.right.dim(1)?;
        if right_k != k {
            return Err(BoundaryError::shape("window sides", k, right_k));
        }
        if self.offset >= k {
            return Err(BoundaryError::invalid(format!(
                "window offset {} must be < half-size {}",
                self.offset, k
            )));
        }
        let keep = k - self.offset;
        let left = self.left.narrow(1, self.offset, keep)?;
        let right = self.right.narrow(1, 0, keep)?;
        Ok(Tensor::cat(&[&left, &self.center, &right], 1)?)
    }
}

/// Scores every window of one offset with a single output vector.
pub trait WindowScorer {
    /// Channels of each output vector.
    fn out_channels(&self) -> usize;

    /// Returns `(N, out_channels)`, one row per window.
    fn score(&self, window: &SimilarityWindow, train: bool) -> BoundaryResult<Tensor>;
}
