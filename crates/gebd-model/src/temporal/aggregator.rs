//! Shifted-phase sliding-window aggregation (SPoS).
//!
//! Every frame needs a score computed from a symmetric window around it.
//! Instead of cutting `T` overlapping windows, the padded sequence is tiled
//! into disjoint length-`k` windows `k` times, once per phase offset. Pass
//! `offset` scores the frames at `offset, offset + k, offset + 2k, ...`, so
//! the `k` passes together cover every frame exactly once.
//!
//! ```text
//! padded:  | 0 1 2 3 | 4 5 6 7 | ...     k = 4
//! offset 1: centers    1         5
//!           left     = frames before each center (replicate-padded)
//!           right    = frames after each center  (replicate-padded)
//! ```

use candle_core::Tensor;
use tracing::debug;

use super::window::{SimilarityWindow, WindowScorer};
use crate::error::{BoundaryError, BoundaryResult};

/// Aggregate `(B, C, T)` into `(B, C', T)` using `scorer` on every window.
///
/// The scorer is invoked exactly `k` times, once per offset, each time with
/// all windows of all batch items. An empty sequence yields an empty
/// `(B, C', 0)` output without calling the scorer.
///
/// # Errors
/// `InvalidInput` for `k == 0`; `ShapeMismatch` if the
/// scorer returns the wrong number of rows or channels.
pub fn aggregate<S>(
    sequence: &Tensor,
    k: usize,
    scorer: &S,
    train: bool,
) -> BoundaryResult<Tensor>
where
    S: WindowScorer + ?Sized,
{
    let (batch, channels, len) = sequence.dims3()?;
    if k == 0 {
        return Err(BoundaryError::invalid("window half-size must be > 0"));
    }
    if len == 0 {
        return Ok(Tensor::zeros(
            (batch, scorer.out_channels(), 0),
            sequence.dtype(),
            sequence.device(),
        )?);
    }

    let padded_len = len.div_ceil(k) * k;
    let padded = if padded_len > len {
        sequence.pad_with_same(2, 0, padded_len - len)?
    } else {
        sequence.clone()
    };
    let num_windows = padded_len / k;
    let out_channels = scorer.out_channels();

    let mut per_offset = Vec::with_capacity(k);
    for offset in 0..k {
        let left = padded
            .pad_with_same(2, k - offset, 0)?
            .narrow(2, 0, padded_len)?;
        let right = padded
            .pad_with_same(2, 0, offset + 1)?
            .narrow(2, offset + 1, padded_len)?;

        let window = SimilarityWindow {
            left: to_windows(&left, k)?,
            center: centers(&padded, k, offset)?,
            right: to_windows(&right, k)?,
            offset,
        };

        let scored = scorer.score(&window, train)?;
        let expected = (batch * num_windows, out_channels);
        if scored.dims2()? != expected {
            return Err(BoundaryError::shape(
                "window scorer output",
                expected,
                scored.dims(),
            ));
        }
        // (B*nw, C') -> (B, C', nw)
        per_offset.push(
            scored
                .reshape((batch, num_windows, out_channels))?
                .transpose(1, 2)?,
        );
    }

    // Stacking offsets last puts window j, offset o at j * k + o.
    let output = Tensor::stack(&per_offset, 3)?
        .reshape((batch, out_channels, padded_len))?
        .narrow(2, 0, len)?;

    debug!(
        batch,
        channels,
        len,
        k,
        num_windows,
        "Aggregated sequence over all window offsets"
    );

    Ok(output)
}

/// `(B, C, nw*k)` -> `(B*nw, k, C)` consecutive non-overlapping windows.
fn to_windows(x: &Tensor, k: usize) -> BoundaryResult<Tensor> {
    let (batch, channels, len) = x.dims3()?;
    let num_windows = len / k;
    Ok(x.contiguous()?
        .reshape((batch, channels, num_windows, k))?
        .permute((0, 2, 3, 1))?
        .contiguous()?
        .reshape((batch * num_windows, k, channels))?)
}

/// Values at `offset, offset + k, ...` as `(B*nw, 1, C)`.
fn centers(x: &Tensor, k: usize, offset: usize) -> BoundaryResult<Tensor> {
    let (batch, channels, len) = x.dims3()?;
    let num_windows = len / k;
    Ok(x.contiguous()?
        .reshape((batch, channels, num_windows, k))?
        .narrow(3, offset, 1)?
        .permute((0, 2, 3, 1))?
        .contiguous()?
        .reshape((batch * num_windows, 1, channels))?)
}
