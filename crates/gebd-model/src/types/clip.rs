//! Batched compressed-video side data for one forward pass.

use candle_core::{DType, Device, Tensor};

use super::motion::MOTION_CHANNELS;
use crate::error::{BoundaryError, BoundaryResult};

/// Side data of `B` videos with `T` frames each.
///
/// | field          | shape              |
/// |----------------|--------------------|
/// | `mv`           | `(B, T, Cmv, H, W)` |
/// | `res`          | `(B, T, Cres, H, W)` |
/// | `motion`       | `(B, T, 6, h, w)`   |
/// | `decode_order` | `(B, T)` integer, `-1` = absent |
/// | `frame_mask`   | `(B, T)` nonzero = valid; indexed by decode step during propagation, by frame in the loss |
#[derive(Debug, Clone)]
pub struct ClipBatch {
    pub mv: Tensor,
    pub res: Tensor,
    pub motion: Tensor,
    pub decode_order: Tensor,
    pub frame_mask: Tensor,
}

impl ClipBatch {
    /// Check that all tensors agree on batch and frame counts.
    pub fn validate(&self) -> BoundaryResult<()> {
        let (b, t, _, h, w) = self.mv.dims5()?;
        let (rb, rt, _, rh, rw) = self.res.dims5()?;
        if (rb, rt, rh, rw) != (b, t, h, w) {
            return Err(BoundaryError::shape(
                "residual vs motion-vector frames",
                (b, t, h, w),
                (rb, rt, rh, rw),
            ));
        }
        let (mb, mt, mc, _, _) = self.motion.dims5()?;
        if (mb, mt) != (b, t) || mc < MOTION_CHANNELS {
            return Err(BoundaryError::shape(
                "motion fields (B, T, C>=6)",
                (b, t, MOTION_CHANNELS),
                (mb, mt, mc),
            ));
        }
        if self.decode_order.dims2()? != (b, t) {
            return Err(BoundaryError::shape(
                "decode order",
                (b, t),
                self.decode_order.dims(),
            ));
        }
        if self.frame_mask.dims2()? != (b, t) {
            return Err(BoundaryError::shape(
                "frame mask",
                (b, t),
                self.frame_mask.dims(),
            ));
        }
        Ok(())
    }

    pub fn num_videos(&self) -> usize {
        self.mv.dims().first().copied().unwrap_or(0)
    }

    pub fn num_frames(&self) -> usize {
        self.mv.dims().get(1).copied().unwrap_or(0)
    }

    pub fn device(&self) -> &Device {
        self.mv.device()
    }

    /// Decode order rows as host integers.
    pub fn decode_rows(&self) -> BoundaryResult<Vec<Vec<i64>>> {
        Ok(self.decode_order.to_dtype(DType::I64)?.to_vec2::<i64>()?)
    }

    /// Validity mask rows as host booleans.
    pub fn mask_rows(&self) -> BoundaryResult<Vec<Vec<bool>>> {
        mask_to_rows(&self.frame_mask)
    }
}

/// Convert a `(B, T)` mask tensor of any dtype to booleans.
pub fn mask_to_rows(mask: &Tensor) -> BoundaryResult<Vec<Vec<bool>>> {
    let rows = mask.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|v| v != 0.0).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(b: usize, t: usize, mask_t: usize) -> ClipBatch {
        let device = Device::Cpu;
        ClipBatch {
            mv: Tensor::zeros((b, t, 4, 8, 8), DType::F32, &device).unwrap(),
            res: Tensor::zeros((b, t, 3, 8, 8), DType::F32, &device).unwrap(),
            motion: Tensor::zeros((b, t, 6, 2, 2), DType::F32, &device).unwrap(),
            decode_order: Tensor::zeros((b, t), DType::I64, &device).unwrap(),
            frame_mask: Tensor::ones((b, mask_t), DType::U8, &device).unwrap(),
        }
    }

    #[test]
    fn test_validate_accepts_consistent_batch() {
        let clip = batch(2, 5, 5);
        clip.validate().unwrap();
        assert_eq!(clip.num_videos(), 2);
        assert_eq!(clip.num_frames(), 5);
    }

    #[test]
    fn test_validate_rejects_mask_length() {
        let clip = batch(1, 5, 4);
        let err = clip.validate().unwrap_err();
        assert!(err.to_string().contains("frame mask"));
    }

    #[test]
    fn test_mask_rows_from_u8() {
        let mask = Tensor::from_vec(vec![1u8, 0, 1], (1, 3), &Device::Cpu).unwrap();
        assert_eq!(mask_to_rows(&mask).unwrap(), vec![vec![true, false, true]]);
    }
}
