//! Synthetic compressed-video inputs for tests.
//!
//! Clips follow a codec-like layout: every GOP starts with an anchor, then
//! frames at even offsets are decoded before frames at odd offsets. Each
//! non-anchor frame references its GOP anchor on list 0; odd-offset frames
//! also reference the following (already decoded) even frame on list 1.
//! Values are random, shapes and references are exact.

use candle_core::{Device, Tensor};
use gebd_model::{ClipBatch, ModelConfig, ABSENT_FRAME, MOTION_CHANNELS};

/// Downsampling from side-data resolution to the motion-field resolution
/// (the extractor's secondary map).
pub const MOTION_STRIDE: usize = 4;

/// Small model that runs quickly on CPU.
///
/// Side data must be a multiple of 32 pixels per side.
pub fn tiny_model_config() -> ModelConfig {
    ModelConfig {
        dim: 8,
        group: 2,
        window_half_size: 2,
        gop_size: 4,
        fcn_kernel: 3,
        gru_layers: 1,
        stem_channels: 4,
        ..Default::default()
    }
}

/// Decode order for `num_frames` frames: per GOP, the anchor, then even
/// offsets, then odd offsets.
///
/// `gop_decode_order(8, 4) == [0, 2, 1, 3, 4, 6, 5, 7]`.
pub fn gop_decode_order(num_frames: usize, gop_size: usize) -> Vec<i64> {
    let mut order = Vec::with_capacity(num_frames);
    for start in (0..num_frames).step_by(gop_size.max(1)) {
        let end = (start + gop_size).min(num_frames);
        order.push(start as i64);
        order.extend((start + 2..end).step_by(2).map(|t| t as i64));
        order.extend((start + 1..end).step_by(2).map(|t| t as i64));
    }
    order
}

/// Reference frames `(list0, list1)` of frame `t`, `-1` for none.
pub fn frame_references(t: usize, gop_size: usize, num_frames: usize) -> (i32, i32) {
    let offset = t % gop_size;
    if offset == 0 {
        return (-1, -1);
    }
    let anchor = (t - offset) as i32;
    let next_even = t + 1;
    let list1 = if offset % 2 == 1 && next_even % gop_size != 0 && next_even < num_frames {
        next_even as i32
    } else {
        -1
    };
    (anchor, list1)
}

/// `(T, 6, h, w)` motion fields with a constant displacement on every valid
/// list. Channels are `[dx0, dy0, dx1, dy1, ref0, ref1]`.
pub fn generate_motion_fields(
    num_frames: usize,
    gop_size: usize,
    height: usize,
    width: usize,
    displacement: f32,
) -> Vec<f32> {
    let plane = height * width;
    let mut data = Vec::with_capacity(num_frames * MOTION_CHANNELS * plane);
    for t in 0..num_frames {
        let (ref0, ref1) = frame_references(t, gop_size, num_frames);
        let d0 = if ref0 >= 0 { displacement } else { 0.0 };
        let d1 = if ref1 >= 0 { displacement } else { 0.0 };
        for value in [d0, d0, d1, d1, ref0 as f32, ref1 as f32] {
            data.extend(std::iter::repeat(value).take(plane));
        }
    }
    data
}

/// Builder for [`ClipBatch`] values.
#[derive(Debug, Clone)]
pub struct ClipBuilder {
    videos: usize,
    frames: usize,
    height: usize,
    width: usize,
    gop_size: usize,
    absent_tail: usize,
    displacement: f32,
    mask: Option<Vec<Vec<bool>>>,
    decode_order: Option<Vec<i64>>,
}

impl ClipBuilder {
    pub fn new(videos: usize, frames: usize) -> Self {
        Self {
            videos,
            frames,
            height: 32,
            width: 32,
            gop_size: 4,
            absent_tail: 0,
            displacement: 0.5,
            mask: None,
            decode_order: None,
        }
    }

    pub fn resolution(mut self, height: usize, width: usize) -> Self {
        self.height = height;
        self.width = width;
        self
    }

    pub fn gop_size(mut self, gop_size: usize) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Mark the last `n` frames of every video as padding: sentinel decode
    /// entries and a false mask.
    pub fn absent_tail(mut self, n: usize) -> Self {
        self.absent_tail = n;
        self
    }

    pub fn displacement(mut self, displacement: f32) -> Self {
        self.displacement = displacement;
        self
    }

    /// Explicit validity mask, one row per video.
    pub fn mask(mut self, mask: Vec<Vec<bool>>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Explicit decode order shared by every video.
    pub fn decode_order(mut self, order: Vec<i64>) -> Self {
        self.decode_order = Some(order);
        self
    }

    pub fn build(&self, device: &Device) -> ClipBatch {
        let (b, t, h, w) = (self.videos, self.frames, self.height, self.width);
        let coded = t.saturating_sub(self.absent_tail);
        let (mh, mw) = (h / MOTION_STRIDE, w / MOTION_STRIDE);

        let mv = Tensor::randn(0f32, 1.0, (b, t, 4, h, w), device).expect("mv tensor");
        let res = Tensor::randn(0f32, 1.0, (b, t, 3, h, w), device).expect("res tensor");

        let mut motion_data = Vec::with_capacity(b * t * MOTION_CHANNELS * mh * mw);
        for _ in 0..b {
            let mut fields = generate_motion_fields(coded, self.gop_size, mh, mw, self.displacement);
            fields.resize(t * MOTION_CHANNELS * mh * mw, 0.0);
            motion_data.extend(fields);
        }
        let motion = Tensor::from_vec(motion_data, (b, t, MOTION_CHANNELS, mh, mw), device)
            .expect("motion tensor");

        let order_row = self.decode_order.clone().unwrap_or_else(|| {
            let mut row = gop_decode_order(coded, self.gop_size);
            row.resize(t, ABSENT_FRAME);
            row
        });
        let orders: Vec<i64> = (0..b).flat_map(|_| order_row.iter().copied()).collect();
        let decode_order = Tensor::from_vec(orders, (b, t), device).expect("decode order tensor");

        let mask_rows = self
            .mask
            .clone()
            .unwrap_or_else(|| vec![(0..t).map(|i| i < coded).collect(); b]);
        let mask_data: Vec<u8> = mask_rows
            .iter()
            .flat_map(|row| row.iter().map(|&v| u8::from(v)))
            .collect();
        let frame_mask = Tensor::from_vec(mask_data, (b, t), device).expect("mask tensor");

        ClipBatch {
            mv,
            res,
            motion,
            decode_order,
            frame_mask,
        }
    }
}

/// `(B, T)` f32 labels from 0/1 rows.
pub fn boundary_labels(rows: &[Vec<u8>], device: &Device) -> Tensor {
    let t = rows.first().map(Vec::len).unwrap_or(0);
    let data: Vec<f32> = rows.iter().flatten().map(|&v| f32::from(v)).collect();
    Tensor::from_vec(data, (rows.len(), t), device).expect("labels tensor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gop_decode_order() {
        assert_eq!(gop_decode_order(8, 4), vec![0, 2, 1, 3, 4, 6, 5, 7]);
        assert_eq!(gop_decode_order(6, 4), vec![0, 2, 1, 3, 4, 5]);
    }

    #[test]
    fn test_references_are_decoded_first() {
        for frames in [5usize, 8, 13] {
            let order = gop_decode_order(frames, 4);
            let position = |f: i32| order.iter().position(|&o| o == f as i64).unwrap();
            for t in 0..frames {
                let (r0, r1) = frame_references(t, 4, frames);
                for r in [r0, r1].into_iter().filter(|r| *r >= 0) {
                    assert!(position(r) < position(t as i32), "frame {} ref {}", t, r);
                }
            }
        }
    }

    #[test]
    fn test_builder_shapes() {
        let batch = ClipBuilder::new(2, 6).absent_tail(2).build(&Device::Cpu);
        batch.validate().unwrap();
        assert_eq!(batch.motion.dims(), &[2, 6, 6, 8, 8]);
        assert_eq!(batch.mask_rows().unwrap()[1], vec![true, true, true, true, false, false]);
        assert_eq!(batch.decode_rows().unwrap()[0], vec![0, 2, 1, 3, -1, -1]);
    }
}
