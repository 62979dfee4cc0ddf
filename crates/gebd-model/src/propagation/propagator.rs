//! Decode-order motion-compensated propagation.
//!
//! ```text
//! features (B,T,C,H,W) ─┐
//! motion   (B,T,6,H,W) ─┼─> per video: for i in decode order
//! decode order, mask  ──┘        skip sentinel / masked
//!                                refs = features[r] + buffer[r]
//!                                buffer[i] = warp(refs, motion[i], i)
//!                         ──> buffer (B,T,C,H,W)
//! ```
//!
//! The walk inside one video is strictly ordered: a frame's warp reads slots
//! written at earlier decode steps. Videos in a batch are independent.

use std::sync::Arc;

use candle_core::Tensor;
use tracing::{debug, trace};

use super::buffer::PropagationBuffer;
use super::warp::MotionWarp;
use crate::error::{BoundaryError, BoundaryResult};
use crate::types::{
    frame_layout, mask_to_rows, DecodeOrder, Gop, MotionVectorField, MOTION_CHANNELS,
};

/// What happened while propagating one video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationTrace {
    /// Frames whose slot was written, in the order they were visited.
    pub visited: Vec<usize>,
    /// Visited frames that are GOP anchors.
    pub anchors: usize,
    /// Decode entries skipped because the frame carries no side data.
    pub skipped_masked: usize,
    /// Decode entries holding the absent-frame sentinel.
    pub skipped_absent: usize,
}

/// Result of propagating a batch.
#[derive(Debug, Clone)]
pub struct PropagationOutput {
    /// `(B, T, C, H, W)` propagated maps; zero where nothing was written.
    pub buffer: Tensor,
    /// One trace per video.
    pub traces: Vec<PropagationTrace>,
}

/// Walks decode order and fills a propagation buffer per video.
#[derive(Clone)]
pub struct MotionCompensatedPropagator {
    warp: Arc<dyn MotionWarp>,
    gop: Gop,
}

impl std::fmt::Debug for MotionCompensatedPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionCompensatedPropagator")
            .field("warp", &self.warp.name())
            .field("gop", &self.gop)
            .finish()
    }
}

impl MotionCompensatedPropagator {
    pub fn new(warp: Arc<dyn MotionWarp>, gop: Gop) -> Self {
        Self { warp, gop }
    }

    pub fn gop(&self) -> Gop {
        self.gop
    }

    /// Propagate a batch.
    ///
    /// # Arguments
    /// * `features` - `(B, T, C, H, W)` maps to warp
    /// * `motion` - `(B, T, >=6, H, W)` motion fields
    /// * `decode_order` - `(B, T)` frame indices, `-1` for absent slots
    /// * `frame_mask` - `(B, T)` nonzero where the entry at the same decode
    ///   position has side data
    ///
    /// # Errors
    /// Shape mismatches, malformed decode orders and warp failures abort the
    /// whole pass.
    pub fn propagate(
        &self,
        features: &Tensor,
        motion: &Tensor,
        decode_order: &Tensor,
        frame_mask: &Tensor,
    ) -> BoundaryResult<PropagationOutput> {
        let (batch, frames, _, height, width) = features.dims5()?;
        let (mb, mt, mc, mh, mw) = motion.dims5()?;
        if (mb, mt, mh, mw) != (batch, frames, height, width) || mc < MOTION_CHANNELS {
            return Err(BoundaryError::shape(
                "motion fields vs propagated features",
                (batch, frames, MOTION_CHANNELS, height, width),
                (mb, mt, mc, mh, mw),
            ));
        }

        let orders = decode_order
            .to_dtype(candle_core::DType::I64)?
            .to_vec2::<i64>()?;
        let masks = mask_to_rows(frame_mask)?;
        if orders.len() != batch || masks.len() != batch {
            return Err(BoundaryError::shape(
                "decode order / mask batch",
                batch,
                (orders.len(), masks.len()),
            ));
        }

        let mut buffers = Vec::with_capacity(batch);
        let mut traces = Vec::with_capacity(batch);
        for b in 0..batch {
            let (buffer, trace) = self.propagate_video(
                &features.get(b)?,
                &motion.get(b)?,
                &orders[b],
                &masks[b],
            )?;
            debug!(
                video = b,
                warp = self.warp.name(),
                visited = trace.visited.len(),
                anchors = trace.anchors,
                skipped_masked = trace.skipped_masked,
                skipped_absent = trace.skipped_absent,
                "Propagated video"
            );
            buffers.push(buffer);
            traces.push(trace);
        }

        Ok(PropagationOutput {
            buffer: Tensor::stack(&buffers, 0)?,
            traces,
        })
    }

    /// Propagate one video.
    ///
    /// `features` is `(T, C, H, W)`, `motion` is `(T, >=6, H, W)`; `order` and
    /// `mask` have length `T`.
    pub fn propagate_video(
        &self,
        features: &Tensor,
        motion: &Tensor,
        order: &[i64],
        mask: &[bool],
    ) -> BoundaryResult<(Tensor, PropagationTrace)> {
        let frames = features.dims4()?.0;
        if order.len() != frames || mask.len() != frames {
            return Err(BoundaryError::shape(
                "decode order / mask length",
                frames,
                (order.len(), mask.len()),
            ));
        }

        let order = DecodeOrder::parse(order, frames)?;
        let layout = frame_layout(&order, mask, self.gop);
        let mut buffer = PropagationBuffer::new(features)?;
        let mut record = PropagationTrace::default();

        for (step, entry) in order.entries().iter().enumerate() {
            let Some(frame) = *entry else {
                record.skipped_absent += 1;
                continue;
            };
            if !layout[frame].is_coded {
                trace!(frame, step, "Skipping frame without side data");
                record.skipped_masked += 1;
                continue;
            }

            let field = MotionVectorField::from_tensor(
                &motion.get(frame)?.narrow(0, 0, MOTION_CHANNELS)?,
            )?;
            let referenced = field.referenced_frames(frame);
            for &reference in &referenced {
                let pending = layout
                    .get(reference)
                    .is_some_and(|r| r.is_propagated() && !buffer.is_written(reference));
                if pending {
                    return Err(BoundaryError::DecodeOrder {
                        message: format!(
                            "frame {} at step {} references frame {} decoded at step {}",
                            frame,
                            step,
                            reference,
                            order.position_of(reference).unwrap_or(usize::MAX)
                        ),
                    });
                }
            }

            let references = buffer.references(referenced)?;
            let warped = self.warp.warp(&references, &field, frame)?;
            buffer.write(frame, warped)?;

            if layout[frame].is_anchor {
                record.anchors += 1;
            }
            record.visited.push(frame);
        }

        Ok((buffer.to_tensor()?, record))
    }
}
