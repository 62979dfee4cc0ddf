//! Write-once propagation buffer of one video.

use candle_core::Tensor;

use super::warp::ReferenceMaps;
use crate::error::{BoundaryError, BoundaryResult};

/// Per-video buffer of warped feature maps.
///
/// Slots start as zero and each is written at most once. A frame's warp
/// source is its extracted map plus whatever has been propagated into it so
/// far, so a frame decoded later sees the refined state of its references.
#[derive(Debug)]
pub struct PropagationBuffer {
    /// `(T, C, H, W)` extracted maps, detached from the graph.
    features: Tensor,
    slots: Vec<Option<Tensor>>,
    zero_slot: Tensor,
}

impl PropagationBuffer {
    /// Create an empty buffer over `features` (`(T, C, H, W)`).
    pub fn new(features: &Tensor) -> BoundaryResult<Self> {
        let (frames, channels, height, width) = features.dims4()?;
        let zero_slot = Tensor::zeros(
            (channels, height, width),
            features.dtype(),
            features.device(),
        )?;
        Ok(Self {
            features: features.detach(),
            slots: vec![None; frames],
            zero_slot,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.slots.len()
    }

    pub fn is_written(&self, frame: usize) -> bool {
        matches!(self.slots.get(frame), Some(Some(_)))
    }

    /// Frames written so far, in presentation order.
    pub fn written_frames(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(t, slot)| slot.as_ref().map(|_| t))
            .collect()
    }

    /// Store the warped map of `frame`.
    ///
    /// # Errors
    /// - `InvalidInput` if `frame` is out of range
    /// - `ShapeMismatch` if `value` is not `(C, H, W)`
    /// - `SlotAlreadyWritten` on a second write
    pub fn write(&mut self, frame: usize, value: Tensor) -> BoundaryResult<()> {
        let frames = self.slots.len();
        let slot = self.slots.get_mut(frame).ok_or_else(|| {
            BoundaryError::invalid(format!("frame {} outside buffer of {}", frame, frames))
        })?;
        if value.dims() != self.zero_slot.dims() {
            return Err(BoundaryError::shape(
                "propagated slot",
                self.zero_slot.dims(),
                value.dims(),
            ));
        }
        if slot.is_some() {
            return Err(BoundaryError::SlotAlreadyWritten { frame });
        }
        *slot = Some(value);
        Ok(())
    }

    /// Buffer contents as `(T, C, H, W)`, zero for unwritten slots.
    pub fn to_tensor(&self) -> BoundaryResult<Tensor> {
        let slots: Vec<&Tensor> = self
            .slots
            .iter()
            .map(|slot| slot.as_ref().unwrap_or(&self.zero_slot))
            .collect();
        Ok(Tensor::stack(&slots, 0)?)
    }

    /// Warp source of one frame: its extracted map plus its slot, if written.
    pub fn source_of(&self, frame: usize) -> BoundaryResult<Tensor> {
        let frames = self.slots.len();
        let slot = self.slots.get(frame).ok_or_else(|| {
            BoundaryError::invalid(format!("frame {} outside buffer of {}", frame, frames))
        })?;
        let features = self.features.get(frame)?;
        match slot {
            Some(written) => Ok((features + written)?),
            None => Ok(features),
        }
    }

    /// Warp sources of `frames`; indices outside the buffer are left out.
    pub fn references(
        &self,
        frames: impl IntoIterator<Item = usize>,
    ) -> BoundaryResult<ReferenceMaps> {
        let mut maps = ReferenceMaps::new(self.zero_slot.clone())?;
        for frame in frames.into_iter().filter(|&f| f < self.slots.len()) {
            maps.insert(frame, self.source_of(frame)?)?;
        }
        Ok(maps)
    }
}
