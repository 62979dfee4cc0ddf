//! Frame bookkeeping: decode order, GOP layout and per-frame flags.

use crate::error::{BoundaryError, BoundaryResult};

/// Decode-order entry marking an absent (padding) slot.
pub const ABSENT_FRAME: i64 = -1;

/// Group-of-pictures layout with a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gop {
    size: usize,
}

impl Gop {
    pub fn new(size: usize) -> BoundaryResult<Self> {
        if size == 0 {
            return Err(BoundaryError::invalid("GOP size must be > 0"));
        }
        Ok(Self { size })
    }

    #[inline]
    pub fn size(self) -> usize {
        self.size
    }

    /// GOP containing presentation index `t`.
    #[inline]
    pub fn index_of(self, t: usize) -> usize {
        t / self.size
    }

    /// Whether `t` is the intra-coded anchor of its GOP.
    #[inline]
    pub fn is_anchor(self, t: usize) -> bool {
        t % self.size == 0
    }
}

/// Validated decode order of one video.
///
/// Entry `p` holds the presentation index decoded at step `p`, or `None` for
/// an absent slot. Every frame appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOrder {
    entries: Vec<Option<usize>>,
    positions: Vec<Option<usize>>,
}

impl DecodeOrder {
    /// Validate a raw decode-order row for a video of `num_frames` frames.
    ///
    /// # Errors
    /// `DecodeOrder` when an entry is neither the sentinel nor a frame index
    /// in range, or when a frame index repeats.
    pub fn parse(raw: &[i64], num_frames: usize) -> BoundaryResult<Self> {
        let mut entries = Vec::with_capacity(raw.len());
        let mut positions = vec![None; num_frames];

        for (position, &entry) in raw.iter().enumerate() {
            if entry == ABSENT_FRAME {
                entries.push(None);
                continue;
            }
            if entry < 0 || entry as usize >= num_frames {
                return Err(BoundaryError::DecodeOrder {
                    message: format!(
                        "entry {} at position {} outside [0, {})",
                        entry, position, num_frames
                    ),
                });
            }
            let frame = entry as usize;
            if let Some(previous) = positions[frame] {
                return Err(BoundaryError::DecodeOrder {
                    message: format!(
                        "frame {} listed at positions {} and {}",
                        frame, previous, position
                    ),
                });
            }
            positions[frame] = Some(position);
            entries.push(Some(frame));
        }

        Ok(Self { entries, positions })
    }

    /// Entries in decode order.
    pub fn entries(&self) -> &[Option<usize>] {
        &self.entries
    }

    /// Decode step at which `frame` is processed, if it is listed.
    pub fn position_of(&self, frame: usize) -> Option<usize> {
        self.positions.get(frame).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One frame of a video as seen by the propagator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Presentation index.
    pub t: usize,
    /// Decode step, `None` when the frame is absent from the decode order.
    pub decode_position: Option<usize>,
    /// Frame carries valid side data.
    pub is_coded: bool,
    /// Intra-coded anchor of its GOP.
    pub is_anchor: bool,
}

impl Frame {
    /// Whether the propagator writes a buffer slot for this frame.
    pub fn is_propagated(&self) -> bool {
        self.is_coded && self.decode_position.is_some()
    }
}

/// Build per-frame records from a decode order and a validity mask.
///
/// The mask is positional: `mask[p]` gates the frame decoded at step `p`,
/// not frame `p`. Frames missing from the decode order are never coded.
pub fn frame_layout(order: &DecodeOrder, mask: &[bool], gop: Gop) -> Vec<Frame> {
    (0..mask.len())
        .map(|t| {
            let decode_position = order.position_of(t);
            Frame {
                t,
                decode_position,
                is_coded: decode_position
                    .and_then(|p| mask.get(p).copied())
                    .unwrap_or(false),
                is_anchor: gop.is_anchor(t),
            }
        })
        .collect()
}
