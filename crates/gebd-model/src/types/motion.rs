//! Per-frame motion-vector fields.
//!
//! A field has six channels laid out as
//! `[dx0, dy0, dx1, dy1, ref0, ref1]`: two displacement vectors (one per
//! reference list) followed by the frame each vector points into. Reference
//! channels arrive as floats and are truncated to `i32`; negative values mean
//! "no reference".

use std::collections::BTreeSet;

use candle_core::{DType, Tensor};

use crate::error::{BoundaryError, BoundaryResult};

/// Channels in a motion field tensor.
pub const MOTION_CHANNELS: usize = 6;

/// Displacement channels (two 2D vectors).
pub const VECTOR_CHANNELS: usize = 4;

/// Number of reference lists.
pub const REFERENCE_LISTS: usize = 2;

/// Host-side motion field of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionVectorField {
    height: usize,
    width: usize,
    /// `[4, H, W]` row-major displacements.
    vectors: Vec<f32>,
    /// `[2, H, W]` row-major reference frame indices.
    references: Vec<i32>,
}

impl MotionVectorField {
    /// Build from a `(6, H, W)` tensor.
    pub fn from_tensor(field: &Tensor) -> BoundaryResult<Self> {
        let (channels, height, width) = field.dims3()?;
        if channels < MOTION_CHANNELS {
            return Err(BoundaryError::shape(
                "motion field channels",
                MOTION_CHANNELS,
                channels,
            ));
        }
        let field = field.to_dtype(DType::F32)?;
        let vectors = field
            .narrow(0, 0, VECTOR_CHANNELS)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let references = field
            .narrow(0, VECTOR_CHANNELS, REFERENCE_LISTS)?
            .flatten_all()?
            .to_vec1::<f32>()?
            .into_iter()
            .map(|r| r as i32)
            .collect();

        Ok(Self {
            height,
            width,
            vectors,
            references,
        })
    }

    /// Build from raw host buffers (`vectors`: `[4,H,W]`, `references`: `[2,H,W]`).
    pub fn from_parts(
        height: usize,
        width: usize,
        vectors: Vec<f32>,
        references: Vec<i32>,
    ) -> BoundaryResult<Self> {
        let plane = height * width;
        if vectors.len() != VECTOR_CHANNELS * plane {
            return Err(BoundaryError::shape(
                "motion vectors",
                VECTOR_CHANNELS * plane,
                vectors.len(),
            ));
        }
        if references.len() != REFERENCE_LISTS * plane {
            return Err(BoundaryError::shape(
                "motion references",
                REFERENCE_LISTS * plane,
                references.len(),
            ));
        }
        Ok(Self {
            height,
            width,
            vectors,
            references,
        })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Displacement `(dx, dy)` of reference list `list` at `(y, x)`.
    #[inline]
    pub fn displacement(&self, list: usize, y: usize, x: usize) -> (f32, f32) {
        let plane = self.height * self.width;
        let at = y * self.width + x;
        (
            self.vectors[(2 * list) * plane + at],
            self.vectors[(2 * list + 1) * plane + at],
        )
    }

    /// Reference frame of list `list` at `(y, x)`; negative means none.
    #[inline]
    pub fn reference(&self, list: usize, y: usize, x: usize) -> i32 {
        self.references[list * self.height * self.width + y * self.width + x]
    }

    /// Distinct frames referenced anywhere in the field, excluding `target`.
    pub fn referenced_frames(&self, target: usize) -> BTreeSet<usize> {
        self.references
            .iter()
            .filter(|&&r| r >= 0 && r as usize != target)
            .map(|&r| r as usize)
            .collect()
    }
}
